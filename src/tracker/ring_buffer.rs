use std::collections::VecDeque;

/// Fixed-capacity FIFO; pushing into a full buffer evicts the oldest element.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the evicted element, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl RingBuffer<bool> {
    /// Strict majority of `true` among the stored flags.
    pub fn majority(&self) -> bool {
        let set = self.items.iter().filter(|&&b| b).count();
        set > self.items.len() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut buf = RingBuffer::new(3);
        assert_eq!(buf.push(1), None);
        buf.push(2);
        buf.push(3);
        assert!(buf.is_full());
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(buf.oldest(), Some(&2));
        assert_eq!(buf.latest(), Some(&4));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buf = RingBuffer::new(0);
        buf.push('a');
        buf.push('b');
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.latest(), Some(&'b'));
    }

    #[test]
    fn test_majority_vote() {
        let mut flags = RingBuffer::new(5);
        for f in [true, false, true, false] {
            flags.push(f);
        }
        assert!(!flags.majority());
        flags.push(true);
        assert!(flags.majority());
        assert!(!RingBuffer::<bool>::new(3).majority());
    }
}
