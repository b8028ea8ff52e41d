//! Jitter-resistant movement classification from a track's center history.

use crate::tracker::ring_buffer::RingBuffer;

/// Two-pass movement classifier.
///
/// Pass one compares the oldest center of a full rolling window with the
/// window mean and flags instantaneous movement when the squared normalized
/// displacement exceeds the squared threshold. Pass two takes a majority vote
/// over the last instantaneous flags. Both window sizes are tunable.
#[derive(Debug, Clone)]
pub struct MovementClassifier {
    centers: RingBuffer<(f64, f64)>,
    flags: RingBuffer<bool>,
    threshold_sq: f64,
}

impl MovementClassifier {
    pub fn new(history_steps: usize, smoothing_frames: usize, threshold: f64) -> Self {
        Self {
            centers: RingBuffer::new(history_steps),
            flags: RingBuffer::new(smoothing_frames),
            threshold_sq: threshold * threshold,
        }
    }

    /// Feed a normalized center. `None` until the center window has filled.
    pub fn observe(&mut self, cx: f64, cy: f64) -> Option<bool> {
        self.centers.push((cx, cy));
        if !self.centers.is_full() {
            return None;
        }

        let n = self.centers.len() as f64;
        let (sum_x, sum_y) = self
            .centers
            .iter()
            .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
        let (mean_x, mean_y) = (sum_x / n, sum_y / n);

        let &(ox, oy) = self.centers.oldest()?;
        let dist_sq = (ox - mean_x).powi(2) + (oy - mean_y).powi(2);
        self.flags.push(dist_sq > self.threshold_sq);
        Some(self.flags.majority())
    }

    /// Last smoothed verdict without feeding a new sample.
    pub fn current(&self) -> Option<bool> {
        (!self.flags.is_empty()).then(|| self.flags.majority())
    }
}
