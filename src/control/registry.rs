use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::control::session::PtzTracker;

/// Owns the trackers of an application, keyed by camera name.
///
/// Created by the application and passed to whoever needs it; there is no
/// process-wide instance.
#[derive(Default)]
pub struct TrackerRegistry {
    trackers: BTreeMap<String, Arc<PtzTracker>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tracker. A tracker previously registered under the same
    /// name is stopped and returned.
    pub fn insert(&mut self, name: impl Into<String>, tracker: PtzTracker) -> Option<Arc<PtzTracker>> {
        let name = name.into();
        let previous = self.trackers.insert(name.clone(), Arc::new(tracker));
        if let Some(old) = &previous {
            info!(camera = %name, "replacing registered tracker");
            old.stop();
        }
        previous
    }

    /// Shared handle to the named tracker.
    pub fn get(&self, name: &str) -> Option<Arc<PtzTracker>> {
        self.trackers.get(name).cloned()
    }

    /// Unregister and stop.
    pub fn remove(&mut self, name: &str) -> Option<Arc<PtzTracker>> {
        let tracker = self.trackers.remove(name)?;
        tracker.stop();
        Some(tracker)
    }

    /// Registered camera names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trackers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Number of trackers currently running.
    pub fn running(&self) -> usize {
        self.trackers.values().filter(|t| t.is_running()).count()
    }

    /// Stop every registered tracker; they stay registered.
    pub fn stop_all(&self) {
        for (name, tracker) in &self.trackers {
            if tracker.is_running() {
                info!(camera = %name, "stopping tracker");
            }
            tracker.stop();
        }
    }
}

impl Drop for TrackerRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
