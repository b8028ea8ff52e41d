use serde::Serialize;
use tracing::debug;

use crate::config::ZoomConfig;
use crate::tracker::RingBuffer;

/// Level changes smaller than this are not counted.
const CHANGE_EPSILON: f64 = 1e-3;

/// One counted zoom change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomRecord {
    pub timestamp: f64,
    /// Level before the change
    pub from: f64,
    /// Level after the change
    pub to: f64,
    /// Target area ratio that caused it
    pub object_ratio: f64,
}

/// Result of one zoom update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomStep {
    /// Commanded level
    pub level: f64,
    /// Level change this cycle; doubles as the continuous zoom velocity.
    pub velocity: f64,
}

/// Keeps the target's area ratio near `target_object_ratio`.
///
/// Outside the tolerance band `target * (1 ± zoom_padding)` the desired level
/// moves by the relative ratio error times `zoom_speed`. The commanded level
/// follows the mean of recent desired levels, at most `zoom_speed` per cycle,
/// and always stays inside `[min_zoom_level, max_zoom_level]`.
#[derive(Debug, Clone)]
pub struct ZoomController {
    config: ZoomConfig,
    level: f64,
    desired: RingBuffer<f64>,
    change_count: u64,
    history: RingBuffer<ZoomRecord>,
}

impl ZoomController {
    /// Controller at the clamped initial level.
    pub fn new(config: &ZoomConfig) -> Self {
        let level = config
            .initial_zoom_level
            .clamp(config.min_zoom_level, config.max_zoom_level);
        Self {
            config: config.clone(),
            level,
            desired: RingBuffer::new(config.smoothing_window),
            change_count: 0,
            history: RingBuffer::new(config.history_capacity),
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Changes larger than the counting threshold so far.
    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    /// Recent counted changes, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ZoomRecord> {
        self.history.iter()
    }

    /// Re-sync with a level read back from the device.
    pub fn set_level(&mut self, level: f64) {
        self.level = level.clamp(self.config.min_zoom_level, self.config.max_zoom_level);
        self.desired.clear();
    }

    pub fn update(&mut self, object_ratio: f64, now: f64) -> ZoomStep {
        if !self.config.auto_zoom_enabled {
            return ZoomStep {
                level: self.level,
                velocity: 0.0,
            };
        }
        let cfg = &self.config;
        let target = cfg.target_object_ratio;
        let deviation = (object_ratio - target).abs() / target;

        let desired = if deviation <= cfg.zoom_padding {
            self.level
        } else {
            let error = ((target - object_ratio) / target).clamp(-1.0, 1.0);
            (self.level + error * cfg.zoom_speed).clamp(cfg.min_zoom_level, cfg.max_zoom_level)
        };
        self.desired.push(desired);

        let smoothed = self.desired.iter().sum::<f64>() / self.desired.len() as f64;
        let step = (smoothed - self.level).clamp(-cfg.zoom_speed, cfg.zoom_speed);
        let next = (self.level + step).clamp(cfg.min_zoom_level, cfg.max_zoom_level);
        let velocity = next - self.level;

        if velocity.abs() > CHANGE_EPSILON {
            self.change_count += 1;
            self.history.push(ZoomRecord {
                timestamp: now,
                from: self.level,
                to: next,
                object_ratio,
            });
            debug!(from = self.level, to = next, object_ratio, "zoom adjusted");
        }
        self.level = next;
        ZoomStep {
            level: next,
            velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ZoomConfig {
        ZoomConfig {
            target_object_ratio: 0.25,
            zoom_speed: 0.1,
            zoom_padding: 0.1,
            initial_zoom_level: 0.5,
            smoothing_window: 3,
            ..ZoomConfig::default()
        }
    }

    #[test]
    fn test_small_object_zooms_in() {
        let mut zoom = ZoomController::new(&config());
        let step = zoom.update(0.05, 0.0);
        assert!(step.velocity > 0.0);
        assert!(step.level > 0.5);
        assert_eq!(zoom.change_count(), 1);
    }

    #[test]
    fn test_large_object_zooms_out() {
        let mut zoom = ZoomController::new(&config());
        let step = zoom.update(0.6, 0.0);
        assert!(step.velocity < 0.0);
    }

    #[test]
    fn test_within_padding_holds() {
        let mut zoom = ZoomController::new(&config());
        let step = zoom.update(0.26, 0.0);
        assert_eq!(step.velocity, 0.0);
        assert_eq!(zoom.change_count(), 0);
    }

    #[test]
    fn test_bounded_and_rate_limited() {
        let mut zoom = ZoomController::new(&ZoomConfig {
            max_zoom_level: 0.7,
            ..config()
        });
        let mut prev = zoom.level();
        for i in 0..50 {
            let step = zoom.update(0.001, i as f64);
            assert!(step.level <= 0.7);
            assert!((step.level - prev).abs() <= 0.1 + 1e-12);
            prev = step.level;
        }
        assert!((zoom.level() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_never_moves() {
        let mut zoom = ZoomController::new(&ZoomConfig {
            auto_zoom_enabled: false,
            ..config()
        });
        assert_eq!(zoom.update(0.001, 0.0).velocity, 0.0);
        assert_eq!(zoom.level(), 0.5);
    }
}
