//! Tracking configuration, validation and named presets.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracker::TrackerConfig;

/// Weights of the four priority components.
///
/// Weights are not normalized. A set summing to 2.0 doubles every score, and
/// with it the score gap a challenger needs to become the argmax.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub confidence: f64,
    pub movement: f64,
    pub size: f64,
    pub proximity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            movement: 0.3,
            size: 0.2,
            proximity: 0.1,
        }
    }
}

/// Pan/tilt command generation and dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub max_pan_speed: f64,
    pub max_tilt_speed: f64,
    /// Proportional gain applied to the normalized center error.
    pub gain: f64,
    /// Center errors below this magnitude produce no motion on that axis.
    pub dead_zone: f64,
    pub prediction_enabled: bool,
    /// Look-ahead in seconds used when prediction is enabled.
    pub prediction_time: f64,
    /// Issue `move_absolute` with an integrated pose instead of `move_continuous`.
    pub use_absolute_move: bool,
    /// Speed argument passed to `move_absolute`.
    pub absolute_move_speed: f64,
    pub movement_log_capacity: usize,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            max_pan_speed: 0.8,
            max_tilt_speed: 0.8,
            gain: 2.0,
            dead_zone: 0.0,
            prediction_enabled: true,
            prediction_time: 0.1,
            use_absolute_move: false,
            absolute_move_speed: 0.5,
            movement_log_capacity: 100,
        }
    }
}

/// Automatic zoom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub auto_zoom_enabled: bool,
    /// Desired object area as a fraction of the frame area.
    pub target_object_ratio: f64,
    /// Maximum zoom level change per control cycle.
    pub zoom_speed: f64,
    pub min_zoom_level: f64,
    pub max_zoom_level: f64,
    /// Tolerance around `target_object_ratio` inside which zoom holds.
    pub zoom_padding: f64,
    pub initial_zoom_level: f64,
    /// Number of zoom targets averaged into the commanded level.
    pub smoothing_window: usize,
    pub history_capacity: usize,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            auto_zoom_enabled: true,
            target_object_ratio: 0.25,
            zoom_speed: 0.3,
            min_zoom_level: 0.0,
            max_zoom_level: 1.0,
            zoom_padding: 0.1,
            initial_zoom_level: 0.5,
            smoothing_window: 5,
            history_capacity: 100,
        }
    }
}

/// Per-object history and motion statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    pub history_window: usize,
    /// Normalized frame units per second above which an object counts as moving.
    pub moving_speed_threshold: f64,
    /// Number of recent moving flags in the majority vote.
    pub moving_vote_window: usize,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            history_window: 30,
            moving_speed_threshold: 0.01,
            moving_vote_window: 5,
        }
    }
}

/// Cross-frame association on top of ByteTrack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    pub byte_track: TrackerConfig,
    /// Unmatched frames a track survives before removal.
    pub lost_ttl: u32,
    /// Lost tracks farther than this (pixels) from every detection are pruned.
    /// Absolute pixels, so the effective radius depends on the stream resolution.
    pub ghost_distance_px: f64,
    /// Lost frames after which ghost pruning applies.
    pub ghost_min_lost_frames: u32,
    /// Rolling window of centers used for instantaneous movement.
    pub movement_history_steps: usize,
    /// Normalized displacement above which a track moves.
    pub movement_threshold: f64,
    /// Majority-vote window over instantaneous movement flags.
    pub movement_smoothing_frames: usize,
    pub center_history: usize,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            byte_track: TrackerConfig::default(),
            lost_ttl: 5,
            ghost_distance_px: 200.0,
            ghost_min_lost_frames: 3,
            movement_history_steps: 7,
            movement_threshold: 0.005,
            movement_smoothing_frames: 5,
            center_history: 30,
        }
    }
}

/// Complete configuration of a PTZ tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub weights: ScoringWeights,
    pub min_confidence_threshold: f64,
    pub min_object_size: f64,
    pub max_object_size: f64,
    pub max_objects_to_track: usize,
    /// Seconds without a match before an object is removed.
    pub object_lifetime: f64,
    /// Rotate the target every `max_switch_interval` seconds.
    pub alternating_enabled: bool,
    pub min_switch_interval: f64,
    pub max_switch_interval: f64,
    pub motion: MotionConfig,
    pub zoom: ZoomConfig,
    pub object: ObjectConfig,
    pub association: AssociationConfig,
    pub control_rate_hz: f64,
    pub connect_timeout_secs: f64,
    pub join_timeout_secs: f64,
    /// Consecutive transport failures that trigger a reconnect.
    pub max_consecutive_failures: u32,
    pub detection_queue_capacity: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_confidence_threshold: 0.5,
            min_object_size: 0.01,
            max_object_size: 0.8,
            max_objects_to_track: 3,
            object_lifetime: 3.0,
            alternating_enabled: true,
            min_switch_interval: 1.0,
            max_switch_interval: 30.0,
            motion: MotionConfig::default(),
            zoom: ZoomConfig::default(),
            object: ObjectConfig::default(),
            association: AssociationConfig::default(),
            control_rate_hz: 10.0,
            connect_timeout_secs: 1.0,
            join_timeout_secs: 2.0,
            max_consecutive_failures: 5,
            detection_queue_capacity: 8,
        }
    }
}

impl TrackingConfig {
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self::default();
        match preset {
            Preset::MaritimeStandard => {}
            Preset::MaritimeFast => {
                config.zoom.target_object_ratio = 0.3;
                config.weights = ScoringWeights {
                    confidence: 0.3,
                    movement: 0.5,
                    size: 0.1,
                    proximity: 0.1,
                };
                config.max_objects_to_track = 4;
                config.zoom.zoom_speed = 0.5;
            }
            Preset::SurveillancePrecise => {
                config.zoom.target_object_ratio = 0.4;
                config.weights = ScoringWeights {
                    confidence: 0.6,
                    movement: 0.2,
                    size: 0.1,
                    proximity: 0.1,
                };
                config.min_confidence_threshold = 0.7;
                config.max_objects_to_track = 2;
                config.zoom.zoom_speed = 0.2;
                config.motion.use_absolute_move = true;
            }
            Preset::SingleObject => {
                config.alternating_enabled = false;
                config.zoom.target_object_ratio = 0.35;
                config.weights = ScoringWeights {
                    confidence: 0.5,
                    movement: 0.3,
                    size: 0.2,
                    proximity: 0.1,
                };
                config.max_objects_to_track = 1;
                config.motion.use_absolute_move = true;
            }
        }
        config
    }

    /// Parse a (possibly partial) JSON document; missing fields keep defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Association settings with ByteTrack's thresholds capped at
    /// `min_confidence_threshold`, so every admitted detection can start a track.
    pub fn admitted_association(&self) -> AssociationConfig {
        let mut association = self.association.clone();
        let floor = self.min_confidence_threshold as f32;
        let byte_track = &mut association.byte_track;
        byte_track.track_thresh = byte_track.track_thresh.min(floor);
        byte_track.new_track_thresh = byte_track.new_track_thresh.min(floor);
        association
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.control_rate_hz)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.join_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        for (name, value) in [
            ("confidence_weight", w.confidence),
            ("movement_weight", w.movement),
            ("size_weight", w.size),
            ("proximity_weight", w.proximity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        if w.confidence + w.movement + w.size + w.proximity <= 0.0 {
            return Err(ConfigError::AllWeightsZero);
        }

        unit("min_confidence_threshold", self.min_confidence_threshold)?;
        unit("min_object_size", self.min_object_size)?;
        unit("max_object_size", self.max_object_size)?;
        ordered(
            ("min_object_size", self.min_object_size),
            ("max_object_size", self.max_object_size),
        )?;
        range(
            "max_objects_to_track",
            self.max_objects_to_track as f64,
            1.0,
            10.0,
        )?;
        positive("object_lifetime", self.object_lifetime)?;
        positive("min_switch_interval", self.min_switch_interval)?;
        ordered(
            ("min_switch_interval", self.min_switch_interval),
            ("max_switch_interval", self.max_switch_interval),
        )?;

        let m = &self.motion;
        positive("max_pan_speed", m.max_pan_speed)?;
        positive("max_tilt_speed", m.max_tilt_speed)?;
        positive("gain", m.gain)?;
        range("dead_zone", m.dead_zone, 0.0, 0.5)?;
        range("prediction_time", m.prediction_time, 0.0, 5.0)?;
        unit("absolute_move_speed", m.absolute_move_speed)?;
        positive("movement_log_capacity", m.movement_log_capacity as f64)?;

        let z = &self.zoom;
        range("target_object_ratio", z.target_object_ratio, f64::EPSILON, 1.0)?;
        range("zoom_speed", z.zoom_speed, f64::EPSILON, 1.0)?;
        unit("zoom_padding", z.zoom_padding)?;
        ordered(
            ("min_zoom_level", z.min_zoom_level),
            ("max_zoom_level", z.max_zoom_level),
        )?;
        range(
            "initial_zoom_level",
            z.initial_zoom_level,
            z.min_zoom_level,
            z.max_zoom_level,
        )?;
        positive("smoothing_window", z.smoothing_window as f64)?;
        positive("history_capacity", z.history_capacity as f64)?;

        let o = &self.object;
        positive("history_window", o.history_window as f64)?;
        range("moving_speed_threshold", o.moving_speed_threshold, 0.0, f64::MAX)?;
        positive("moving_vote_window", o.moving_vote_window as f64)?;

        let a = &self.association;
        unit("track_thresh", a.byte_track.track_thresh as f64)?;
        unit("new_track_thresh", a.byte_track.new_track_thresh as f64)?;
        unit("match_thresh", a.byte_track.match_thresh as f64)?;
        positive("frame_rate", a.byte_track.frame_rate as f64)?;
        positive("ghost_distance_px", a.ghost_distance_px)?;
        positive("movement_history_steps", a.movement_history_steps as f64)?;
        range("movement_threshold", a.movement_threshold, 0.0, 1.0)?;
        positive(
            "movement_smoothing_frames",
            a.movement_smoothing_frames as f64,
        )?;
        positive("center_history", a.center_history as f64)?;

        range("control_rate_hz", self.control_rate_hz, 1.0, 60.0)?;
        positive("connect_timeout_secs", self.connect_timeout_secs)?;
        positive("join_timeout_secs", self.join_timeout_secs)?;
        positive(
            "max_consecutive_failures",
            self.max_consecutive_failures as f64,
        )?;
        positive(
            "detection_queue_capacity",
            self.detection_queue_capacity as f64,
        )?;
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

fn unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    range(name, value, 0.0, 1.0)
}

fn ordered(low: (&'static str, f64), high: (&'static str, f64)) -> Result<(), ConfigError> {
    if low.1 <= high.1 {
        Ok(())
    } else {
        Err(ConfigError::InvertedBounds {
            low_name: low.0,
            low: low.1,
            high_name: high.0,
            high: high.1,
        })
    }
}

/// Named configurations shipped with the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    MaritimeStandard,
    MaritimeFast,
    SurveillancePrecise,
    SingleObject,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::MaritimeStandard,
        Preset::MaritimeFast,
        Preset::SurveillancePrecise,
        Preset::SingleObject,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::MaritimeStandard => "maritime_standard",
            Preset::MaritimeFast => "maritime_fast",
            Preset::SurveillancePrecise => "surveillance_precise",
            Preset::SingleObject => "single_object",
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_presets_validate() {
        assert!(TrackingConfig::default().validate().is_ok());
        for preset in Preset::ALL {
            assert!(TrackingConfig::preset(preset).validate().is_ok(), "{preset:?}");
        }
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!(
            "surveillance_precise".parse::<Preset>().unwrap(),
            Preset::SurveillancePrecise
        );
        assert!(matches!(
            "harbour".parse::<Preset>(),
            Err(ConfigError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_admitted_association_caps_thresholds() {
        let mut config = TrackingConfig::default();
        config.min_confidence_threshold = 0.3;
        let byte_track = config.admitted_association().byte_track;
        assert_eq!(byte_track.track_thresh, 0.3);
        assert_eq!(byte_track.new_track_thresh, 0.3);

        // A stricter ingest threshold leaves ByteTrack's own values alone.
        config.min_confidence_threshold = 0.7;
        let byte_track = config.admitted_association().byte_track;
        assert_eq!(byte_track.track_thresh, 0.5);
        assert_eq!(byte_track.new_track_thresh, 0.6);
    }

    #[test]
    fn test_weights_need_not_sum_to_one() {
        let mut config = TrackingConfig::default();
        config.weights = ScoringWeights {
            confidence: 1.0,
            movement: 1.0,
            size: 1.0,
            proximity: 1.0,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = TrackingConfig::default();
        config.weights.size = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeight { name: "size_weight", .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_zoom_bounds() {
        let mut config = TrackingConfig::default();
        config.zoom.min_zoom_level = 0.9;
        config.zoom.max_zoom_level = 0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_switch_interval() {
        let mut config = TrackingConfig::default();
        config.min_switch_interval = 10.0;
        config.max_switch_interval = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config =
            TrackingConfig::from_json_str(r#"{"max_objects_to_track": 5, "zoom": {"zoom_speed": 0.4}}"#)
                .unwrap();
        assert_eq!(config.max_objects_to_track, 5);
        assert_eq!(config.zoom.zoom_speed, 0.4);
        assert_eq!(config.object_lifetime, 3.0);
    }

    #[test]
    fn test_json_validation_runs() {
        assert!(TrackingConfig::from_json_str(r#"{"max_objects_to_track": 0}"#).is_err());
        assert!(matches!(
            TrackingConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
