//! Multi-object PTZ camera tracking.
//!
//! Detections from an external vision pipeline are associated into stable
//! tracks (ByteTrack with an IOU fallback), scored, arbitrated into a single
//! target and turned into pan/tilt/zoom commands for an abstract PTZ device.

pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod integration;
pub mod tracker;

pub use config::{Preset, TrackingConfig};
pub use control::{
    ObjectPosition, PriorityArbiter, PtzMotionController, PtzTracker, TrackedObject,
    TrackerRegistry, TrackingCore, TrackingState,
};
pub use device::{PtzDevice, PtzPose};
pub use error::{ConfigError, ConnectionError, Error, IngestError, TransportError};
pub use integration::{DetectionBuilder, RawDetection};
pub use tracker::{AssociationTracker, ByteTracker, Detection, Rect, TrackerConfig};
