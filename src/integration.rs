//! Inbound detections from an external vision pipeline.
//!
//! Detections arrive as [`RawDetection`] records (pixel TLBR box or normalized
//! center form) and are validated and filtered into [`ObjectPosition`]s
//! before they reach the tracker.
//!
//! [`ObjectPosition`]: crate::control::ObjectPosition

mod builder;
mod detection;

pub use builder::DetectionBuilder;
pub use detection::{DEFAULT_FRAME_SIZE, FilteredBatch, RawDetection, filter_detections};
