mod association;
mod byte_tracker;
mod kalman_filter;
mod matching;
mod movement;
mod rect;
mod ring_buffer;
mod strack;

pub use association::{AssociatedTrack, AssociationTracker, Associator, TrackOutput};
pub use byte_tracker::{ByteTracker, TrackerConfig};
pub use matching::{Detection, best_iou_match};
pub use movement::MovementClassifier;
pub use rect::Rect;
pub use ring_buffer::RingBuffer;
pub use strack::{IdAllocator, STrack, TrackState};
