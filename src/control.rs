//! Target arbitration, PTZ motion and the control loop.

mod arbiter;
mod cycle;
mod motion;
mod position;
mod registry;
mod session;
mod statistics;
mod tracked_object;
mod zoom;

pub use arbiter::{
    ArbiterState, PriorityArbiter, ScoreComponents, SwitchReason, TargetChange, TrackingState,
};
pub use cycle::{CycleReport, TrackingCore};
pub use motion::{
    DispatchCounters, DispatchMode, Dispatcher, MotionCommand, MotionState, MovementRecord,
    PtzMotionController,
};
pub use position::ObjectPosition;
pub use registry::TrackerRegistry;
pub use session::{PtzTracker, SessionClock};
pub use statistics::{
    Grade, IngestMetrics, IngestSummary, MovementStatus, ObjectStats, PerformanceRates,
    PerformanceReport, PtzMovementStats, SessionTotals, TrackerStatus, TrackingStatistics,
    ZoomStats, analyze_performance,
};
pub use tracked_object::{ObjectSnapshot, TrackedObject};
pub use zoom::{ZoomController, ZoomRecord, ZoomStep};
