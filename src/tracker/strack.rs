//! Single Kalman-filtered track used by the ByteTrack association.

use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateVector};
use crate::tracker::rect::Rect;

/// Track lifecycle inside the ByteTrack association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Created from a detection, not yet confirmed.
    #[default]
    New,
    /// Matched in the latest frame.
    Tracked,
    /// Unmatched, kept for re-identification within the track buffer.
    Lost,
}

/// Monotonic track id source owned by one tracker instance.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    /// Allocator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id; ids start at 1 and never repeat within an allocator.
    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

/// Single object track.
#[derive(Debug, Clone)]
pub struct STrack {
    /// Zero until the track is activated.
    pub track_id: u64,
    /// Current lifecycle state
    pub state: TrackState,
    /// Whether the track has been confirmed
    pub is_activated: bool,
    /// Score of the last matched detection
    pub score: f32,
    /// Frame of the last match
    pub frame_id: u32,
    /// Frame the track was activated in
    pub start_frame: u32,
    /// Consecutive matched frames since (re)activation
    pub tracklet_len: u32,
    /// Index of the detection this track matched in the current frame.
    pub detection: Option<usize>,
    /// Filter state, set on activation.
    kalman: Option<(StateVector, StateCovariance)>,
    /// Box of the originating detection, used until the filter is initialized.
    tlwh: Rect,
}

impl STrack {
    /// Unactivated track for detection `detection` of the current frame.
    pub fn new(tlwh: Rect, score: f32, detection: usize) -> Self {
        Self {
            track_id: 0,
            state: TrackState::New,
            is_activated: false,
            score,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
            detection: Some(detection),
            kalman: None,
            tlwh,
        }
    }

    /// Filtered box, or the raw detection box before activation.
    pub fn rect(&self) -> Rect {
        match &self.kalman {
            Some((mean, _)) => Rect::from_xyah([mean[0], mean[1], mean[2], mean[3]]),
            None => self.tlwh,
        }
    }

    /// Frame the track was last matched in.
    pub fn end_frame(&self) -> u32 {
        self.frame_id
    }

    /// Assign an id and initialize the filter from the detection box.
    pub fn activate(&mut self, kf: &KalmanFilter, frame_id: u32, ids: &mut IdAllocator) {
        self.track_id = ids.next_id();
        self.kalman = Some(kf.initiate(self.tlwh.to_xyah()));
        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        // Only tracks born on the first frame are trusted immediately.
        self.is_activated = frame_id == 1;
        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    /// Apply a matched observation.
    fn correct(&mut self, observed: &STrack, kf: &KalmanFilter, frame_id: u32) {
        if let Some((mean, cov)) = &self.kalman {
            self.kalman = Some(kf.update(mean, cov, observed.tlwh.to_xyah()));
        }
        self.tlwh = observed.tlwh;
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.frame_id = frame_id;
        self.score = observed.score;
        self.detection = observed.detection;
    }

    /// Revive a lost track with a new observation.
    pub fn re_activate(&mut self, observed: &STrack, kf: &KalmanFilter, frame_id: u32) {
        self.correct(observed, kf, frame_id);
        self.tracklet_len = 0;
    }

    /// Continue a tracked track with a new observation.
    pub fn update(&mut self, observed: &STrack, kf: &KalmanFilter, frame_id: u32) {
        self.correct(observed, kf, frame_id);
        self.tracklet_len += 1;
    }

    /// Predict the next frame's state; clears the matched detection.
    pub fn predict(&mut self, kf: &KalmanFilter) {
        if let Some((mean, cov)) = &self.kalman {
            let mut mean = *mean;
            if self.state != TrackState::Tracked {
                // Freeze height velocity while the track is not observed.
                mean[7] = 0.0;
            }
            self.kalman = Some(kf.predict(&mean, cov));
        }
        self.detection = None;
    }

    /// Mark the track as lost.
    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
        self.detection = None;
    }
}
