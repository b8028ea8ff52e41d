//! ByteTrack: two-stage IoU association of high- and low-confidence detections.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::{Rect, iou_batch};
use crate::tracker::strack::{IdAllocator, STrack, TrackState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections at or above this score take part in the first association.
    pub track_thresh: f32,
    /// Unmatched high detections at or above this score start a new track.
    pub new_track_thresh: f32,
    /// Maximum IoU distance accepted in the first association.
    pub match_thresh: f32,
    /// Frames a lost track is kept for re-identification, at 30 fps.
    pub track_buffer: u32,
    /// Stream frame rate; scales `track_buffer`.
    pub frame_rate: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            new_track_thresh: 0.6,
            match_thresh: 0.8,
            track_buffer: 30,
            frame_rate: 30.0,
        }
    }
}

/// Detections scoring at or below this never reach the tracker.
const LOW_SCORE_FLOOR: f32 = 0.1;
const SECOND_MATCH_THRESH: f32 = 0.5;
const UNCONFIRMED_MATCH_THRESH: f32 = 0.7;
const DUPLICATE_IOU: f32 = 0.85;

/// Multi-object tracker keeping tracked and lost tracks across frames.
pub struct ByteTracker {
    tracked: Vec<STrack>,
    lost: Vec<STrack>,
    frame_id: u32,
    config: TrackerConfig,
    max_time_lost: u32,
    kalman_filter: KalmanFilter,
    ids: IdAllocator,
}

impl ByteTracker {
    /// Tracker with no tracks, before its first frame.
    pub fn new(config: TrackerConfig) -> Self {
        let max_time_lost = (config.frame_rate / 30.0 * config.track_buffer as f32) as u32;
        Self {
            tracked: Vec::new(),
            lost: Vec::new(),
            frame_id: 0,
            config,
            max_time_lost,
            kalman_filter: KalmanFilter::default(),
            ids: IdAllocator::new(),
        }
    }

    /// Number of frames processed so far.
    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Advance one frame. Returned tracks are confirmed and carry the index of
    /// the detection they matched in `detections`.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<STrack> {
        self.frame_id += 1;
        let frame_id = self.frame_id;
        let kf = &self.kalman_filter;

        let mut activated = Vec::new();
        let mut refound = Vec::new();
        let mut lost = Vec::new();

        let (high, low): (Vec<STrack>, Vec<STrack>) = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.score > LOW_SCORE_FLOOR)
            .map(|(i, d)| STrack::new(d.bbox, d.score, i))
            .partition(|t| t.score >= self.config.track_thresh);

        let (confirmed, mut unconfirmed): (Vec<STrack>, Vec<STrack>) =
            self.tracked.drain(..).partition(|t| t.is_activated);

        let mut pool = joint_stracks(confirmed, &self.lost);
        for track in pool.iter_mut() {
            track.predict(kf);
        }

        // First association: high-score detections against every known track.
        let mut dists = matching::iou_distance(&rects(&pool), &rects(&high));
        matching::fuse_score(&mut dists, &scores(&high));
        let first = matching::linear_assignment(&dists, self.config.match_thresh);

        for &(it, id) in &first.matches {
            let mut track = pool[it].clone();
            if track.state == TrackState::Tracked {
                track.update(&high[id], kf, frame_id);
                activated.push(track);
            } else {
                track.re_activate(&high[id], kf, frame_id);
                refound.push(track);
            }
        }

        // Second association: leftover tracked tracks against low-score detections.
        let remaining: Vec<STrack> = first
            .unmatched_tracks
            .iter()
            .map(|&i| &pool[i])
            .filter(|t| t.state == TrackState::Tracked)
            .cloned()
            .collect();
        let second = matching::linear_assignment(
            &matching::iou_distance(&rects(&remaining), &rects(&low)),
            SECOND_MATCH_THRESH,
        );
        for &(it, id) in &second.matches {
            let mut track = remaining[it].clone();
            track.update(&low[id], kf, frame_id);
            activated.push(track);
        }
        for &it in &second.unmatched_tracks {
            let mut track = remaining[it].clone();
            track.mark_lost();
            lost.push(track);
        }

        // Tracks born last frame get one chance against the leftover high detections.
        let leftover: Vec<STrack> = first
            .unmatched_detections
            .iter()
            .map(|&i| high[i].clone())
            .collect();
        let mut dists = matching::iou_distance(&rects(&unconfirmed), &rects(&leftover));
        matching::fuse_score(&mut dists, &scores(&leftover));
        let AssignmentResult {
            matches,
            unmatched_detections,
            ..
        } = matching::linear_assignment(&dists, UNCONFIRMED_MATCH_THRESH);
        for (it, id) in matches {
            unconfirmed[it].update(&leftover[id], kf, frame_id);
            activated.push(unconfirmed[it].clone());
        }

        for id in unmatched_detections {
            let mut track = leftover[id].clone();
            if track.score < self.config.new_track_thresh {
                continue;
            }
            track.activate(kf, frame_id, &mut self.ids);
            activated.push(track);
        }

        for track in self.lost.drain(..) {
            if frame_id - track.end_frame() <= self.max_time_lost {
                lost.push(track);
            }
        }

        let tracked: Vec<STrack> = activated
            .into_iter()
            .chain(refound)
            .filter(|t| t.state == TrackState::Tracked)
            .collect();
        let lost = sub_stracks(lost, &tracked);
        let (tracked, lost) = remove_duplicate_stracks(tracked, lost);
        self.tracked = tracked;
        self.lost = lost;

        self.tracked
            .iter()
            .filter(|t| t.is_activated)
            .cloned()
            .collect()
    }
}

fn rects(tracks: &[STrack]) -> Vec<Rect> {
    tracks.iter().map(STrack::rect).collect()
}

fn scores(tracks: &[STrack]) -> Vec<f32> {
    tracks.iter().map(|t| t.score).collect()
}

fn joint_stracks(mut first: Vec<STrack>, second: &[STrack]) -> Vec<STrack> {
    let mut seen: HashSet<u64> = first.iter().map(|t| t.track_id).collect();
    for track in second {
        if seen.insert(track.track_id) {
            first.push(track.clone());
        }
    }
    first
}

fn sub_stracks(tracks: Vec<STrack>, exclude: &[STrack]) -> Vec<STrack> {
    let excluded: HashSet<u64> = exclude.iter().map(|t| t.track_id).collect();
    tracks
        .into_iter()
        .filter(|t| !excluded.contains(&t.track_id))
        .collect()
}

/// Drop the younger of any tracked/lost pair overlapping above `DUPLICATE_IOU`.
fn remove_duplicate_stracks(
    tracked: Vec<STrack>,
    lost: Vec<STrack>,
) -> (Vec<STrack>, Vec<STrack>) {
    if tracked.is_empty() || lost.is_empty() {
        return (tracked, lost);
    }

    let ious = iou_batch(&rects(&tracked), &rects(&lost));
    let mut dup_tracked = vec![false; tracked.len()];
    let mut dup_lost = vec![false; lost.len()];
    for ((i, j), &iou) in ious.indexed_iter() {
        if iou > DUPLICATE_IOU {
            let age_tracked = tracked[i].frame_id - tracked[i].start_frame;
            let age_lost = lost[j].frame_id - lost[j].start_frame;
            if age_tracked > age_lost {
                dup_lost[j] = true;
            } else {
                dup_tracked[i] = true;
            }
        }
    }

    let keep = |tracks: Vec<STrack>, dup: &[bool]| -> Vec<STrack> {
        tracks
            .into_iter()
            .zip(dup)
            .filter_map(|(t, &d)| (!d).then_some(t))
            .collect()
    };
    (keep(tracked, &dup_tracked), keep(lost, &dup_lost))
}
