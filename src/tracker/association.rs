//! Stable track identities on top of a pluggable association algorithm.
//!
//! The primary associator (ByteTrack by default) binds detections to tracks.
//! Whatever it leaves unclaimed is matched by IoU against tracks it did not
//! report this frame, tracks that stay unmatched age out after `lost_ttl`
//! frames, and lost tracks far from every current detection are pruned as
//! ghosts.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info};

use crate::config::AssociationConfig;
use crate::control::ObjectPosition;
use crate::tracker::byte_tracker::ByteTracker;
use crate::tracker::matching::{Detection, best_iou_match};
use crate::tracker::movement::MovementClassifier;
use crate::tracker::rect::Rect;
use crate::tracker::ring_buffer::RingBuffer;

/// One track reported by an [`Associator`] for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssociatedTrack {
    pub track_id: u64,
    /// Predicted or corrected box, in pixels.
    pub rect: Rect,
    /// Index of the matched detection, `None` when the track coasted.
    pub detection: Option<usize>,
}

/// Motion/appearance association algorithm used as the primary matcher.
pub trait Associator: Send {
    fn associate(&mut self, detections: &[Detection]) -> Vec<AssociatedTrack>;
}

impl Associator for ByteTracker {
    fn associate(&mut self, detections: &[Detection]) -> Vec<AssociatedTrack> {
        self.update(detections)
            .into_iter()
            .map(|t| AssociatedTrack {
                track_id: t.track_id,
                rect: t.rect(),
                detection: t.detection,
            })
            .collect()
    }
}

/// Per-track association output.
#[derive(Debug, Clone)]
pub struct TrackOutput {
    pub id: u64,
    /// Last matched box, in pixels.
    pub bbox: Rect,
    /// Last matched observation. Confidence and class persist from it while
    /// the track is unmatched.
    pub position: ObjectPosition,
    /// Recent pixel centers, oldest first.
    pub centers: Vec<(f32, f32)>,
    /// Smoothed movement verdict; `None` until enough history exists.
    pub moving: Option<bool>,
    /// Whether a detection was bound to this track in the current frame.
    pub matched: bool,
    pub lost_frames: u32,
}

#[derive(Debug, Clone)]
struct TrackEntry {
    bbox: Rect,
    position: ObjectPosition,
    centers: RingBuffer<(f32, f32)>,
    movement: MovementClassifier,
    moving: Option<bool>,
    lost_frames: u32,
    matched: bool,
}

impl TrackEntry {
    fn new(config: &AssociationConfig, bbox: Rect, position: ObjectPosition) -> Self {
        Self {
            bbox,
            position,
            centers: RingBuffer::new(config.center_history),
            movement: MovementClassifier::new(
                config.movement_history_steps,
                config.movement_smoothing_frames,
                config.movement_threshold,
            ),
            moving: None,
            lost_frames: 0,
            matched: false,
        }
    }

    fn observe(&mut self, bbox: Rect, position: &ObjectPosition) {
        self.bbox = bbox;
        self.position = position.clone();
        self.centers.push(bbox.center());
        if let Some(moving) = self.movement.observe(position.cx, position.cy) {
            self.moving = Some(moving);
        }
        self.lost_frames = 0;
        self.matched = true;
    }

    fn output(&self, id: u64) -> TrackOutput {
        TrackOutput {
            id,
            bbox: self.bbox,
            position: self.position.clone(),
            centers: self.centers.iter().copied().collect(),
            moving: self.moving,
            matched: self.matched,
            lost_frames: self.lost_frames,
        }
    }
}

pub struct AssociationTracker<A: Associator = ByteTracker> {
    associator: A,
    config: AssociationConfig,
    entries: BTreeMap<u64, TrackEntry>,
}

impl AssociationTracker<ByteTracker> {
    pub fn new(config: AssociationConfig) -> Self {
        let associator = ByteTracker::new(config.byte_track.clone());
        Self::with_associator(associator, config)
    }
}

impl<A: Associator> AssociationTracker<A> {
    pub fn with_associator(associator: A, config: AssociationConfig) -> Self {
        Self {
            associator,
            config,
            entries: BTreeMap::new(),
        }
    }

    /// Bind one frame of detections to track identities. Returns every live
    /// track (matched or coasting), ordered by id.
    pub fn update(&mut self, detections: &[ObjectPosition]) -> Vec<TrackOutput> {
        let boxes: Vec<Rect> = detections.iter().map(ObjectPosition::pixel_rect).collect();
        let dets: Vec<Detection> = boxes
            .iter()
            .zip(detections)
            .map(|(&bbox, p)| Detection::from_rect(bbox, p.confidence as f32))
            .collect();

        let primary = self.associator.associate(&dets);

        let mut matched: HashMap<u64, usize> = HashMap::new();
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut coasting: Vec<(u64, Rect)> = Vec::new();
        for track in &primary {
            match track.detection {
                Some(idx) if idx < dets.len() && claimed.insert(idx) => {
                    matched.insert(track.track_id, idx);
                }
                _ => coasting.push((track.track_id, track.rect)),
            }
        }

        // IoU fallback for tracks the associator did not bind this frame.
        let reported: HashSet<u64> = coasting.iter().map(|&(id, _)| id).collect();
        for (&id, entry) in &self.entries {
            if !matched.contains_key(&id) && !reported.contains(&id) {
                coasting.push((id, entry.bbox));
            }
        }
        for (idx, bbox) in boxes.iter().enumerate() {
            if claimed.contains(&idx) {
                continue;
            }
            let free = coasting
                .iter()
                .enumerate()
                .filter(|(_, (id, _))| !matched.contains_key(id))
                .map(|(slot, (_, rect))| (slot, rect));
            if let Some((slot, iou)) = best_iou_match(bbox, free) {
                let track_id = coasting[slot].0;
                debug!(track_id, detection = idx, iou, "IoU fallback match");
                matched.insert(track_id, idx);
                claimed.insert(idx);
            }
        }

        for (&track_id, &idx) in &matched {
            let entry = self
                .entries
                .entry(track_id)
                .or_insert_with(|| TrackEntry::new(&self.config, boxes[idx], detections[idx].clone()));
            entry.observe(boxes[idx], &detections[idx]);
        }

        self.age_unmatched(&matched);
        self.prune_ghosts(&boxes);

        self.entries
            .iter()
            .map(|(&id, entry)| entry.output(id))
            .collect()
    }

    fn age_unmatched(&mut self, matched: &HashMap<u64, usize>) {
        let lost_ttl = self.config.lost_ttl;
        self.entries.retain(|id, entry| {
            if matched.contains_key(id) {
                return true;
            }
            entry.matched = false;
            entry.lost_frames += 1;
            if entry.lost_frames > lost_ttl {
                info!(track_id = id, lost_frames = entry.lost_frames, "track removed after lost frames");
                return false;
            }
            true
        });
    }

    fn prune_ghosts(&mut self, boxes: &[Rect]) {
        let min_lost = self.config.ghost_min_lost_frames;
        let max_distance = self.config.ghost_distance_px;
        self.entries.retain(|id, entry| {
            if entry.matched || entry.lost_frames <= min_lost {
                return true;
            }
            let nearest = boxes
                .iter()
                .map(|b| entry.bbox.center_distance(b) as f64)
                .fold(f64::INFINITY, f64::min);
            if nearest > max_distance {
                info!(track_id = id, distance_px = nearest, "ghost track pruned: too far from detections");
                return false;
            }
            true
        });
    }
}
