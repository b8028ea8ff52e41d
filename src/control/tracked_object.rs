use serde::Serialize;

use crate::config::ObjectConfig;
use crate::control::position::ObjectPosition;
use crate::tracker::RingBuffer;

/// Per-object summary exposed in status snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSnapshot {
    pub id: u64,
    pub object_class: String,
    /// Latest observation
    pub position: Option<ObjectPosition>,
    /// Normalized units per second
    pub velocity: Option<(f64, f64)>,
    pub speed: f64,
    /// Heading in radians
    pub direction: f64,
    /// Majority vote over recent speed samples
    pub moving: bool,
    /// Displacement-window verdict from the association layer.
    pub displacement_moving: Option<bool>,
    pub average_confidence: f64,
    pub average_area: f64,
    pub size_stability: f64,
    pub shape_ratio: f64,
    pub priority_score: f64,
    pub is_primary_target: bool,
    /// Seconds since first seen
    pub time_being_tracked: f64,
    /// Seconds spent as the primary target
    pub total_tracking_time: f64,
    pub frames_tracked: u64,
    pub frames_lost: u64,
}

/// A persistent identity with bounded history and derived motion/size stats.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    /// Identity from the association layer
    pub id: u64,
    positions: RingBuffer<ObjectPosition>,
    confidences: RingBuffer<f64>,
    moving_flags: RingBuffer<bool>,
    speed_threshold: f64,

    velocity: Option<(f64, f64)>,
    speed: f64,
    direction: f64,
    moving: bool,
    /// Movement verdict of the association layer
    pub displacement_moving: Option<bool>,

    average_area: f64,
    size_stability: f64,
    shape_ratio: f64,

    /// Session time of the first observation
    pub first_seen: f64,
    /// Session time of the newest observation; never decreases
    pub last_seen: f64,
    time_being_tracked: f64,
    total_tracking_time: f64,
    frames_tracked: u64,
    frames_lost: u64,

    /// Score from the last arbitration
    pub priority_score: f64,
    pub is_primary_target: bool,
    /// Session time the object last became the target
    pub last_targeted_time: Option<f64>,
}

impl TrackedObject {
    /// Object created from its first observation.
    pub fn new(id: u64, config: &ObjectConfig, first: ObjectPosition) -> Self {
        let mut object = Self {
            id,
            positions: RingBuffer::new(config.history_window),
            confidences: RingBuffer::new(config.history_window),
            moving_flags: RingBuffer::new(config.moving_vote_window),
            speed_threshold: config.moving_speed_threshold,
            velocity: None,
            speed: 0.0,
            direction: 0.0,
            moving: false,
            displacement_moving: None,
            average_area: 0.0,
            size_stability: 1.0,
            shape_ratio: 1.0,
            first_seen: first.timestamp,
            last_seen: first.timestamp,
            time_being_tracked: 0.0,
            total_tracking_time: 0.0,
            frames_tracked: 0,
            frames_lost: 0,
            priority_score: 0.0,
            is_primary_target: false,
            last_targeted_time: None,
        };
        object.add_position(first);
        object
    }

    pub fn add_position(&mut self, position: ObjectPosition) {
        let prev_seen = self.last_seen;
        let prev = self.positions.latest().cloned();

        self.last_seen = self.last_seen.max(position.timestamp);
        self.confidences.push(position.confidence);
        self.positions.push(position);

        if let Some(prev) = prev {
            self.update_velocity(&prev);
        }
        self.update_size_stats();

        self.frames_tracked += 1;
        self.time_being_tracked = self.last_seen - self.first_seen;
        if self.is_primary_target {
            self.total_tracking_time += self.last_seen - prev_seen;
        }
    }

    // Velocity follows the newest pair with a positive time step, so its
    // sign always matches the latest displacement.
    fn update_velocity(&mut self, prev: &ObjectPosition) {
        let Some(curr) = self.positions.latest() else {
            return;
        };
        let dt = curr.timestamp - prev.timestamp;
        if dt <= 0.0 {
            return;
        }
        let vx = (curr.cx - prev.cx) / dt;
        let vy = (curr.cy - prev.cy) / dt;
        self.velocity = Some((vx, vy));
        self.speed = vx.hypot(vy);
        self.direction = vy.atan2(vx);

        self.moving_flags.push(self.speed > self.speed_threshold);
        self.moving = self.moving_flags.majority();
    }

    fn update_size_stats(&mut self) {
        let n = self.positions.len() as f64;
        if n == 0.0 {
            return;
        }
        let areas: Vec<f64> = self.positions.iter().map(ObjectPosition::area_ratio).collect();
        let mean = areas.iter().sum::<f64>() / n;
        let variance = areas.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
        self.average_area = mean;
        self.size_stability = 1.0 / (1.0 + variance);

        let ratios: Vec<f64> = self
            .positions
            .iter()
            .filter(|p| p.height > 0.0)
            .map(|p| p.width / p.height)
            .collect();
        if !ratios.is_empty() {
            self.shape_ratio = ratios.iter().sum::<f64>() / ratios.len() as f64;
        }
    }

    /// Linear extrapolation; `None` until a velocity exists.
    pub fn get_predicted_position(&self, time_ahead: f64) -> Option<ObjectPosition> {
        let (vx, vy) = self.velocity?;
        let current = self.positions.latest()?;
        Some(current.shifted(
            current.cx + vx * time_ahead,
            current.cy + vy * time_ahead,
            current.timestamp + time_ahead,
        ))
    }

    pub fn is_lost(&self, now: f64, timeout: f64) -> bool {
        now - self.last_seen > timeout
    }

    /// Association reported the identity without a detection this frame.
    pub fn mark_missed(&mut self) {
        self.frames_lost += 1;
    }

    pub fn current_position(&self) -> Option<&ObjectPosition> {
        self.positions.latest()
    }

    pub fn history_len(&self) -> usize {
        self.positions.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &ObjectPosition> {
        self.positions.iter()
    }

    pub fn average_confidence(&self) -> f64 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        self.confidences.iter().sum::<f64>() / self.confidences.len() as f64
    }

    pub fn velocity(&self) -> Option<(f64, f64)> {
        self.velocity
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn average_area(&self) -> f64 {
        self.average_area
    }

    pub fn size_stability(&self) -> f64 {
        self.size_stability
    }

    pub fn shape_ratio(&self) -> f64 {
        self.shape_ratio
    }

    pub fn frames_tracked(&self) -> u64 {
        self.frames_tracked
    }

    pub fn frames_lost(&self) -> u64 {
        self.frames_lost
    }

    pub fn total_tracking_time(&self) -> f64 {
        self.total_tracking_time
    }

    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            object_class: self
                .current_position()
                .map(|p| p.object_class.clone())
                .unwrap_or_default(),
            position: self.current_position().cloned(),
            velocity: self.velocity,
            speed: self.speed,
            direction: self.direction,
            moving: self.moving,
            displacement_moving: self.displacement_moving,
            average_confidence: self.average_confidence(),
            average_area: self.average_area,
            size_stability: self.size_stability,
            shape_ratio: self.shape_ratio,
            priority_score: self.priority_score,
            is_primary_target: self.is_primary_target,
            time_being_tracked: self.time_being_tracked,
            total_tracking_time: self.total_tracking_time,
            frames_tracked: self.frames_tracked,
            frames_lost: self.frames_lost,
        }
    }
}
