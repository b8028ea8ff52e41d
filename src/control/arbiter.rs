//! Target selection with switching hysteresis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ScoringWeights, TrackingConfig};
use crate::control::tracked_object::TrackedObject;
use crate::error::ConfigError;

/// Controller state reported in status snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// No active objects.
    #[default]
    Idle,
    /// Following a target.
    Tracking,
    /// A target change happened this cycle.
    Switching,
    /// The target vanished and nothing replaced it.
    Lost,
    /// Device unreachable after a reconnect attempt.
    Error,
}

/// Normalized scoring components, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreComponents {
    /// Average confidence, saturating at 0.9
    pub confidence: f64,
    /// Speed of a moving object, saturating at 0.5 frame/s
    pub movement: f64,
    /// Area ratio, saturating at 0.3
    pub size: f64,
    /// One minus the distance to the frame center
    pub proximity: f64,
}

impl ScoreComponents {
    /// Components for an object's current state.
    pub fn of(object: &TrackedObject) -> Self {
        let confidence = (object.average_confidence() / 0.9).min(1.0);
        let movement = if object.is_moving() {
            (object.speed() / 0.5).min(1.0)
        } else {
            0.0
        };
        let (size, proximity) = object
            .current_position()
            .map(|p| {
                (
                    (p.area_ratio() / 0.3).min(1.0),
                    (1.0 - p.distance_to_center()).max(0.0),
                )
            })
            .unwrap_or((0.0, 0.0));
        Self {
            confidence,
            movement,
            size,
            proximity,
        }
    }

    /// Weighted sum. Weights are not normalized, so the score scale (and
    /// therefore how far apart two candidates sit) follows their sum.
    pub fn weighted(&self, w: &ScoringWeights) -> f64 {
        w.confidence * self.confidence
            + w.movement * self.movement
            + w.size * self.size
            + w.proximity * self.proximity
    }
}

/// Why the current target changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// A different object now scores highest.
    Priority,
    /// Forced rotation after `max_switch_interval`.
    Rotation,
    /// The previous target was removed.
    TargetLost,
}

/// A change of the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChange {
    /// First target of the session, or after an idle period.
    Acquired { to: u64 },
    /// Replaced the previous target.
    Switched {
        from: Option<u64>,
        to: u64,
        reason: SwitchReason,
    },
}

impl TargetChange {
    /// The new target.
    pub fn target(&self) -> u64 {
        match *self {
            TargetChange::Acquired { to } | TargetChange::Switched { to, .. } => to,
        }
    }
}

/// Target bookkeeping of the arbiter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArbiterState {
    /// Object the camera follows
    pub current_target_id: Option<u64>,
    /// Session time of the last target change; `None` before the first.
    pub last_switch_time: Option<f64>,
    /// Switches so far, loss re-selections included
    pub switch_count: u64,
    /// Set when the target was removed, consumed by the next selection.
    lost_target: Option<u64>,
}

/// Scores objects and decides which one the camera follows.
pub struct PriorityArbiter {
    weights: ScoringWeights,
    min_switch_interval: f64,
    max_switch_interval: f64,
    alternating: bool,
    state: ArbiterState,
}

impl PriorityArbiter {
    /// Arbiter with no target; fails on an invalid `config`.
    pub fn new(config: &TrackingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            weights: config.weights,
            min_switch_interval: config.min_switch_interval,
            max_switch_interval: config.max_switch_interval,
            alternating: config.alternating_enabled,
            state: ArbiterState::default(),
        })
    }

    pub fn state(&self) -> &ArbiterState {
        &self.state
    }

    pub fn current_target(&self) -> Option<u64> {
        self.state.current_target_id
    }

    /// Weighted priority of one object.
    pub fn score(&self, object: &TrackedObject) -> f64 {
        ScoreComponents::of(object).weighted(&self.weights)
    }

    /// Store a fresh priority on every object.
    pub fn score_all(&self, objects: &mut BTreeMap<u64, TrackedObject>) {
        for object in objects.values_mut() {
            object.priority_score = self.score(object);
        }
    }

    /// Pick a target when none is held. A pending loss makes this an
    /// involuntary switch that ignores hysteresis.
    pub fn select(
        &mut self,
        objects: &mut BTreeMap<u64, TrackedObject>,
        now: f64,
    ) -> Option<TargetChange> {
        if let Some(id) = self.state.current_target_id {
            if objects.contains_key(&id) {
                return None;
            }
            self.target_removed(id);
        }
        let best = argmax(objects, None)?;
        let change = match self.state.lost_target.take() {
            Some(lost) => {
                self.state.switch_count += 1;
                TargetChange::Switched {
                    from: Some(lost),
                    to: best,
                    reason: SwitchReason::TargetLost,
                }
            }
            None => TargetChange::Acquired { to: best },
        };
        self.apply(objects, best, now);
        info!(target_id = best, change = ?change, "target selected");
        Some(change)
    }

    /// Voluntary switch, subject to the dwell interval.
    pub fn maybe_switch(
        &mut self,
        objects: &mut BTreeMap<u64, TrackedObject>,
        now: f64,
    ) -> Option<TargetChange> {
        let current = self.state.current_target_id?;
        if !objects.contains_key(&current) {
            return None;
        }
        let elapsed = now - self.state.last_switch_time.unwrap_or(f64::NEG_INFINITY);

        let best = argmax(objects, Some(current))?;
        let (to, reason) = if best != current && elapsed >= self.min_switch_interval {
            (best, SwitchReason::Priority)
        } else if self.alternating && objects.len() > 1 && elapsed >= self.max_switch_interval {
            let next = objects
                .range(current + 1..)
                .next()
                .or_else(|| objects.iter().next())
                .map(|(&id, _)| id)?;
            (next, SwitchReason::Rotation)
        } else {
            return None;
        };

        self.state.switch_count += 1;
        self.apply(objects, to, now);
        info!(from = current, to, reason = ?reason, switch_count = self.state.switch_count, "target switched");
        Some(TargetChange::Switched {
            from: Some(current),
            to,
            reason,
        })
    }

    /// The current target was purged; the next selection replaces it.
    pub fn target_removed(&mut self, id: u64) -> bool {
        if self.state.current_target_id != Some(id) {
            return false;
        }
        self.state.current_target_id = None;
        self.state.lost_target = Some(id);
        true
    }

    /// Whether a removed target is still waiting for a replacement.
    pub fn has_pending_loss(&self) -> bool {
        self.state.lost_target.is_some()
    }

    fn apply(&mut self, objects: &mut BTreeMap<u64, TrackedObject>, to: u64, now: f64) {
        for (id, object) in objects.iter_mut() {
            object.is_primary_target = *id == to;
        }
        if let Some(object) = objects.get_mut(&to) {
            object.last_targeted_time = Some(now);
        }
        self.state.current_target_id = Some(to);
        self.state.last_switch_time = Some(now);
    }
}

/// Highest priority id. Ties keep `incumbent`, otherwise the lowest id wins.
fn argmax(objects: &BTreeMap<u64, TrackedObject>, incumbent: Option<u64>) -> Option<u64> {
    let mut best: Option<(u64, f64)> = incumbent
        .and_then(|id| objects.get(&id))
        .map(|o| (o.id, o.priority_score));
    for (&id, object) in objects {
        match best {
            Some((_, score)) if object.priority_score <= score => {}
            _ => best = Some((id, object.priority_score)),
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectConfig;
    use crate::control::ObjectPosition;

    fn object(id: u64, score: f64) -> TrackedObject {
        let pos = ObjectPosition::new(0.5, 0.5, 0.1, 0.1, 0.9, 0.0, 1920, 1080, "boat");
        let mut o = TrackedObject::new(id, &ObjectConfig::default(), pos);
        o.priority_score = score;
        o
    }

    fn arbiter(min: f64, max: f64, alternating: bool) -> PriorityArbiter {
        let config = TrackingConfig {
            min_switch_interval: min,
            max_switch_interval: max,
            alternating_enabled: alternating,
            ..TrackingConfig::default()
        };
        PriorityArbiter::new(&config).unwrap()
    }

    #[test]
    fn test_selects_highest_priority() {
        let mut objects = BTreeMap::from([(1, object(1, 0.3)), (2, object(2, 0.9))]);
        let mut arb = arbiter(1.0, 30.0, true);
        assert_eq!(arb.select(&mut objects, 0.0), Some(TargetChange::Acquired { to: 2 }));
        assert_eq!(arb.current_target(), Some(2));
        assert!(objects[&2].is_primary_target);
        assert!(!objects[&1].is_primary_target);
        assert_eq!(arb.state().switch_count, 0);
        assert_eq!(arb.select(&mut objects, 0.1), None);
    }

    #[test]
    fn test_switch_waits_for_min_interval() {
        let mut objects = BTreeMap::from([(1, object(1, 0.9)), (2, object(2, 0.3))]);
        let mut arb = arbiter(1.5, 30.0, false);
        arb.select(&mut objects, 0.0);

        objects.get_mut(&2).unwrap().priority_score = 0.95;
        assert_eq!(arb.maybe_switch(&mut objects, 1.0), None);
        let change = arb.maybe_switch(&mut objects, 1.5).unwrap();
        assert_eq!(change.target(), 2);
        assert_eq!(arb.state().switch_count, 1);
        assert_eq!(arb.state().last_switch_time, Some(1.5));
    }

    #[test]
    fn test_tie_keeps_current() {
        let mut objects = BTreeMap::from([(1, object(1, 0.5)), (2, object(2, 0.5))]);
        let mut arb = arbiter(0.1, 30.0, false);
        arb.select(&mut objects, 0.0);
        assert_eq!(arb.current_target(), Some(1));
        assert_eq!(arb.maybe_switch(&mut objects, 5.0), None);
    }

    #[test]
    fn test_rotation_after_max_interval() {
        let mut objects = BTreeMap::from([
            (1, object(1, 0.9)),
            (2, object(2, 0.5)),
            (3, object(3, 0.4)),
        ]);
        let mut arb = arbiter(1.0, 10.0, true);
        arb.select(&mut objects, 0.0);
        assert_eq!(arb.maybe_switch(&mut objects, 9.0), None);
        let change = arb.maybe_switch(&mut objects, 10.0).unwrap();
        assert_eq!(
            change,
            TargetChange::Switched {
                from: Some(1),
                to: 2,
                reason: SwitchReason::Rotation
            }
        );
    }

    #[test]
    fn test_no_rotation_when_disabled() {
        let mut objects = BTreeMap::from([(1, object(1, 0.9)), (2, object(2, 0.5))]);
        let mut arb = arbiter(1.0, 10.0, false);
        arb.select(&mut objects, 0.0);
        assert_eq!(arb.maybe_switch(&mut objects, 100.0), None);
    }

    #[test]
    fn test_loss_bypasses_hysteresis() {
        let mut objects = BTreeMap::from([(1, object(1, 0.9)), (2, object(2, 0.3))]);
        let mut arb = arbiter(5.0, 30.0, false);
        arb.select(&mut objects, 0.0);

        objects.remove(&1);
        assert!(arb.target_removed(1));
        let change = arb.select(&mut objects, 0.1).unwrap();
        assert_eq!(
            change,
            TargetChange::Switched {
                from: Some(1),
                to: 2,
                reason: SwitchReason::TargetLost
            }
        );
        assert_eq!(arb.state().switch_count, 1);
    }

    #[test]
    fn test_score_monotonic_in_each_component() {
        let w = ScoringWeights::default();
        let base = ScoreComponents {
            confidence: 0.5,
            movement: 0.5,
            size: 0.5,
            proximity: 0.5,
        };
        let s = base.weighted(&w);
        for bump in [
            ScoreComponents { confidence: 0.6, ..base },
            ScoreComponents { movement: 0.6, ..base },
            ScoreComponents { size: 0.6, ..base },
            ScoreComponents { proximity: 0.6, ..base },
        ] {
            assert!(bump.weighted(&w) >= s);
        }
    }

    #[test]
    fn test_components_saturate() {
        let pos = ObjectPosition::new(0.5, 0.5, 0.9, 0.9, 1.0, 0.0, 1920, 1080, "ship");
        let o = TrackedObject::new(1, &ObjectConfig::default(), pos);
        let c = ScoreComponents::of(&o);
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.size, 1.0);
        assert_eq!(c.proximity, 1.0);
        assert_eq!(c.movement, 0.0);
    }
}
