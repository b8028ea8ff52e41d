//! One tracking cycle, independent of threads and wall-clock time.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::TrackingConfig;
use crate::control::arbiter::{PriorityArbiter, TargetChange, TrackingState};
use crate::control::motion::{MotionCommand, PtzMotionController};
use crate::control::position::ObjectPosition;
use crate::control::statistics::{
    IngestSummary, MovementStatus, ObjectStats, PerformanceRates, PtzMovementStats,
    SessionTotals, TrackerStatus, TrackingStatistics, ZoomStats,
};
use crate::control::tracked_object::{ObjectSnapshot, TrackedObject};
use crate::device::CommandGate;
use crate::error::{ConfigError, ConnectionError, TransportError};
use crate::tracker::AssociationTracker;

/// What happened in one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// State after the cycle
    pub state: TrackingState,
    /// Target after the cycle
    pub target: Option<u64>,
    /// Target change made in this cycle, if any
    pub change: Option<TargetChange>,
    /// Command sent to the device, if any
    pub command: Option<MotionCommand>,
    /// Set when the device could not be reconnected; the loop must exit.
    pub fatal: Option<ConnectionError>,
}

/// Sole owner of tracked objects, arbiter state and motion state.
pub struct TrackingCore {
    config: TrackingConfig,
    association: AssociationTracker,
    objects: BTreeMap<u64, TrackedObject>,
    /// Ids evicted for capacity; ignored while the tracker is full.
    evicted: HashSet<u64>,
    arbiter: PriorityArbiter,
    motion: PtzMotionController,
    gate: Arc<CommandGate>,
    state: TrackingState,
    totals: SessionTotals,
    session_start: f64,
    /// Pan/tilt are known to be at rest.
    at_rest: bool,
}

impl TrackingCore {
    /// Validate `config` and start idle. In absolute mode the pose is read
    /// from the device first.
    pub fn new(
        config: TrackingConfig,
        gate: Arc<CommandGate>,
        session_start: f64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let arbiter = PriorityArbiter::new(&config)?;
        let mut motion = PtzMotionController::new(&config, gate.clone())?;
        if config.motion.use_absolute_move {
            motion.sync_pose();
        }
        Ok(Self {
            association: AssociationTracker::new(config.admitted_association()),
            objects: BTreeMap::new(),
            evicted: HashSet::new(),
            arbiter,
            motion,
            gate,
            state: TrackingState::Idle,
            totals: SessionTotals::default(),
            session_start,
            at_rest: true,
            config,
        })
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn objects(&self) -> &BTreeMap<u64, TrackedObject> {
        &self.objects
    }

    pub fn arbiter(&self) -> &PriorityArbiter {
        &self.arbiter
    }

    pub fn motion(&self) -> &PtzMotionController {
        &self.motion
    }

    pub fn current_target(&self) -> Option<u64> {
        self.arbiter.current_target()
    }

    /// Session counters, including arbiter switches and zoom changes.
    pub fn totals(&self) -> SessionTotals {
        SessionTotals {
            switch_count: self.arbiter.state().switch_count,
            zoom_changes: self.motion.zoom().change_count(),
            ..self.totals
        }
    }

    /// Bind a filtered batch to identities and update or create objects.
    pub fn ingest(&mut self, batch: &[ObjectPosition]) {
        let tracks = self.association.update(batch);
        let live: HashSet<u64> = tracks.iter().map(|t| t.id).collect();
        self.evicted.retain(|id| live.contains(id));

        for track in tracks {
            if self.evicted.contains(&track.id) {
                if !track.matched || self.objects.len() >= self.config.max_objects_to_track {
                    continue;
                }
                self.evicted.remove(&track.id);
                debug!(object_id = track.id, "evicted object re-admitted");
            }
            if !track.matched {
                if let Some(object) = self.objects.get_mut(&track.id) {
                    object.mark_missed();
                }
                continue;
            }
            let object = match self.objects.entry(track.id) {
                Entry::Occupied(entry) => {
                    let object = entry.into_mut();
                    object.add_position(track.position);
                    object
                }
                Entry::Vacant(entry) => {
                    info!(
                        object_id = track.id,
                        class = %track.position.object_class,
                        cx = track.position.cx,
                        cy = track.position.cy,
                        "new object tracked"
                    );
                    self.totals.objects_created += 1;
                    entry.insert(TrackedObject::new(track.id, &self.config.object, track.position))
                }
            };
            object.displacement_moving = track.moving;
        }
    }

    /// Run one cycle. `batch` is the newest detection batch, if one arrived.
    pub fn cycle(&mut self, batch: Option<&[ObjectPosition]>, now: f64) -> CycleReport {
        if let Some(batch) = batch {
            self.ingest(batch);
        }

        self.arbiter.score_all(&mut self.objects);
        let mut change = self.arbiter.select(&mut self.objects, now);
        if change.is_none() {
            change = self.arbiter.maybe_switch(&mut self.objects, now);
        }

        let (command, fatal) = self.drive(now);

        if let Some(reselected) = self.purge(now) {
            change = Some(reselected);
        }

        self.state = if fatal.is_some() {
            TrackingState::Error
        } else if matches!(change, Some(TargetChange::Switched { .. })) {
            TrackingState::Switching
        } else if self.arbiter.current_target().is_some() {
            TrackingState::Tracking
        } else if self.arbiter.has_pending_loss() {
            TrackingState::Lost
        } else {
            TrackingState::Idle
        };
        self.totals.cycles += 1;

        CycleReport {
            state: self.state,
            target: self.arbiter.current_target(),
            change,
            command,
            fatal,
        }
    }

    fn drive(&mut self, now: f64) -> (Option<MotionCommand>, Option<ConnectionError>) {
        let target = self
            .arbiter
            .current_target()
            .and_then(|id| self.objects.get(&id));

        let failure = match target {
            Some(target) => match self.motion.track(target, now) {
                Some(Ok(cmd)) => {
                    self.totals.successful_tracks += 1;
                    self.at_rest = cmd.pan_speed == 0.0 && cmd.tilt_speed == 0.0;
                    return (Some(cmd), None);
                }
                Some(Err(e)) => e,
                None => return (None, None),
            },
            None if !self.at_rest => match self.motion.hold(now) {
                Ok(()) => {
                    debug!("no target, PTZ held");
                    self.at_rest = true;
                    return (None, None);
                }
                Err(e) => e,
            },
            None => return (None, None),
        };

        if failure == TransportError::Halted {
            return (None, None);
        }
        self.totals.failed_tracks += 1;
        (None, self.recover())
    }

    /// Reconnect after too many consecutive transport failures.
    fn recover(&mut self) -> Option<ConnectionError> {
        let failures = self.motion.counters().consecutive_failures;
        if failures < self.config.max_consecutive_failures {
            return None;
        }
        warn!(failures, "too many consecutive PTZ failures, reconnecting");
        match self.gate.connect(self.config.connect_timeout()) {
            Ok(()) => {
                info!("PTZ reconnected");
                self.totals.reconnects += 1;
                self.motion.reset_failures();
                None
            }
            Err(e) => {
                error!(error = %e, failures, "PTZ reconnect failed, stopping tracker");
                self.motion.halt();
                Some(ConnectionError::ReconnectFailed { failures })
            }
        }
    }

    /// Remove expired objects, then evict the lowest priorities over
    /// capacity. Re-selects at once if the target was removed.
    fn purge(&mut self, now: f64) -> Option<TargetChange> {
        let lifetime = self.config.object_lifetime;
        let expired: Vec<u64> = self
            .objects
            .values()
            .filter(|o| o.is_lost(now, lifetime))
            .map(|o| o.id)
            .collect();
        for id in expired {
            self.objects.remove(&id);
            self.totals.objects_expired += 1;
            info!(object_id = id, "object expired");
            if self.arbiter.target_removed(id) {
                self.totals.target_losses += 1;
                info!(object_id = id, "target lost");
            }
        }

        let current = self.arbiter.current_target();
        while self.objects.len() > self.config.max_objects_to_track {
            let Some(victim) = self
                .objects
                .values()
                .filter(|o| Some(o.id) != current)
                .min_by(|a, b| {
                    a.priority_score
                        .total_cmp(&b.priority_score)
                        .then(a.last_seen.total_cmp(&b.last_seen))
                })
                .map(|o| o.id)
            else {
                break;
            };
            self.objects.remove(&victim);
            self.evicted.insert(victim);
            self.totals.objects_evicted += 1;
            info!(object_id = victim, "object evicted, over capacity");
        }

        if self.arbiter.has_pending_loss() {
            return self.arbiter.select(&mut self.objects, now);
        }
        None
    }

    /// Terminal stop; only the first call reaches the device.
    pub fn halt(&mut self) -> bool {
        self.motion.halt()
    }

    /// Snapshot of every tracked object, ordered by id.
    pub fn snapshots(&self) -> Vec<ObjectSnapshot> {
        self.objects.values().map(TrackedObject::snapshot).collect()
    }

    pub fn statistics(&self, now: f64, ingest: IngestSummary) -> TrackingStatistics {
        let duration = (now - self.session_start).max(0.0);
        let totals = self.totals();
        let zoom = self.motion.zoom();
        TrackingStatistics {
            session_duration: duration,
            performance: PerformanceRates::compute(ingest.received, &totals, duration),
            ptz_movement: PtzMovementStats::from_log(self.motion.state().log()),
            zoom_control: ZoomStats::from_history(zoom.change_count(), zoom.level(), zoom.history()),
            objects: ObjectStats::from_snapshots(&self.snapshots()),
            totals,
            ingest,
        }
    }

    /// Full status snapshot for publication.
    pub fn status(&self, now: f64, active: bool, ingest: IngestSummary) -> TrackerStatus {
        let motion = self.motion.state();
        TrackerStatus {
            timestamp: now,
            state: self.state,
            active,
            current_target: self.arbiter.current_target(),
            objects: self.snapshots(),
            zoom_level: self.motion.zoom().level(),
            movement: MovementStatus {
                pan_speed: motion.pan_speed,
                tilt_speed: motion.tilt_speed,
                pose: motion.pose,
                mode: Some(self.motion.dispatcher().mode()),
            },
            statistics: self.statistics(now, ingest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{PtzDevice, PtzPose};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Flaky {
        failures_left: Arc<Mutex<u32>>,
        connects: Arc<Mutex<u32>>,
        velocities: Arc<Mutex<Vec<(f64, f64)>>>,
    }

    impl PtzDevice for Flaky {
        fn connect(&mut self, _: Duration) -> Result<(), ConnectionError> {
            *self.connects.lock().unwrap() += 1;
            Ok(())
        }
        fn move_absolute(&mut self, _: f64, _: f64, _: f64, _: f64) -> Result<(), TransportError> {
            Ok(())
        }
        fn move_continuous(&mut self, pan: f64, tilt: f64, _: f64, _: Option<Duration>) -> Result<(), TransportError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(TransportError::Rejected {
                    command: "move_continuous",
                    reason: "busy".to_string(),
                });
            }
            self.velocities.lock().unwrap().push((pan, tilt));
            Ok(())
        }
        fn stop(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        fn get_position(&mut self) -> Option<PtzPose> {
            None
        }
    }

    fn obj(cx: f64, t: f64) -> ObjectPosition {
        ObjectPosition::new(cx, 0.5, 0.2, 0.2, 0.9, t, 1920, 1080, "boat")
    }

    #[test]
    fn test_reconnects_after_failure_streak() {
        let device = Flaky::default();
        *device.failures_left.lock().unwrap() = 3;
        let connects = device.connects.clone();
        let config = TrackingConfig {
            max_consecutive_failures: 3,
            ..TrackingConfig::default()
        };
        let gate = Arc::new(CommandGate::new(Box::new(device)));
        let mut core = TrackingCore::new(config, gate, 0.0).unwrap();

        for step in 0..3 {
            let t = step as f64 * 0.1;
            let report = core.cycle(Some(&[obj(0.7, t)]), t);
            assert!(report.fatal.is_none());
        }
        assert_eq!(*connects.lock().unwrap(), 1);
        assert_eq!(core.totals().reconnects, 1);
        assert_eq!(core.motion().counters().consecutive_failures, 0);

        let report = core.cycle(Some(&[obj(0.7, 0.3)]), 0.3);
        assert!(report.command.is_some());
        assert_eq!(report.state, TrackingState::Tracking);
        assert_eq!(core.totals().failed_tracks, 3);
    }

    #[test]
    fn test_holds_once_when_target_gone() {
        let device = Flaky::default();
        let velocities = device.velocities.clone();
        let gate = Arc::new(CommandGate::new(Box::new(device)));
        let mut core = TrackingCore::new(TrackingConfig::default(), gate, 0.0).unwrap();

        core.cycle(Some(&[obj(0.8, 0.0)]), 0.0);
        // Past the lifetime the target is purged; the next cycles hold once.
        core.cycle(None, 3.5);
        core.cycle(None, 3.6);
        core.cycle(None, 3.7);

        let sent = velocities.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].0 > 0.0);
        assert_eq!(sent[2], (0.0, 0.0));
    }
}
