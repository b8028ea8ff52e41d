//! Background control loop and its public handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use tracing::{error, info, warn};

use crate::config::TrackingConfig;
use crate::control::cycle::TrackingCore;
use crate::control::position::ObjectPosition;
use crate::control::statistics::{IngestMetrics, TrackerStatus, TrackingStatistics};
use crate::device::{CommandGate, PtzDevice};
use crate::error::{ConfigError, Error, Result};
use crate::integration::{RawDetection, filter_detections};

/// Monotonic seconds since the session started.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    /// Clock starting at zero now.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

struct Session {
    clock: SessionClock,
    sender: Sender<Vec<ObjectPosition>>,
    /// Producer-side receiver used to discard the oldest batch when full.
    backlog: Receiver<Vec<ObjectPosition>>,
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Multi-object PTZ tracker.
///
/// One background thread owns all tracking state; detections are handed to
/// it over a bounded channel and status is read from a snapshot the loop
/// publishes each cycle. All methods take `&self`, so the handle can be
/// shared across threads.
pub struct PtzTracker {
    config: TrackingConfig,
    gate: Arc<CommandGate>,
    running: Arc<AtomicBool>,
    ingest: IngestMetrics,
    status: Arc<Mutex<TrackerStatus>>,
    session: Mutex<Option<Session>>,
}

impl PtzTracker {
    /// Validate `config` and wrap `device`. Nothing is sent until [`start`].
    ///
    /// [`start`]: PtzTracker::start
    pub fn new(config: TrackingConfig, device: Box<dyn PtzDevice>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            gate: Arc::new(CommandGate::new(device)),
            running: Arc::new(AtomicBool::new(false)),
            ingest: IngestMetrics::new(),
            status: Arc::new(Mutex::new(TrackerStatus::default())),
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Connect to the device and spawn the control loop. A no-op while running.
    pub fn start(&self) -> Result<()> {
        let mut session = lock(&self.session);
        if self.is_running() {
            info!("tracker already running");
            return Ok(());
        }
        // A loop that exited on its own still holds a finished session.
        if let Some(old) = session.take() {
            let _ = old.handle.join();
        }

        self.gate.rearm();
        if let Err(e) = self.gate.connect(self.config.connect_timeout()) {
            error!(error = %e, "PTZ connection failed, tracker not started");
            return Err(e.into());
        }

        let clock = SessionClock::start();
        let core = TrackingCore::new(self.config.clone(), self.gate.clone(), clock.now())?;
        let (sender, receiver) = bounded(self.config.detection_queue_capacity);
        let (exit_tx, exited) = bounded(1);
        let backlog = receiver.clone();

        self.running.store(true, Ordering::SeqCst);
        let worker = ControlLoop {
            core,
            receiver,
            clock,
            period: self.config.control_period(),
            running: self.running.clone(),
            status: self.status.clone(),
            ingest: self.ingest.clone(),
        };
        let spawned = thread::Builder::new()
            .name("ptz-tracking".to_string())
            .spawn(move || {
                worker.run();
                let _ = exit_tx.send(());
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(Error::Spawn(e));
            }
        };

        *session = Some(Session {
            clock,
            sender,
            backlog,
            handle,
            exited,
        });
        info!(
            rate_hz = self.config.control_rate_hz,
            absolute = self.config.motion.use_absolute_move,
            "tracking started"
        );
        Ok(())
    }

    /// Stop the loop, wait up to `join_timeout`, then send the terminal stop.
    /// In absolute mode the reported pose is read back afterwards.
    ///
    /// Safe to call repeatedly and from several threads; the device sees
    /// exactly one stop per session.
    pub fn stop(&self) {
        let Some(session) = lock(&self.session).take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        drop(session.sender);

        match session.exited.recv_timeout(self.config.join_timeout()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = session.handle.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.config.join_timeout(), "tracking loop did not exit in time");
            }
        }

        // Blocks further commands from a loop that missed the deadline.
        self.gate.halt();
        let pose = if self.config.motion.use_absolute_move {
            self.gate.position()
        } else {
            None
        };

        let mut status = lock(&self.status);
        status.active = false;
        status.objects.clear();
        status.current_target = None;
        status.movement.pan_speed = 0.0;
        status.movement.tilt_speed = 0.0;
        if let Some(pose) = pose {
            status.movement.pose = pose;
        }
        info!("tracking stopped");
    }

    /// Hand a detection batch to the loop. Returns `false` when not running.
    ///
    /// Malformed entries and those below the confidence or size thresholds
    /// are dropped here. When the queue is full the oldest batch is discarded.
    pub fn update_detections(&self, detections: &[RawDetection]) -> bool {
        if !self.is_running() {
            return false;
        }
        let (clock, sender, backlog) = match lock(&self.session).as_ref() {
            Some(s) => (s.clock, s.sender.clone(), s.backlog.clone()),
            None => return false,
        };

        let batch = filter_detections(detections, &self.config, clock.now());
        self.ingest.record(detections.len(), &batch);
        let mut positions = batch.positions;
        loop {
            match sender.try_send(positions) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => {
                    positions = rejected;
                    if backlog.try_recv().is_ok() {
                        self.ingest.inc(&self.ingest.dropped_batches);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    /// Latest published snapshot, with ingest counters read live.
    pub fn get_status(&self) -> TrackerStatus {
        let mut status = lock(&self.status).clone();
        status.statistics.ingest = self.ingest.summary();
        status
    }

    /// Statistics part of [`PtzTracker::get_status`].
    pub fn get_tracking_statistics(&self) -> TrackingStatistics {
        self.get_status().statistics
    }
}

impl Drop for PtzTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ControlLoop {
    core: TrackingCore,
    receiver: Receiver<Vec<ObjectPosition>>,
    clock: SessionClock,
    period: Duration,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<TrackerStatus>>,
    ingest: IngestMetrics,
}

impl ControlLoop {
    fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();

            // Latest batch wins; older ones are superseded.
            let mut latest = None;
            for batch in self.receiver.try_iter() {
                if latest.replace(batch).is_some() {
                    self.ingest.inc(&self.ingest.dropped_batches);
                }
            }

            let now = self.clock.now();
            let report = self.core.cycle(latest.as_deref(), now);
            *lock(&self.status) = self.core.status(now, true, self.ingest.summary());

            if let Some(fatal) = report.fatal {
                error!(error = %fatal, "tracking loop exiting");
                self.running.store(false, Ordering::SeqCst);
                lock(&self.status).active = false;
                break;
            }

            let elapsed = started.elapsed();
            if elapsed < self.period {
                thread::sleep(self.period - elapsed);
            }
        }
    }
}
