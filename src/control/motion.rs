//! Pan/tilt/zoom command computation and device dispatch.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{MotionConfig, TrackingConfig};
use crate::control::position::ObjectPosition;
use crate::control::tracked_object::TrackedObject;
use crate::control::zoom::ZoomController;
use crate::device::{CommandGate, PtzPose};
use crate::error::{ConfigError, TransportError};
use crate::tracker::RingBuffer;

/// One cycle's command. Speeds are in [-1, 1] device units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotionCommand {
    /// Positive pans right.
    pub pan_speed: f64,
    /// Positive tilts up.
    pub tilt_speed: f64,
    /// Continuous zoom velocity.
    pub zoom_speed: f64,
    /// Absolute zoom level.
    pub zoom_level: f64,
}

/// Kind of device command used by a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Absolute,
    Continuous,
}

/// One dispatched command, kept in the movement log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovementRecord {
    pub timestamp: f64,
    pub pan_speed: f64,
    pub tilt_speed: f64,
    pub zoom_level: f64,
    pub mode: DispatchMode,
    /// Whether the device accepted it
    pub ok: bool,
}

/// Loop-owned view of the camera.
#[derive(Debug, Clone)]
pub struct MotionState {
    /// Estimated pose; exact only in absolute mode
    pub pose: PtzPose,
    /// Last commanded pan speed
    pub pan_speed: f64,
    /// Last commanded tilt speed
    pub tilt_speed: f64,
    log: RingBuffer<MovementRecord>,
}

impl MotionState {
    fn new(zoom: f64, log_capacity: usize) -> Self {
        Self {
            pose: PtzPose {
                zoom,
                ..PtzPose::default()
            },
            pan_speed: 0.0,
            tilt_speed: 0.0,
            log: RingBuffer::new(log_capacity),
        }
    }

    /// Recent commands, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &MovementRecord> {
        self.log.iter()
    }
}

/// How commands reach the device, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatcher {
    /// Integrate speed over one control period into the pose estimate and
    /// send that pose.
    Absolute { speed: f64, step_secs: f64 },
    /// Send velocities; the camera keeps moving until the next command.
    Continuous,
}

impl Dispatcher {
    /// Strategy selected by `motion.use_absolute_move`.
    pub fn from_config(config: &TrackingConfig) -> Self {
        if config.motion.use_absolute_move {
            Dispatcher::Absolute {
                speed: config.motion.absolute_move_speed,
                step_secs: config.control_period().as_secs_f64(),
            }
        } else {
            Dispatcher::Continuous
        }
    }

    pub fn mode(&self) -> DispatchMode {
        match self {
            Dispatcher::Absolute { .. } => DispatchMode::Absolute,
            Dispatcher::Continuous => DispatchMode::Continuous,
        }
    }

    /// Send `cmd` through `gate` and record it in `state`.
    pub fn dispatch(
        &self,
        gate: &CommandGate,
        state: &mut MotionState,
        cmd: &MotionCommand,
        now: f64,
    ) -> Result<(), TransportError> {
        state.pan_speed = cmd.pan_speed;
        state.tilt_speed = cmd.tilt_speed;

        let result = match *self {
            Dispatcher::Absolute { speed, step_secs } => {
                let pose = PtzPose {
                    pan: (state.pose.pan + cmd.pan_speed * step_secs).clamp(-1.0, 1.0),
                    tilt: (state.pose.tilt + cmd.tilt_speed * step_secs).clamp(-1.0, 1.0),
                    zoom: cmd.zoom_level.clamp(0.0, 1.0),
                };
                gate.command(|d| d.move_absolute(pose.pan, pose.tilt, pose.zoom, speed))
                    .map(|()| state.pose = pose)
            }
            Dispatcher::Continuous => gate
                .command(|d| d.move_continuous(cmd.pan_speed, cmd.tilt_speed, cmd.zoom_speed, None))
                .map(|()| state.pose.zoom = cmd.zoom_level),
        };

        state.log.push(MovementRecord {
            timestamp: now,
            pan_speed: cmd.pan_speed,
            tilt_speed: cmd.tilt_speed,
            zoom_level: cmd.zoom_level,
            mode: self.mode(),
            ok: result.is_ok(),
        });
        result
    }
}

/// Dispatch outcomes of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DispatchCounters {
    pub successful: u64,
    pub failed: u64,
    /// Failures since the last success or reconnect
    pub consecutive_failures: u32,
}

/// Turns a target into clamped pan/tilt/zoom commands and dispatches them.
pub struct PtzMotionController {
    config: MotionConfig,
    zoom: ZoomController,
    dispatcher: Dispatcher,
    state: MotionState,
    gate: Arc<CommandGate>,
    counters: DispatchCounters,
}

impl PtzMotionController {
    /// Controller sending through `gate`; fails on an invalid `config`.
    pub fn new(config: &TrackingConfig, gate: Arc<CommandGate>) -> Result<Self, ConfigError> {
        config.validate()?;
        let zoom = ZoomController::new(&config.zoom);
        Ok(Self {
            config: config.motion.clone(),
            state: MotionState::new(zoom.level(), config.motion.movement_log_capacity),
            zoom,
            dispatcher: Dispatcher::from_config(config),
            gate,
            counters: DispatchCounters::default(),
        })
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn zoom(&self) -> &ZoomController {
        &self.zoom
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher
    }

    pub fn counters(&self) -> DispatchCounters {
        self.counters
    }

    /// Pan/tilt speeds for a position: proportional to the offset from the
    /// frame center, tilt inverted, each clamped to its max speed.
    pub fn pan_tilt_for(&self, position: &ObjectPosition) -> (f64, f64) {
        let cfg = &self.config;
        let error_x = position.cx - 0.5;
        let error_y = position.cy - 0.5;
        if error_x.hypot(error_y) <= cfg.dead_zone {
            return (0.0, 0.0);
        }
        let pan = (error_x * cfg.gain).clamp(-cfg.max_pan_speed, cfg.max_pan_speed);
        let tilt = (-error_y * cfg.gain).clamp(-cfg.max_tilt_speed, cfg.max_tilt_speed);
        (pan, tilt)
    }

    /// Command for the target, using the predicted position when enabled.
    pub fn compute_command(&mut self, target: &TrackedObject, now: f64) -> Option<MotionCommand> {
        let observed = target.current_position()?;
        let predicted = self
            .config
            .prediction_enabled
            .then(|| target.get_predicted_position(self.config.prediction_time))
            .flatten();
        let aim = predicted.as_ref().unwrap_or(observed);

        let (pan_speed, tilt_speed) = self.pan_tilt_for(aim);
        let zoom = self.zoom.update(observed.area_ratio(), now);
        Some(MotionCommand {
            pan_speed,
            tilt_speed,
            zoom_speed: zoom.velocity,
            zoom_level: zoom.level,
        })
    }

    /// Dispatch and count. Failures are returned for the loop to act on,
    /// never panicked on.
    pub fn dispatch(&mut self, cmd: &MotionCommand, now: f64) -> Result<(), TransportError> {
        let result = self.dispatcher.dispatch(&self.gate, &mut self.state, cmd, now);
        match &result {
            Ok(()) => {
                self.counters.successful += 1;
                self.counters.consecutive_failures = 0;
                debug!(pan = cmd.pan_speed, tilt = cmd.tilt_speed, zoom = cmd.zoom_level, "PTZ command sent");
            }
            Err(TransportError::Halted) => {}
            Err(e) => {
                self.counters.failed += 1;
                self.counters.consecutive_failures += 1;
                warn!(error = %e, consecutive = self.counters.consecutive_failures, "PTZ command failed");
            }
        }
        result
    }

    /// Compute and dispatch the command for `target`. `None` when the target
    /// has no position.
    pub fn track(&mut self, target: &TrackedObject, now: f64) -> Option<Result<MotionCommand, TransportError>> {
        let cmd = self.compute_command(target, now)?;
        Some(self.dispatch(&cmd, now).map(|()| cmd))
    }

    /// Zero pan/tilt while keeping the zoom level; issued when the target goes away.
    pub fn hold(&mut self, now: f64) -> Result<(), TransportError> {
        let cmd = MotionCommand {
            zoom_level: self.zoom.level(),
            ..MotionCommand::default()
        };
        self.dispatch(&cmd, now)
    }

    /// Absolute mode starts from the pose the device reports, if any.
    pub fn sync_pose(&mut self) {
        if let Some(pose) = self.gate.position() {
            self.state.pose = pose;
            self.zoom.set_level(pose.zoom);
        }
    }

    pub fn reset_failures(&mut self) {
        self.counters.consecutive_failures = 0;
    }

    /// Terminal stop through the gate; only the first call reaches the device.
    /// In absolute mode the pose estimate is then re-read from the device.
    pub fn halt(&mut self) -> bool {
        self.state.pan_speed = 0.0;
        self.state.tilt_speed = 0.0;
        let sent = self.gate.halt();
        if self.dispatcher.mode() == DispatchMode::Absolute {
            self.sync_pose();
        }
        sent
    }
}
