//! Abstract PTZ capability and the command gate guarding it.
//!
//! The wire protocol (ONVIF/SOAP or vendor SDK) lives behind [`PtzDevice`];
//! this crate only issues commands through it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConnectionError, TransportError};

/// Pan/tilt in [-1, 1], zoom in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PtzPose {
    /// Horizontal position
    pub pan: f64,
    /// Vertical position
    pub tilt: f64,
    /// Zoom level
    pub zoom: f64,
}

/// A motorized pan-tilt-zoom camera.
///
/// Every call must return within a bounded time; implementations apply their
/// own transport timeout and report it as [`TransportError::Timeout`].
pub trait PtzDevice: Send {
    /// Reach the device within `timeout`.
    fn connect(&mut self, timeout: Duration) -> Result<(), ConnectionError>;

    fn move_absolute(
        &mut self,
        pan: f64,
        tilt: f64,
        zoom: f64,
        speed: f64,
    ) -> Result<(), TransportError>;

    /// Velocity command; runs until the next command, or for `duration`.
    fn move_continuous(
        &mut self,
        pan_speed: f64,
        tilt_speed: f64,
        zoom_speed: f64,
        duration: Option<Duration>,
    ) -> Result<(), TransportError>;

    fn stop(&mut self) -> Result<(), TransportError>;

    fn get_position(&mut self) -> Option<PtzPose>;
}

struct GateInner {
    device: Box<dyn PtzDevice>,
    halted: bool,
}

/// Serializes device access and latches the terminal stop.
///
/// Once [`CommandGate::halt`] has sent the stop command, every further motion
/// command is refused with [`TransportError::Halted`] until [`CommandGate::rearm`].
pub struct CommandGate {
    inner: Mutex<GateInner>,
}

impl CommandGate {
    /// Armed gate around `device`.
    pub fn new(device: Box<dyn PtzDevice>) -> Self {
        Self {
            inner: Mutex::new(GateInner {
                device,
                halted: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        // A panic inside a device call must not wedge the stop path.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect or reconnect; not affected by the halt latch.
    pub fn connect(&self, timeout: Duration) -> Result<(), ConnectionError> {
        self.lock().device.connect(timeout)
    }

    /// Run a motion command unless the gate is halted.
    pub fn command<R>(
        &self,
        f: impl FnOnce(&mut dyn PtzDevice) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut inner = self.lock();
        if inner.halted {
            return Err(TransportError::Halted);
        }
        f(inner.device.as_mut())
    }

    /// Read the device pose. A read, so allowed after the terminal stop.
    pub fn position(&self) -> Option<PtzPose> {
        self.lock().device.get_position()
    }

    /// Send the terminal stop. Only the first call after arming reaches the
    /// device; returns whether this call sent it.
    pub fn halt(&self) -> bool {
        let mut inner = self.lock();
        if inner.halted {
            return false;
        }
        inner.halted = true;
        match inner.device.stop() {
            Ok(()) => info!("PTZ stop command sent"),
            Err(e) => warn!(error = %e, "PTZ stop command failed"),
        }
        true
    }

    /// Accept commands again, for a new session.
    pub fn rearm(&self) {
        self.lock().halted = false;
    }

    /// Whether the terminal stop has been sent.
    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }
}
