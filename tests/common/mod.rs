#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ptz_arbiter::device::{PtzDevice, PtzPose};
use ptz_arbiter::error::{ConnectionError, TransportError};
use ptz_arbiter::ObjectPosition;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Absolute { pan: f64, tilt: f64, zoom: f64 },
    Continuous { pan: f64, tilt: f64, zoom: f64 },
    Stop,
}

/// PTZ device that records every call. Clones share state.
#[derive(Clone, Default)]
pub struct MockPtz {
    calls: Arc<Mutex<Vec<Call>>>,
    pub refuse_connect: Arc<AtomicBool>,
    pub fail_moves: Arc<AtomicBool>,
    pose: Arc<Mutex<PtzPose>>,
}

impl MockPtz {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| f(c)).count()
    }

    pub fn stops(&self) -> usize {
        self.count(|c| *c == Call::Stop)
    }

    pub fn connects(&self) -> usize {
        self.count(|c| *c == Call::Connect)
    }

    pub fn moves(&self) -> usize {
        self.count(|c| matches!(c, Call::Absolute { .. } | Call::Continuous { .. }))
    }

    pub fn last_continuous(&self) -> Option<(f64, f64, f64)> {
        self.calls.lock().unwrap().iter().rev().find_map(|c| match *c {
            Call::Continuous { pan, tilt, zoom } => Some((pan, tilt, zoom)),
            _ => None,
        })
    }

    /// Pose reported by `get_position` from now on.
    pub fn set_pose(&self, pose: PtzPose) {
        *self.pose.lock().unwrap() = pose;
    }

    pub fn boxed(&self) -> Box<dyn PtzDevice> {
        Box::new(self.clone())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn move_result(&self, command: &'static str) -> Result<(), TransportError> {
        if self.fail_moves.load(Ordering::SeqCst) {
            Err(TransportError::Timeout { command })
        } else {
            Ok(())
        }
    }
}

impl PtzDevice for MockPtz {
    fn connect(&mut self, timeout: Duration) -> Result<(), ConnectionError> {
        self.record(Call::Connect);
        if self.refuse_connect.load(Ordering::SeqCst) {
            Err(ConnectionError::Timeout(timeout))
        } else {
            Ok(())
        }
    }

    fn move_absolute(&mut self, pan: f64, tilt: f64, zoom: f64, _speed: f64) -> Result<(), TransportError> {
        self.record(Call::Absolute { pan, tilt, zoom });
        self.move_result("move_absolute")
    }

    fn move_continuous(
        &mut self,
        pan: f64,
        tilt: f64,
        zoom: f64,
        _duration: Option<Duration>,
    ) -> Result<(), TransportError> {
        self.record(Call::Continuous { pan, tilt, zoom });
        self.move_result("move_continuous")
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        self.record(Call::Stop);
        Ok(())
    }

    fn get_position(&mut self) -> Option<PtzPose> {
        Some(*self.pose.lock().unwrap())
    }
}

/// Square detection in a 1920x1080 frame.
pub fn pos(cx: f64, cy: f64, size: f64, confidence: f64, t: f64) -> ObjectPosition {
    ObjectPosition::new(cx, cy, size, size, confidence, t, 1920, 1080, "boat")
}
