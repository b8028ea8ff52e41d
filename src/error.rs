//! Error types.

use thiserror::Error;

/// Invalid configuration. Raised only at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("weight `{name}` must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("at least one scoring weight must be positive")]
    AllWeightsZero,
    #[error("`{name}` must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("`{name}` must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("`{low_name}` ({low}) must not exceed `{high_name}` ({high})")]
    InvertedBounds {
        low_name: &'static str,
        low: f64,
        high_name: &'static str,
        high: f64,
    },
    #[error("unknown preset `{0}`")]
    UnknownPreset(String),
    #[error("malformed configuration document: {0}")]
    Parse(String),
}

/// The device could not be reached when tracking was started.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("PTZ device did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("PTZ device refused connection: {0}")]
    Refused(String),
    #[error("reconnect failed after {failures} consecutive transport failures")]
    ReconnectFailed { failures: u32 },
}

/// A single device command failed mid-session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("command `{command}` timed out")]
    Timeout { command: &'static str },
    #[error("command `{command}` rejected by device: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
    #[error("device is halted; no further commands are accepted")]
    Halted,
}

/// A malformed entry in an inbound detection batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("detection has no bounding box")]
    MissingBox,
    #[error("detection field `{field}` is not finite")]
    NonFinite { field: &'static str },
    #[error("detection box has non-positive size ({width}x{height})")]
    EmptyBox { width: f64, height: f64 },
    #[error("detection confidence {0} outside [0, 1]")]
    Confidence(f64),
    #[error("frame size {width}x{height} is invalid")]
    FrameSize { width: u32, height: u32 },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("failed to spawn tracking thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
