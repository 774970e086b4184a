//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole acquisition and
//! processing pipeline. Using the `thiserror` crate, it provides a centralized and consistent
//! way to handle the different kinds of failures that occur, from sensor links that refuse to
//! open to log files with a truncated header.
//!
//! ## Error Hierarchy
//!
//! `DaqError` consolidates the following sources:
//!
//! - **`LinkUnavailable`**: A sensor link could not be opened. Fatal for the GNSS receiver and
//!   the sonar at session start, tolerated for the sound-speed probe.
//! - **`Decode`**: A frame from a sensor was malformed. Always recovered locally by the caller,
//!   which moves on to the next frame.
//! - **`LogFormat`**: A log file header row is missing or short. Aborts the read.
//! - **`Conversion`**: A field failed numeric coercion. Recovered by leaving the field absent or
//!   by dropping the offending row.
//! - **`ProfileGeometry`**: A sound-speed profile cannot be built (for example it has no valid
//!   samples). Degenerate layers inside a valid profile are guarded and never surface.
//! - **`Config`** / **`Configuration`**: Settings could not be loaded, or loaded but failed
//!   validation.
//! - **`Io`** / **`Csv`**: Underlying file errors.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types directly,
//! which keeps `?` usable throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Which physical sensor an error or message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorRole {
    /// GNSS receiver producing NMEA sentences.
    Gnss,
    /// Single-beam echo sounder.
    Sonar,
    /// Surface sound-speed probe.
    Probe,
}

impl std::fmt::Display for SensorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SensorRole::Gnss => "gnss",
            SensorRole::Sonar => "sonar",
            SensorRole::Probe => "probe",
        };
        write!(f, "{}", label)
    }
}

/// A frame could not be turned into a typed sensor message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Frame is not valid text")]
    NotText,

    #[error("Malformed sentence: {0}")]
    Malformed(String),

    #[error("Checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    Checksum { expected: u8, computed: u8 },

    #[error("Sentence {0} is not a position fix")]
    NotAFix(String),

    #[error("Probe reading '{0}' is not numeric")]
    ProbeValue(String),

    #[error("Ping frame error: {0}")]
    PingFrame(String),

    #[error("Device refused message {message_id}: {reason}")]
    Nack { message_id: u16, reason: String },

    #[error("Expected message {expected}, received {received}")]
    UnexpectedMessage { expected: u16, received: u16 },

    #[error("Gave up after {attempts} undecodable frames")]
    RetriesExhausted { attempts: u32 },
}

/// Primary error type for acquisition and processing.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{sensor} link unavailable: {reason}")]
    LinkUnavailable { sensor: SensorRole, reason: String },

    #[error("{sensor} read timed out after {timeout:?}")]
    Timeout { sensor: SensorRole, timeout: Duration },

    #[error("Serial port not connected")]
    SerialPortNotConnected,

    #[error("Unexpected EOF from sensor link")]
    LinkUnexpectedEof,

    #[error("Serial support not enabled. Rebuild with --features tokio_serial")]
    SerialFeatureDisabled,

    #[error("Decode failure: {0}")]
    Decode(#[from] DecodeError),

    #[error("Log format error: {0}")]
    LogFormat(String),

    #[error("Cannot convert {field} value '{value}'")]
    Conversion { field: String, value: String },

    #[error("Sound-speed profile error: {0}")]
    ProfileGeometry(String),

    #[error("Sound speed source unavailable: {0}")]
    SoundSpeedSource(String),

    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<DaqError>),
}

impl DaqError {
    /// Build a conversion error for a named field.
    pub fn conversion(field: impl Into<String>, value: impl Into<String>) -> Self {
        DaqError::Conversion {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the pipeline may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DaqError::Decode(_)
            | DaqError::Conversion { .. }
            | DaqError::ProfileGeometry(_)
            | DaqError::Timeout { .. } => true,
            DaqError::LinkUnavailable { sensor, .. } => *sensor == SensorRole::Probe,
            DaqError::Config(_)
            | DaqError::Configuration(_)
            | DaqError::Io(_)
            | DaqError::Csv(_)
            | DaqError::SerialPortNotConnected
            | DaqError::LinkUnexpectedEof
            | DaqError::SerialFeatureDisabled
            | DaqError::LogFormat(_)
            | DaqError::SoundSpeedSource(_)
            | DaqError::ShutdownFailed(_) => false,
        }
    }
}
