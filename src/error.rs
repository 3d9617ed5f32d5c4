// src/error.rs
//! Error types for GPS device acquisition and monitoring

use crate::device::framer::FramingError;
use std::{fmt, time::Duration};

pub type Result<T> = std::result::Result<T, GpsError>;

#[derive(Debug)]
pub enum GpsError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Framing(FramingError),
    Parse(String),
    Config(String),
    /// A discovery source could not run (notification channel, sysfs walk)
    Source(String),
    AcquisitionTimeout(Duration),
    /// The device was confirmed but rejected when probed explicitly
    NotGps { path: String, reason: String },
    Cancelled,
}

impl fmt::Display for GpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpsError::Io(e) => write!(f, "IO error: {}", e),
            GpsError::Serial(e) => write!(f, "Serial error: {}", e),
            GpsError::Json(e) => write!(f, "JSON error: {}", e),
            GpsError::Framing(e) => write!(f, "Framing error: {}", e),
            GpsError::Parse(msg) => write!(f, "Parse error: {}", msg),
            GpsError::Config(msg) => write!(f, "Configuration error: {}", msg),
            GpsError::Source(msg) => write!(f, "Discovery source error: {}", msg),
            GpsError::AcquisitionTimeout(timeout) => write!(
                f,
                "No GPS device confirmed within {}",
                humantime::format_duration(*timeout)
            ),
            GpsError::NotGps { path, reason } => {
                write!(f, "{} is not a valid GPS device: {}", path, reason)
            }
            GpsError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for GpsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpsError::Io(e) => Some(e),
            GpsError::Serial(e) => Some(e),
            GpsError::Json(e) => Some(e),
            GpsError::Framing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GpsError {
    fn from(error: std::io::Error) -> Self {
        GpsError::Io(error)
    }
}

impl From<tokio_serial::Error> for GpsError {
    fn from(error: tokio_serial::Error) -> Self {
        GpsError::Serial(error)
    }
}

impl From<serde_json::Error> for GpsError {
    fn from(error: serde_json::Error) -> Self {
        GpsError::Json(error)
    }
}

impl From<regex::Error> for GpsError {
    fn from(error: regex::Error) -> Self {
        GpsError::Config(format!("invalid device pattern: {}", error))
    }
}

impl From<FramingError> for GpsError {
    fn from(error: FramingError) -> Self {
        GpsError::Framing(error)
    }
}
