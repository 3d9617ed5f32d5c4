// src/device/probe.rs
//! Candidate probing: is there a GPS receiver behind this device node?

use super::{
    chardev::{self, PathError},
    framer::{FramingError, SentenceReader},
    DevicePath, DeviceStream,
};
use async_trait::async_trait;
use std::{fmt, io, time::Duration};
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A device that produced a valid sentence, with its handle still open
pub struct Acquired {
    pub path: DevicePath,
    pub reader: SentenceReader<DeviceStream>,
    pub first_sentence: String,
}

impl fmt::Debug for Acquired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquired")
            .field("path", &self.path)
            .field("first_sentence", &self.first_sentence)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Rejection {
    Path(PathError),
    Open(io::Error),
    Framing(FramingError),
    Cancelled,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Path(e) => write!(f, "{}", e),
            Rejection::Open(e) => write!(f, "unable to open device: {}", e),
            Rejection::Framing(e) => write!(f, "no NMEA sentence: {}", e),
            Rejection::Cancelled => write!(f, "probe cancelled"),
        }
    }
}

/// Result of probing one candidate path
#[derive(Debug)]
pub enum Outcome {
    Confirmed(Acquired),
    Rejected { path: DevicePath, reason: Rejection },
}

impl Outcome {
    pub fn path(&self) -> &DevicePath {
        match self {
            Outcome::Confirmed(acquired) => &acquired.path,
            Outcome::Rejected { path, .. } => path,
        }
    }
}

/// Opens a validated device node for reading
pub trait DeviceOpener: Send + Sync {
    fn open(&self, path: &DevicePath) -> io::Result<DeviceStream>;
}

/// Opens nodes as serial ports at a fixed baud rate
#[derive(Debug, Clone)]
pub struct SerialOpener {
    pub baudrate: u32,
}

impl DeviceOpener for SerialOpener {
    fn open(&self, path: &DevicePath) -> io::Result<DeviceStream> {
        let port = tokio_serial::new(path.to_string(), self.baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()?;
        Ok(Box::new(port))
    }
}

/// Decides whether a candidate path is a GPS receiver.
///
/// Implementations must always produce an [`Outcome`], returning promptly
/// once `cancel` fires.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: DevicePath, deadline: Instant, cancel: CancellationToken)
        -> Outcome;
}

/// Validates, opens and reads one sentence from a candidate
#[derive(Debug, Clone)]
pub struct CandidateProbe<O> {
    opener: O,
}

impl<O: DeviceOpener> CandidateProbe<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }
}

#[async_trait]
impl<O: DeviceOpener> Prober for CandidateProbe<O> {
    async fn probe(
        &self,
        path: DevicePath,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> Outcome {
        let reject = |path, reason| Outcome::Rejected { path, reason };

        if let Err(e) = chardev::validate(path.as_path()) {
            return reject(path, Rejection::Path(e));
        }

        // The node may vanish between discovery and here
        let stream = match self.opener.open(&path) {
            Ok(stream) => stream,
            Err(e) => return reject(path, Rejection::Open(e)),
        };

        let mut reader = SentenceReader::new(stream);
        let read = tokio::select! {
            _ = cancel.cancelled() => Err(Rejection::Cancelled),
            read = reader.read_sentence(deadline) => read.map_err(Rejection::Framing),
        };

        match read {
            Ok(sentence) if !sentence.is_empty() => {
                debug!(device = %path, %sentence, "device confirmed");
                Outcome::Confirmed(Acquired {
                    path,
                    reader,
                    first_sentence: sentence,
                })
            }
            Ok(_) => reject(path, Rejection::Framing(FramingError::Closed)),
            Err(reason) => reject(path, reason),
        }
    }
}
