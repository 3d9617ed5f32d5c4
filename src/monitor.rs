// src/monitor.rs
//! Monitoring session for an acquired GPS device

use crate::{
    device::{
        framer::{FramingError, SentenceReader},
        probe::Acquired,
        DevicePath, DeviceStream,
    },
    discovery::{CandidateSource, MatchRule, SourceHandle},
    error::{GpsError, Result},
    gps::SharedState,
};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    DeviceRemoved,
}

/// Reads sentences from one device into the shared state until the device
/// goes away or the process shuts down
pub struct MonitorSession {
    path: DevicePath,
    reader: SentenceReader<DeviceStream>,
    read_timeout: Duration,
    state: SharedState,
}

impl MonitorSession {
    /// Take ownership of an acquired device, folding in the sentence that
    /// confirmed it
    pub fn new(acquired: Acquired, read_timeout: Duration, state: SharedState) -> Self {
        let Acquired {
            path,
            reader,
            first_sentence,
        } = acquired;

        state.update(|s| s.device = Some(path.to_string()));
        if let Err(e) = state.ingest(&first_sentence) {
            debug!(device = %path, error = %e, "first sentence not decoded");
        }

        Self {
            path,
            reader,
            read_timeout,
            state,
        }
    }

    pub fn path(&self) -> &DevicePath {
        &self.path
    }

    /// Run until the device is unplugged, its stream closes, or `shutdown`
    /// fires. `unplug` is watched with a removal rule scoped to this device.
    pub async fn run(
        self,
        unplug: Arc<dyn CandidateSource>,
        shutdown: CancellationToken,
    ) -> Result<SessionEnd> {
        let Self {
            path,
            mut reader,
            read_timeout,
            state,
        } = self;

        let scope = shutdown.child_token();
        let (removed_tx, mut removed_rx) = mpsc::channel::<DevicePath>(1);
        let (error_tx, mut error_rx) = mpsc::channel::<GpsError>(1);
        let watch = SourceHandle::spawn(
            unplug,
            MatchRule::removed(&path)?,
            removed_tx,
            error_tx,
            scope.child_token(),
        );

        info!(device = %path, timeout = %humantime::format_duration(read_timeout), "monitoring GPS device");

        let result = loop {
            let deadline = Instant::now() + read_timeout;
            tokio::select! {
                _ = scope.cancelled() => break Ok(SessionEnd::Shutdown),
                Some(removed) = removed_rx.recv() => {
                    if removed == path {
                        info!(device = %path, "GPS device unplugged");
                        break Ok(SessionEnd::DeviceRemoved);
                    }
                    debug!(device = %removed, "ignoring removal of another device");
                }
                Some(err) = error_rx.recv() => break Err(err),
                read = reader.read_sentence(deadline) => match read {
                    Ok(sentence) => {
                        if let Err(e) = state.ingest(&sentence) {
                            debug!(device = %path, %sentence, error = %e, "sentence not decoded");
                        }
                    }
                    Err(e @ (FramingError::Timeout | FramingError::TooLong(_))) => {
                        warn!(device = %path, error = %e, "read failed, retrying");
                    }
                    Err(FramingError::Closed) => {
                        info!(device = %path, "device stream closed");
                        break Ok(SessionEnd::DeviceRemoved);
                    }
                    Err(e @ FramingError::Io(_)) => break Err(GpsError::Framing(e)),
                },
            }
        };

        scope.cancel();
        watch.stop();
        watch.join().await;
        result
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {} - {:?}", port.port_name, port.port_type);
        }
    }

    Ok(())
}
