// src/acquire.rs
//! GPS device acquisition race
//!
//! Every discovery source feeds candidate paths into a pool of concurrent
//! probes. The first probe to confirm a device wins; all sources and the
//! remaining probes are cancelled before the winner is handed back.

use crate::{
    device::{
        probe::{Acquired, Outcome, Prober},
        DevicePath,
    },
    discovery::{CandidateSource, MatchRule, SourceHandle},
    error::{GpsError, Result},
};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CANDIDATE_QUEUE: usize = 16;

/// Terminal state of an acquisition attempt, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Found,
    Failed,
    TimedOut,
    Cancelled,
}

/// Drives discovery sources and probes to a single confirmed device
pub struct Acquisition {
    sources: Vec<Arc<dyn CandidateSource>>,
    prober: Arc<dyn Prober>,
    probe_timeout: Duration,
}

impl Acquisition {
    pub fn new(prober: Arc<dyn Prober>, probe_timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            prober,
            probe_timeout,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Race all sources until one candidate is confirmed, `timeout` elapses,
    /// a source fails, or `cancel` fires.
    pub async fn run(
        &self,
        rule: &MatchRule,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Acquired> {
        let deadline = Instant::now() + timeout;
        let scope = cancel.child_token();

        let (found_tx, mut found_rx) = mpsc::channel::<DevicePath>(CANDIDATE_QUEUE);
        let (error_tx, mut error_rx) = mpsc::channel::<GpsError>(self.sources.len().max(1));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<Outcome>();

        let handles: Vec<SourceHandle> = self
            .sources
            .iter()
            .map(|source| {
                SourceHandle::spawn(
                    Arc::clone(source),
                    rule.clone(),
                    found_tx.clone(),
                    error_tx.clone(),
                    scope.child_token(),
                )
            })
            .collect();
        // Queues close once every source has finished
        drop(found_tx);
        drop(error_tx);

        let mut probes = JoinSet::new();
        // Paths with a probe still running
        let mut in_flight = HashSet::new();
        let mut pending = 0usize;
        let mut sources_open = true;

        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        let (resolution, result) = loop {
            tokio::select! {
                _ = &mut expiry => {
                    break (Resolution::TimedOut, Err(GpsError::AcquisitionTimeout(timeout)));
                }
                _ = scope.cancelled() => {
                    break (Resolution::Cancelled, Err(GpsError::Cancelled));
                }
                Some(err) = error_rx.recv() => {
                    break (Resolution::Failed, Err(err));
                }
                candidate = found_rx.recv(), if sources_open => {
                    let Some(path) = candidate else {
                        debug!(pending, "all discovery sources finished");
                        sources_open = false;
                        continue;
                    };
                    if !in_flight.insert(path.clone()) {
                        debug!(device = %path, "candidate already being probed");
                        continue;
                    }

                    pending += 1;
                    let probe_deadline = deadline.min(Instant::now() + self.probe_timeout);
                    debug!(device = %path, pending, "probing candidate");
                    let prober = Arc::clone(&self.prober);
                    let outcomes = outcome_tx.clone();
                    let token = scope.child_token();
                    probes.spawn(async move {
                        let outcome = prober.probe(path, probe_deadline, token).await;
                        // The race may already be over; the outcome is then dropped
                        let _ = outcomes.send(outcome);
                    });
                }
                Some(outcome) = outcome_rx.recv() => {
                    pending = pending.saturating_sub(1);
                    in_flight.remove(outcome.path());
                    match outcome {
                        Outcome::Confirmed(acquired) => {
                            break (Resolution::Found, Ok(acquired));
                        }
                        Outcome::Rejected { path, reason } => {
                            debug!(device = %path, %reason, pending, "candidate rejected");
                        }
                    }
                }
            }
        };

        // Stop everything before the winner is used
        scope.cancel();
        for handle in &handles {
            debug!(source = handle.name(), "stopping discovery source");
            handle.stop();
        }
        for handle in handles {
            handle.join().await;
        }
        // Cancelled probes wind down on their own; their outcomes go nowhere
        if pending > 0 {
            debug!(abandoned = pending, "discarding in-flight probes");
        }
        probes.detach_all();

        match &result {
            Ok(acquired) => info!(device = %acquired.path, "GPS device acquired"),
            Err(e) => warn!(?resolution, error = %e, "GPS device acquisition ended"),
        }
        result
    }
}
