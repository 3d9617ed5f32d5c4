// src/discovery/enumeration.rs
//! Candidates from devices already attached when discovery starts

use super::{push_candidate, Attributes, CandidateSource, MatchRule};
use crate::{
    device::DevicePath,
    error::{GpsError, Result},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Supplies a one-shot snapshot of device attribute records.
///
/// Called on the blocking pool; long walks should check `cancel` and bail
/// out early.
pub trait DeviceEnumerator: Send + Sync + 'static {
    fn records(&self, cancel: &CancellationToken) -> Result<Vec<Attributes>>;
}

/// Walks a device snapshot once and reports every matching device
pub struct EnumerationSource<E> {
    enumerator: Arc<E>,
}

impl<E: DeviceEnumerator> EnumerationSource<E> {
    pub fn new(enumerator: E) -> Self {
        Self {
            enumerator: Arc::new(enumerator),
        }
    }
}

#[async_trait]
impl<E: DeviceEnumerator> CandidateSource for EnumerationSource<E> {
    fn name(&self) -> &'static str {
        "enumeration"
    }

    async fn run(
        &self,
        rule: &MatchRule,
        found: &mpsc::Sender<DevicePath>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let enumerator = Arc::clone(&self.enumerator);
        let token = cancel.clone();
        let records = tokio::task::spawn_blocking(move || enumerator.records(&token))
            .await
            .map_err(|e| GpsError::Source(format!("device enumeration aborted: {}", e)))??;

        debug!(records = records.len(), "device snapshot taken");

        for attrs in records {
            if !rule.matches_attrs(&attrs) {
                continue;
            }
            let Some(devname) = attrs.get("DEVNAME") else {
                continue;
            };

            let path = DevicePath::from_devname(devname);
            debug!(device = %path, "existing device matches");
            if !push_candidate(found, path, cancel).await {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DEFAULT_DEVICE_PATTERN;

    struct Snapshot(Vec<Attributes>);

    impl DeviceEnumerator for Snapshot {
        fn records(&self, _cancel: &CancellationToken) -> Result<Vec<Attributes>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl DeviceEnumerator for Broken {
        fn records(&self, _cancel: &CancellationToken) -> Result<Vec<Attributes>> {
            Err(GpsError::Source("walk failed".to_string()))
        }
    }

    fn record(devname: &str) -> Attributes {
        Attributes::from([
            ("DEVNAME".to_string(), devname.to_string()),
            ("MAJOR".to_string(), "188".to_string()),
        ])
    }

    #[tokio::test]
    async fn test_reports_matching_devices_then_finishes() {
        let source = EnumerationSource::new(Snapshot(vec![
            record("ttyS0"),
            record("ttyUSB0"),
            Attributes::new(),
            record("ttyUSB3"),
        ]));
        let rule = MatchRule::attached(DEFAULT_DEVICE_PATTERN).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        source.run(&rule, &tx, &CancellationToken::new()).await.unwrap();
        drop(tx);

        let mut paths = Vec::new();
        while let Some(path) = rx.recv().await {
            paths.push(path.to_string());
        }
        assert_eq!(paths, vec!["/dev/ttyUSB0", "/dev/ttyUSB3"]);
    }

    #[tokio::test]
    async fn test_cancelled_source_stops_pushing() {
        let source = EnumerationSource::new(Snapshot(vec![record("ttyUSB0"), record("ttyUSB1")]));
        let rule = MatchRule::attached(DEFAULT_DEVICE_PATTERN).unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let run = source.run(&rule, &tx, &cancel);
        tokio::pin!(run);
        // First push fills the queue, second blocks until cancelled
        tokio::select! {
            _ = &mut run => panic!("source should block on a full queue"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
        }
        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn test_walk_failure_is_source_error() {
        let source = EnumerationSource::new(Broken);
        let rule = MatchRule::attached(DEFAULT_DEVICE_PATTERN).unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = source.run(&rule, &tx, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, GpsError::Source(_)));
    }
}
