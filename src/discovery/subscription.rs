// src/discovery/subscription.rs
//! Candidates from live hot-plug notifications

use super::{push_candidate, CandidateSource, DeviceEvent, MatchRule};
use crate::{device::DevicePath, error::Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// An open stream of device notifications
#[async_trait]
pub trait Subscription: Send {
    async fn next_event(&mut self) -> Result<DeviceEvent>;
}

/// Opens notification subscriptions, one per discovery pass
pub trait NotificationChannel: Send + Sync {
    fn open(&self) -> Result<Box<dyn Subscription>>;
}

/// Reports devices named by matching notifications until stopped.
///
/// Each run opens, owns and closes its own subscription.
pub struct SubscriptionSource<N> {
    channel: N,
}

impl<N: NotificationChannel> SubscriptionSource<N> {
    pub fn new(channel: N) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl<N: NotificationChannel> CandidateSource for SubscriptionSource<N> {
    fn name(&self) -> &'static str {
        "subscription"
    }

    async fn run(
        &self,
        rule: &MatchRule,
        found: &mpsc::Sender<DevicePath>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut subscription = self.channel.open()?;
        debug!(action = %rule.action(), "listening for device notifications");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = subscription.next_event() => event?,
            };

            if !rule.matches(&event) {
                continue;
            }
            let Some(path) = event.device_path() else {
                continue;
            };

            info!(action = %event.action, device = %path, "device notification");
            if !push_candidate(found, path, cancel).await {
                return Ok(());
            }
        }
    }
}

/// Stand-in channel where the platform has no hot-plug notifications
#[cfg(not(target_os = "linux"))]
pub struct Unsupported;

#[cfg(not(target_os = "linux"))]
impl NotificationChannel for Unsupported {
    fn open(&self) -> Result<Box<dyn Subscription>> {
        Err(crate::error::GpsError::Source(
            "hot-plug notifications are not supported on this platform".to_string(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::GpsError;
    use std::sync::Mutex;

    /// Notification channel fed from a test through an mpsc queue
    pub struct QueueChannel {
        events: Mutex<Option<mpsc::UnboundedReceiver<DeviceEvent>>>,
    }

    impl QueueChannel {
        pub fn new() -> (mpsc::UnboundedSender<DeviceEvent>, Self) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                tx,
                Self {
                    events: Mutex::new(Some(rx)),
                },
            )
        }
    }

    struct QueueSubscription(mpsc::UnboundedReceiver<DeviceEvent>);

    #[async_trait]
    impl Subscription for QueueSubscription {
        async fn next_event(&mut self) -> Result<DeviceEvent> {
            match self.0.recv().await {
                Some(event) => Ok(event),
                None => std::future::pending().await,
            }
        }
    }

    impl NotificationChannel for QueueChannel {
        fn open(&self) -> Result<Box<dyn Subscription>> {
            let rx = self
                .events
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| GpsError::Source("subscription already open".to_string()))?;
            Ok(Box::new(QueueSubscription(rx)))
        }
    }

    pub fn event(action: &str, devname: &str) -> DeviceEvent {
        DeviceEvent {
            action: action.into(),
            attrs: [("DEVNAME".to_string(), devname.to_string())].into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{event, QueueChannel};
    use super::*;
    use crate::{discovery::DEFAULT_DEVICE_PATTERN, error::GpsError};

    struct Unavailable;

    impl NotificationChannel for Unavailable {
        fn open(&self) -> Result<Box<dyn Subscription>> {
            Err(GpsError::Source("unable to connect".to_string()))
        }
    }

    #[tokio::test]
    async fn test_forwards_matching_notifications() {
        let (events, channel) = QueueChannel::new();
        let source = SubscriptionSource::new(channel);
        let rule = MatchRule::attached(DEFAULT_DEVICE_PATTERN).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        events.send(event("add", "ttyS1")).unwrap();
        events.send(event("remove", "ttyUSB0")).unwrap();
        events.send(event("add", "ttyUSB2")).unwrap();

        let run = source.run(&rule, &tx, &cancel);
        tokio::pin!(run);
        let path = tokio::select! {
            _ = &mut run => panic!("subscription ended early"),
            path = rx.recv() => path.unwrap(),
        };
        assert_eq!(path.to_string(), "/dev/ttyUSB2");

        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let source = SubscriptionSource::new(Unavailable);
        let rule = MatchRule::attached(DEFAULT_DEVICE_PATTERN).unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = source.run(&rule, &tx, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, GpsError::Source(_)));
    }
}
