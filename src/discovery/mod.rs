// src/discovery/mod.rs
//! Candidate device discovery
//!
//! Sources turn device records or hot-plug notifications into candidate
//! [`DevicePath`]s. Which devices count is decided by a [`MatchRule`], never
//! by the source itself.

pub mod enumeration;
#[cfg(target_os = "linux")]
pub mod netlink;
pub mod subscription;
pub mod sysfs;

use crate::{
    device::DevicePath,
    error::{GpsError, Result},
};
use async_trait::async_trait;
use regex::Regex;
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Attribute mapping of one device, as found in a `uevent` record
pub type Attributes = HashMap<String, String>;

/// Default `DEVNAME` pattern for USB serial GPS receivers
pub const DEFAULT_DEVICE_PATTERN: &str = r"ttyUSB\d+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    Change,
    Move,
    Bind,
    Unbind,
    Other(String),
}

impl From<&str> for Action {
    fn from(action: &str) -> Self {
        match action {
            "add" => Action::Add,
            "remove" => Action::Remove,
            "change" => Action::Change,
            "move" => Action::Move,
            "bind" => Action::Bind,
            "unbind" => Action::Unbind,
            other => Action::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Add => "add",
            Action::Remove => "remove",
            Action::Change => "change",
            Action::Move => "move",
            Action::Bind => "bind",
            Action::Unbind => "unbind",
            Action::Other(other) => other,
        };
        f.write_str(name)
    }
}

/// A hot-plug notification
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub action: Action,
    pub attrs: Attributes,
}

impl DeviceEvent {
    pub fn device_path(&self) -> Option<DevicePath> {
        self.attrs.get("DEVNAME").map(|name| DevicePath::from_devname(name))
    }
}

/// Selects relevant devices: every attribute pattern must match the whole
/// value, and notifications must also carry the rule's action.
#[derive(Debug, Clone)]
pub struct MatchRule {
    action: Action,
    env: Vec<(String, Regex)>,
}

impl MatchRule {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        self.env.push((key.to_string(), regex));
        Ok(self)
    }

    /// Newly attached devices whose `DEVNAME` matches `pattern`
    pub fn attached(pattern: &str) -> Result<Self> {
        Self::new(Action::Add).with_env("DEVNAME", pattern)
    }

    /// Removal of exactly this device
    pub fn removed(path: &DevicePath) -> Result<Self> {
        Self::new(Action::Remove).with_env("DEVNAME", &regex::escape(&path.devname()))
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Evaluate the attribute predicate only, for records without an action
    pub fn matches_attrs(&self, attrs: &Attributes) -> bool {
        self.env.iter().all(|(key, regex)| {
            attrs
                .get(key)
                .map_or(false, |value| regex.is_match(value))
        })
    }

    pub fn matches(&self, event: &DeviceEvent) -> bool {
        event.action == self.action && self.matches_attrs(&event.attrs)
    }
}

/// Something that produces candidate device paths.
///
/// `run` pushes matching paths through [`push_candidate`] until it has
/// nothing more to report or `cancel` fires.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        rule: &MatchRule,
        found: &mpsc::Sender<DevicePath>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Hand a path to the consumer unless the source has been stopped.
///
/// Returns `false` once the source should stop producing.
pub async fn push_candidate(
    found: &mpsc::Sender<DevicePath>,
    path: DevicePath,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = found.send(path) => sent.is_ok(),
    }
}

/// Live hot-plug notifications for this platform
#[cfg(target_os = "linux")]
pub fn hotplug_source() -> Arc<dyn CandidateSource> {
    Arc::new(subscription::SubscriptionSource::new(netlink::NetlinkChannel))
}

#[cfg(not(target_os = "linux"))]
pub fn hotplug_source() -> Arc<dyn CandidateSource> {
    Arc::new(subscription::SubscriptionSource::new(subscription::Unsupported))
}

/// A running source and the means to stop it
pub struct SourceHandle {
    name: &'static str,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SourceHandle {
    /// Start `source` on its own task.
    ///
    /// Paths go to `found`; a failure of the source is reported once on
    /// `errors`. Cancelling `token` has the same effect as [`stop`](Self::stop).
    pub fn spawn(
        source: Arc<dyn CandidateSource>,
        rule: MatchRule,
        found: mpsc::Sender<DevicePath>,
        errors: mpsc::Sender<GpsError>,
        token: CancellationToken,
    ) -> Self {
        let name = source.name();
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let result = tokio::select! {
                _ = task_token.cancelled() => Ok(()),
                result = source.run(&rule, &found, &task_token) => result,
            };

            match result {
                Ok(()) => debug!(source = name, "discovery source finished"),
                Err(e) => {
                    warn!(source = name, error = %e, "discovery source failed");
                    tokio::select! {
                        _ = task_token.cancelled() => {}
                        _ = errors.send(e) => {}
                    }
                }
            }
        });

        Self { name, token, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the source to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the source task to wind down
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(source = self.name, error = %e, "discovery source task panicked");
        }
    }
}
