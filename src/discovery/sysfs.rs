// src/discovery/sysfs.rs
//! Device records read from sysfs `uevent` files

use super::{enumeration::DeviceEnumerator, Attributes};
use crate::error::{GpsError, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/devices";

/// Enumerates devices by walking a sysfs tree for `uevent` files
#[derive(Debug, Clone)]
pub struct SysfsEnumerator {
    root: PathBuf,
}

impl SysfsEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsEnumerator {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl DeviceEnumerator for SysfsEnumerator {
    fn records(&self, cancel: &CancellationToken) -> Result<Vec<Attributes>> {
        std::fs::read_dir(&self.root).map_err(|e| {
            GpsError::Source(format!("unable to walk {}: {}", self.root.display(), e))
        })?;

        let mut records = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            if cancel.is_cancelled() {
                break;
            }

            // Parts of sysfs are unreadable without privileges
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping sysfs entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != "uevent" {
                continue;
            }

            match std::fs::read_to_string(entry.path()) {
                Ok(contents) => records.push(parse_uevent(&contents)),
                Err(e) => debug!(path = %entry.path().display(), error = %e, "unreadable uevent"),
            }
        }

        Ok(records)
    }
}

/// Parse `KEY=VALUE` lines, stopping at the first malformed one
pub fn parse_uevent(contents: &str) -> Attributes {
    let mut attrs = Attributes::new();
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            break;
        };
        attrs.insert(key.to_string(), value.to_string());
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_uevent() {
        let attrs = parse_uevent("MAJOR=188\nMINOR=0\nDEVNAME=ttyUSB0\n");
        assert_eq!(attrs.get("DEVNAME").map(String::as_str), Some("ttyUSB0"));
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn test_parse_uevent_stops_at_malformed_line() {
        let attrs = parse_uevent("MAJOR=4\ngarbage\nDEVNAME=tty0\n");
        assert_eq!(attrs.len(), 1);
        assert!(!attrs.contains_key("DEVNAME"));
    }

    #[test]
    fn test_walks_nested_uevent_files() {
        let root = tempfile::tempdir().unwrap();
        let usb = root.path().join("pci0000:00/usb1/1-2/1-2:1.0/ttyUSB0/tty/ttyUSB0");
        fs::create_dir_all(&usb).unwrap();
        fs::write(usb.join("uevent"), "MAJOR=188\nMINOR=0\nDEVNAME=ttyUSB0\n").unwrap();
        fs::write(usb.join("dev"), "188:0\n").unwrap();
        let serial = root.path().join("platform/serial8250/tty/ttyS0");
        fs::create_dir_all(&serial).unwrap();
        fs::write(serial.join("uevent"), "MAJOR=4\nMINOR=64\nDEVNAME=ttyS0\n").unwrap();

        let mut names: Vec<String> = SysfsEnumerator::new(root.path())
            .records(&CancellationToken::new())
            .unwrap()
            .into_iter()
            .filter_map(|attrs| attrs.get("DEVNAME").cloned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["ttyS0", "ttyUSB0"]);
    }

    #[test]
    fn test_missing_root_is_source_error() {
        let err = SysfsEnumerator::new("/nonexistent/sysfs/root")
            .records(&CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, GpsError::Source(_)));
    }

    #[test]
    fn test_cancelled_walk_returns_early() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("uevent"), "DEVNAME=ttyUSB0\n").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let records = SysfsEnumerator::new(root.path()).records(&cancel).unwrap();
        assert!(records.is_empty());
    }
}
