// src/device/mod.rs
//! Character-device handling: path identity, validation, framing and probing

pub mod chardev;
pub mod framer;
pub mod probe;

use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tokio::io::AsyncRead;

/// Byte stream read from an opened device node
pub type DeviceStream = Box<dyn AsyncRead + Send + Unpin>;

/// Absolute path of a character-device node.
///
/// Two paths are the same device when their normalized text is equal, so
/// construct through [`DevicePath::resolve`] or [`DevicePath::from_devname`]
/// before comparing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DevicePath(PathBuf);

impl DevicePath {
    /// Normalize a user- or config-supplied path.
    ///
    /// Existing nodes are canonicalized (resolving `/dev/serial/by-id/...`
    /// links); missing ones are only made absolute.
    pub fn resolve(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let normalized = std::fs::canonicalize(path)
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf());
        Self(normalized)
    }

    /// Path of the node the kernel names `DEVNAME`, relative to `/dev`
    pub fn from_devname(devname: &str) -> Self {
        if devname.starts_with('/') {
            Self(PathBuf::from(devname))
        } else {
            Self(Path::new("/dev").join(devname))
        }
    }

    /// Name as it appears in a uevent `DEVNAME` attribute
    pub fn devname(&self) -> String {
        self.0
            .strip_prefix("/dev")
            .unwrap_or(&self.0)
            .to_string_lossy()
            .into_owned()
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for DevicePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_devname() {
        assert_eq!(DevicePath::from_devname("ttyUSB0").to_string(), "/dev/ttyUSB0");
        assert_eq!(DevicePath::from_devname("/dev/ttyACM1").to_string(), "/dev/ttyACM1");
        assert_eq!(DevicePath::from_devname("ttyUSB0").devname(), "ttyUSB0");
    }

    #[test]
    fn test_resolve_missing_path_is_absolute() {
        let path = DevicePath::resolve("definitely-not-a-device");
        assert!(path.as_path().is_absolute());
    }

    #[test]
    fn test_resolve_matches_devname_for_existing_node() {
        assert_eq!(DevicePath::resolve("/dev/null"), DevicePath::from_devname("null"));
    }
}
