// src/config.rs
//! Configuration management with file-based storage

use crate::{
    discovery::{sysfs::DEFAULT_SYSFS_ROOT, DEFAULT_DEVICE_PATTERN},
    error::{GpsError, Result},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Search for the receiver instead of using `device_path`
    pub autodetect: bool,
    pub device_path: String,
    pub read_timeout_ms: u64,
    pub autodetect_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub baudrate: u32,
    /// `DEVNAME` pattern a candidate must match in full
    pub device_pattern: String,
    pub sysfs_root: String,
    pub listen_addr: String,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            autodetect: false,
            device_path: "/dev/ttyUSB0".to_string(),
            read_timeout_ms: 5_000,
            autodetect_timeout_ms: 30_000,
            probe_timeout_ms: 5_000,
            baudrate: 9600,
            device_pattern: DEFAULT_DEVICE_PATTERN.to_string(),
            sysfs_root: DEFAULT_SYSFS_ROOT.to_string(),
            listen_addr: "127.0.0.1:1234".to_string(),
        }
    }
}

impl GpsConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load from `path`, falling back to defaults when it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            GpsError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            GpsError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Write configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| GpsError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("gps-autodetect")
            .join("config.json"))
    }

    /// Reject values no device could ever satisfy
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(GpsError::Config("read timeout must be positive".to_string()));
        }
        if self.autodetect && (self.autodetect_timeout_ms == 0 || self.probe_timeout_ms == 0) {
            return Err(GpsError::Config(
                "autodetect and probe timeouts must be positive".to_string(),
            ));
        }
        if self.baudrate == 0 {
            return Err(GpsError::Config("baud rate must be positive".to_string()));
        }
        regex::Regex::new(&self.device_pattern)?;
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn autodetect_timeout(&self) -> Duration {
        Duration::from_millis(self.autodetect_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout_ms = timeout.as_millis() as u64;
    }

    pub fn set_autodetect_timeout(&mut self, timeout: Duration) {
        self.autodetect_timeout_ms = timeout.as_millis() as u64;
    }

    pub fn set_probe_timeout(&mut self, timeout: Duration) {
        self.probe_timeout_ms = timeout.as_millis() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GpsConfig::default();
        assert!(!config.autodetect);
        assert_eq!(config.device_path, "/dev/ttyUSB0");
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.autodetect_timeout(), Duration::from_secs(30));
        assert_eq!(config.device_pattern, r"ttyUSB\d+");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GpsConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, GpsConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "autodetect": true, "read_timeout_ms": 2500 }"#).unwrap();

        let config = GpsConfig::load_from(&path).unwrap();
        assert!(config.autodetect);
        assert_eq!(config.read_timeout(), Duration::from_millis(2500));
        assert_eq!(config.baudrate, 9600);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = GpsConfig::default();
        config.device_path = "/dev/ttyACM0".to_string();
        config.set_probe_timeout(Duration::from_secs(2));
        config.save_to(&path).unwrap();

        assert_eq!(GpsConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, r#"{ "read_timeout_ms": 0 }"#).unwrap();
        assert!(matches!(GpsConfig::load_from(&path), Err(GpsError::Config(_))));

        std::fs::write(&path, r#"{ "device_pattern": "ttyUSB(" }"#).unwrap();
        assert!(matches!(GpsConfig::load_from(&path), Err(GpsError::Config(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(GpsConfig::load_from(&path), Err(GpsError::Config(_))));
    }
}
