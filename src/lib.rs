// src/lib.rs
//! GPS Autodetect Library
//!
//! Locates a serial GPS receiver, either already attached or hot-plugged
//! later, confirms it speaks NMEA, and keeps the latest decoded state.

pub mod acquire;
pub mod config;
pub mod device;
pub mod discovery;
pub mod display;
pub mod error;
pub mod gps;
pub mod monitor;
pub mod status;

// Re-export main types for convenience
pub use acquire::Acquisition;
pub use device::DevicePath;
pub use error::{GpsError, Result};
pub use gps::{GpsState, SharedState};
pub use monitor::{MonitorSession, SessionEnd};
