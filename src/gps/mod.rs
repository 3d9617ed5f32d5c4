// src/gps/mod.rs
//! GPS state handling and NMEA parsing

pub mod data;
pub mod nmea;

pub use data::{GpsState, SatelliteInfo, SharedState};
