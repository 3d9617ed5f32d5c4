// src/gps/data.rs
//! GPS state record and its shared handle

use super::nmea::{self, Gga, Gsa, Gsv, Rmc, Sentence};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

const RAW_HISTORY_LEN: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SatelliteInfo {
    pub prn: u8,           // Satellite PRN/ID number
    pub elevation: Option<f32>,  // Elevation angle in degrees
    pub azimuth: Option<f32>,    // Azimuth angle in degrees
    pub snr: Option<f32>,        // Signal-to-noise ratio in dB
    pub used: bool,              // Whether satellite is used in fix
    pub constellation: String,   // GPS, GLONASS, GALILEO, BEIDOU, etc.
}

impl SatelliteInfo {
    pub fn new(prn: u8) -> Self {
        Self {
            prn,
            elevation: None,
            azimuth: None,
            snr: None,
            used: false,
            constellation: Self::determine_constellation(prn).to_string(),
        }
    }

    pub fn determine_constellation(prn: u8) -> &'static str {
        match prn {
            1..=32 => "GPS",
            33..=64 => "SBAS",
            65..=96 => "GLONASS",
            120..=158 => "BEIDOU",
            159..=163 => "BEIDOU",
            193..=197 => "QZSS",
            211..=246 => "GALILEO",
            _ => "UNKNOWN",
        }
    }
}

/// Latest known receiver state.
///
/// Every field stays `None` until a sentence carrying it is decoded, and a
/// sentence only overwrites the fields it carries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GpsState {
    pub device: Option<String>,
    pub timestamp: Option<DateTime<Utc>>, // When the last sentence was decoded
    pub fix_time: Option<NaiveTime>,
    pub fix_date: Option<NaiveDate>,
    pub valid: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,      // km/h
    pub course: Option<f64>,     // degrees
    pub satellites: Option<u8>,
    pub fix_quality: Option<u8>,
    pub mode: Option<u8>,
    pub hdop: Option<f64>,
    pub pdop: Option<f64>,
    pub vdop: Option<f64>,
    pub raw_data: String,
    pub raw_history: Vec<String>, // Recent NMEA sentences
    pub satellites_info: Vec<SatelliteInfo>,
}

impl GpsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the state holds a position
    pub fn has_fix(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Get the age of the last update in seconds
    pub fn age_seconds(&self) -> Option<i64> {
        self.timestamp.map(|ts| Utc::now().signed_duration_since(ts).num_seconds())
    }

    /// Check if the last update is recent (within 10 seconds)
    pub fn is_recent(&self) -> bool {
        self.age_seconds().map_or(false, |age| age < 10)
    }

    pub fn update_timestamp(&mut self) {
        self.timestamp = Some(Utc::now());
    }

    /// Add a raw NMEA sentence to history
    pub fn add_raw_sentence(&mut self, sentence: &str) {
        self.raw_data = sentence.to_string();
        self.raw_history.push(sentence.to_string());

        if self.raw_history.len() > RAW_HISTORY_LEN {
            self.raw_history.remove(0);
        }
    }

    /// Overwrite the fields carried by a decoded sentence
    pub fn apply(&mut self, sentence: &Sentence) {
        match sentence {
            Sentence::Gga(gga) => self.apply_gga(gga),
            Sentence::Rmc(rmc) => self.apply_rmc(rmc),
            Sentence::Gsa(gsa) => self.apply_gsa(gsa),
            Sentence::Gsv(gsv) => self.apply_gsv(gsv),
        }
    }

    fn apply_gga(&mut self, gga: &Gga) {
        set(&mut self.fix_time, gga.time);
        set(&mut self.latitude, gga.latitude);
        set(&mut self.longitude, gga.longitude);
        set(&mut self.fix_quality, gga.fix_quality);
        set(&mut self.satellites, gga.satellites);
        set(&mut self.hdop, gga.hdop);
        set(&mut self.altitude, gga.altitude);
    }

    fn apply_rmc(&mut self, rmc: &Rmc) {
        self.valid = Some(rmc.valid);
        set(&mut self.fix_time, rmc.time);
        set(&mut self.fix_date, rmc.date);
        // A void fix still carries the receiver's last guess; don't trust it
        if rmc.valid {
            set(&mut self.latitude, rmc.latitude);
            set(&mut self.longitude, rmc.longitude);
        }
        set(&mut self.speed, rmc.speed_knots.map(|knots| knots * 1.852));
        set(&mut self.course, rmc.course);
    }

    fn apply_gsa(&mut self, gsa: &Gsa) {
        set(&mut self.mode, gsa.mode);
        set(&mut self.pdop, gsa.pdop);
        set(&mut self.hdop, gsa.hdop);
        set(&mut self.vdop, gsa.vdop);
        for sat in &mut self.satellites_info {
            sat.used = gsa.used_prns.contains(&sat.prn);
        }
    }

    fn apply_gsv(&mut self, gsv: &Gsv) {
        // First message of a cycle replaces that constellation's satellites
        if gsv.message_num == 1 {
            self.satellites_info
                .retain(|sat| sat.constellation != gsv.constellation);
        }

        for sat_info in &gsv.satellites {
            if let Some(existing) = self
                .satellites_info
                .iter_mut()
                .find(|s| s.prn == sat_info.prn && s.constellation == sat_info.constellation)
            {
                let used = existing.used;
                *existing = sat_info.clone();
                existing.used = used;
            } else {
                self.satellites_info.push(sat_info.clone());
            }
        }
    }

    /// Get fix type description
    pub fn get_fix_description(&self) -> String {
        if let Some(quality) = self.fix_quality {
            match quality {
                0 => "No fix".to_string(),
                1 => "GPS".to_string(),
                2 => "DGPS".to_string(),
                3 => "PPS".to_string(),
                4 => "RTK".to_string(),
                5 => "Float RTK".to_string(),
                6 => "Estimated".to_string(),
                7 => "Manual".to_string(),
                8 => "Simulation".to_string(),
                _ => format!("Unknown ({})", quality),
            }
        } else if let Some(m) = self.mode {
            match m {
                1 => "No fix".to_string(),
                2 => "2D fix".to_string(),
                3 => "3D fix".to_string(),
                _ => format!("Mode {}", m),
            }
        } else {
            "Unknown".to_string()
        }
    }

    /// Format coordinate for display
    pub fn format_coordinate(coord: Option<f64>) -> String {
        match coord {
            Some(val) => format!("{:>12.6}°", val),
            None => "No fix".to_string(),
        }
    }

    /// Format value with unit for display
    pub fn format_value<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
        match value {
            Some(val) => format!("{:>12} {}", val, unit),
            None => "Unknown".to_string(),
        }
    }

    /// Get count of satellites being used in the fix
    pub fn satellites_used(&self) -> usize {
        self.satellites_info.iter().filter(|sat| sat.used).count()
    }
}

fn set<T>(field: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *field = value;
    }
}

/// Shared handle on the process-wide [`GpsState`].
///
/// The monitoring session is the only writer; readers take snapshots.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<RwLock<GpsState>>);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> GpsState {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut GpsState)) {
        let mut state = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    /// Decode one framed sentence and fold it into the state.
    ///
    /// Undecodable sentences leave the state untouched.
    pub fn ingest(&self, sentence: &str) -> Result<()> {
        let decoded = nmea::parse_sentence(sentence)?;
        self.update(|state| {
            state.update_timestamp();
            state.add_raw_sentence(sentence);
            state.apply(&decoded);
        });
        Ok(())
    }
}
