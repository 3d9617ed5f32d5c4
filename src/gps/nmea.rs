// src/gps/nmea.rs
//! NMEA sentence decoding

use super::data::SatelliteInfo;
use crate::error::{GpsError, Result};
use chrono::{NaiveDate, NaiveTime};

/// A decoded sentence of one of the supported types
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Gga(Gga),
    Rmc(Rmc),
    Gsa(Gsa),
    Gsv(Gsv),
}

/// Global Positioning System Fix Data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gga {
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub fix_quality: Option<u8>,
    pub satellites: Option<u8>,
    pub hdop: Option<f64>,
    pub altitude: Option<f64>,
}

/// Recommended Minimum Course
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rmc {
    pub time: Option<NaiveTime>,
    pub valid: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_knots: Option<f64>,
    pub course: Option<f64>,
    pub date: Option<NaiveDate>,
}

/// DOP and active satellites
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gsa {
    pub mode: Option<u8>,
    pub used_prns: Vec<u8>,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
}

/// Satellites in view, one message of a cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gsv {
    pub constellation: &'static str,
    pub total_messages: u8,
    pub message_num: u8,
    pub satellites: Vec<SatelliteInfo>,
}

/// Decode one framed sentence.
///
/// The `*HH` checksum is verified when present. Unsupported sentence types
/// are reported as parse errors.
pub fn parse_sentence(line: &str) -> Result<Sentence> {
    let line = line.trim();
    let body = line
        .strip_prefix('$')
        .ok_or_else(|| GpsError::Parse(format!("missing start marker: {:?}", line)))?;

    let body = match body.split_once('*') {
        Some((body, checksum)) => {
            verify_checksum(body, checksum)?;
            body
        }
        None => body,
    };

    let parts: Vec<&str> = body.split(',').collect();
    let address = parts[0];
    if address.len() != 5 || !address.is_ascii() {
        return Err(GpsError::Parse(format!("unsupported sentence: {}", address)));
    }
    let (talker, kind) = address.split_at(2);

    match kind {
        "GGA" => Ok(Sentence::Gga(parse_gga(&parts))),
        "RMC" => Ok(Sentence::Rmc(parse_rmc(&parts))),
        "GSA" => Ok(Sentence::Gsa(parse_gsa(&parts))),
        "GSV" => parse_gsv(talker, &parts).map(Sentence::Gsv),
        _ => Err(GpsError::Parse(format!("unsupported sentence: {}", address))),
    }
}

fn verify_checksum(body: &str, checksum: &str) -> Result<()> {
    let expected = u8::from_str_radix(checksum.trim(), 16)
        .map_err(|_| GpsError::Parse(format!("malformed checksum: {:?}", checksum)))?;
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
    if actual != expected {
        return Err(GpsError::Parse(format!(
            "checksum mismatch (expected {:02X}, computed {:02X})",
            expected, actual
        )));
    }
    Ok(())
}

/// Non-empty field at `index`
fn field<'a>(parts: &[&'a str], index: usize) -> Option<&'a str> {
    parts.get(index).copied().filter(|value| !value.is_empty())
}

fn number<T: std::str::FromStr>(parts: &[&str], index: usize) -> Option<T> {
    field(parts, index).and_then(|value| value.parse().ok())
}

/// `ddmm.mmmm` plus hemisphere into signed decimal degrees
fn coordinate(parts: &[&str], index: usize, negative: &str) -> Option<f64> {
    let raw = number::<f64>(parts, index)?;
    let hemisphere = field(parts, index + 1)?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let value = degrees + minutes / 60.0;
    Some(if hemisphere == negative { -value } else { value })
}

/// `hhmmss[.sss]`
fn time(parts: &[&str], index: usize) -> Option<NaiveTime> {
    let raw = field(parts, index)?;
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.len() != 6 || !whole.is_ascii() {
        return None;
    }
    let hour = whole[0..2].parse().ok()?;
    let minute = whole[2..4].parse().ok()?;
    let second = whole[4..6].parse().ok()?;
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let nanos = if fraction.is_empty() {
        0
    } else {
        let digits = &fraction[..fraction.len().min(9)];
        let scale = 10u32.pow(9 - digits.len() as u32);
        digits.parse::<u32>().ok()? * scale
    };
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
}

/// `ddmmyy`
fn date(parts: &[&str], index: usize) -> Option<NaiveDate> {
    let raw = field(parts, index)?;
    if raw.len() != 6 || !raw.is_ascii() {
        return None;
    }
    let day = raw[0..2].parse().ok()?;
    let month = raw[2..4].parse().ok()?;
    let year: i32 = raw[4..6].parse().ok()?;
    let century = if year < 80 { 2000 } else { 1900 };
    NaiveDate::from_ymd_opt(century + year, month, day)
}

fn parse_gga(parts: &[&str]) -> Gga {
    Gga {
        time: time(parts, 1),
        latitude: coordinate(parts, 2, "S"),
        longitude: coordinate(parts, 4, "W"),
        fix_quality: number(parts, 6),
        satellites: number(parts, 7),
        hdop: number(parts, 8),
        altitude: number(parts, 9),
    }
}

fn parse_rmc(parts: &[&str]) -> Rmc {
    Rmc {
        time: time(parts, 1),
        valid: field(parts, 2) == Some("A"),
        latitude: coordinate(parts, 3, "S"),
        longitude: coordinate(parts, 5, "W"),
        speed_knots: number(parts, 7),
        course: number(parts, 8),
        date: date(parts, 9),
    }
}

fn parse_gsa(parts: &[&str]) -> Gsa {
    Gsa {
        mode: number(parts, 2),
        used_prns: (3..=14).filter_map(|i| number(parts, i)).collect(),
        pdop: number(parts, 15),
        hdop: number(parts, 16),
        vdop: number(parts, 17),
    }
}

fn parse_gsv(talker: &str, parts: &[&str]) -> Result<Gsv> {
    let constellation = match talker {
        "GP" => "GPS",
        "GL" => "GLONASS",
        "GA" => "GALILEO",
        "GB" | "BD" => "BEIDOU",
        "GQ" => "QZSS",
        _ => "GNSS",
    };

    let total_messages = number(parts, 1)
        .ok_or_else(|| GpsError::Parse("GSV without message count".to_string()))?;
    let message_num = number(parts, 2)
        .ok_or_else(|| GpsError::Parse("GSV without message number".to_string()))?;

    // Up to four satellites per message, four fields each
    let mut satellites = Vec::new();
    let mut sat_index = 4;
    while sat_index < parts.len() {
        if let Some(prn) = number::<u8>(parts, sat_index) {
            let mut sat_info = SatelliteInfo::new(prn);
            if constellation != "GNSS" {
                sat_info.constellation = constellation.to_string();
            }
            sat_info.elevation = number(parts, sat_index + 1);
            sat_info.azimuth = number(parts, sat_index + 2);
            sat_info.snr = number(parts, sat_index + 3);
            satellites.push(sat_info);
        }
        sat_index += 4;
    }

    Ok(Gsv {
        constellation,
        total_messages,
        message_num,
        satellites,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gga_parsing() {
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

        let Sentence::Gga(gga) = parse_sentence(gga).unwrap() else {
            panic!("expected GGA");
        };

        assert!((gga.latitude.unwrap() - 48.1173).abs() < 0.0001);
        assert!((gga.longitude.unwrap() - 11.5167).abs() < 0.0001);
        assert_eq!(gga.satellites, Some(8));
        assert_eq!(gga.hdop, Some(0.9));
        assert_eq!(gga.altitude, Some(545.4));
        assert_eq!(gga.fix_quality, Some(1));
        assert_eq!(gga.time, NaiveTime::from_hms_opt(12, 35, 19));
    }

    #[test]
    fn test_rmc_parsing() {
        let rmc = "$GPRMC,092750.000,A,5321.6802,N,00630.3372,W,0.02,31.66,280511,,,A*43";

        let Sentence::Rmc(rmc) = parse_sentence(rmc).unwrap() else {
            panic!("expected RMC");
        };

        assert!(rmc.valid);
        assert!(rmc.longitude.unwrap() < 0.0);
        assert_eq!(rmc.speed_knots, Some(0.02));
        assert_eq!(rmc.course, Some(31.66));
        assert_eq!(rmc.date, NaiveDate::from_ymd_opt(2011, 5, 28));
    }

    #[test]
    fn test_void_rmc() {
        let Sentence::Rmc(rmc) = parse_sentence("$GPRMC,123519,V,,,,,,,230394,,*33").unwrap() else {
            panic!("expected RMC");
        };
        assert!(!rmc.valid);
        assert_eq!(rmc.latitude, None);
        assert_eq!(rmc.date, NaiveDate::from_ymd_opt(1994, 3, 23));
    }

    #[test]
    fn test_gsv_parsing() {
        let gsv = "$GPGSV,3,1,12,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*7F";

        let Sentence::Gsv(gsv) = parse_sentence(gsv).unwrap() else {
            panic!("expected GSV");
        };

        assert_eq!(gsv.total_messages, 3);
        assert_eq!(gsv.message_num, 1);
        assert_eq!(gsv.satellites.len(), 4);
        assert_eq!(gsv.satellites[0].prn, 1);
        assert_eq!(gsv.satellites[0].constellation, "GPS");
        assert_eq!(gsv.satellites[0].elevation, Some(40.0));
        assert_eq!(gsv.satellites[0].azimuth, Some(83.0));
        assert_eq!(gsv.satellites[0].snr, Some(46.0));
    }

    #[test]
    fn test_multi_constellation_gsv_uses_prn_ranges() {
        let Sentence::Gsv(gsv) = parse_sentence("$GNGSV,1,1,02,05,40,083,46,70,17,308,41*62").unwrap() else {
            panic!("expected GSV");
        };
        assert_eq!(gsv.satellites[0].constellation, "GPS");
        assert_eq!(gsv.satellites[1].constellation, "GLONASS");
    }

    #[test]
    fn test_fractional_seconds() {
        let Sentence::Gga(gga) = parse_sentence("$GPGGA,092750.25,,,,,0,00,,,M,,M,,").unwrap() else {
            panic!("expected GGA");
        };
        assert_eq!(gga.time, NaiveTime::from_hms_milli_opt(9, 27, 50, 250));
    }

    #[test]
    fn test_garbled_time_is_dropped() {
        // Line noise decoded lossily, and no checksum to catch it
        let garbled = "$GPGGA,123519.\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD},4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        let Sentence::Gga(gga) = parse_sentence(garbled).unwrap() else {
            panic!("expected GGA");
        };
        assert_eq!(gga.time, None);
        assert_eq!(gga.satellites, Some(8));

        let Sentence::Gga(gga) = parse_sentence("$GPGGA,1235\u{FFFD},,,,,0,00,,,M,,M,,").unwrap() else {
            panic!("expected GGA");
        };
        assert_eq!(gga.time, None);
    }

    #[test]
    fn test_sentence_without_checksum() {
        assert!(matches!(parse_sentence("$GPGSA,A,2"), Ok(Sentence::Gsa(gsa)) if gsa.mode == Some(2)));
    }

    #[test]
    fn test_checksum_mismatch() {
        let corrupted = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48";
        assert!(matches!(parse_sentence(corrupted), Err(GpsError::Parse(_))));
    }

    #[test]
    fn test_invalid_sentence() {
        assert!(parse_sentence("$INVALID,123,456").is_err());
        assert!(parse_sentence("GPGGA,no,marker").is_err());
        assert!(parse_sentence("$GPZDA,201530.00,04,07,2002,00,00").is_err());
    }
}
