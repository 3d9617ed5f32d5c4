// src/display/terminal.rs
//! Terminal-based display implementation

use crate::{
    error::Result,
    gps::{GpsState, SharedState},
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    time::Duration,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub struct TerminalDisplay;

impl TerminalDisplay {
    pub fn new() -> Self {
        Self
    }

    /// Redraw the screen from state snapshots until `shutdown` fires
    pub async fn run(&self, state: SharedState, shutdown: CancellationToken) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Hide, DisableLineWrap)?;

        while !shutdown.is_cancelled() {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

            let snapshot = state.snapshot();
            self.render_display(&mut stdout, &snapshot)?;

            stdout.flush()?;
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = sleep(REFRESH_INTERVAL) => {}
            }
        }

        execute!(stdout, Show, EnableLineWrap)?;
        println!("\nShutting down...");
        Ok(())
    }

    /// Render the GPS state to the terminal
    fn render_display(&self, stdout: &mut impl Write, data: &GpsState) -> Result<()> {
        // Header
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print("GPS Autodetect - NMEA Receiver Status"),
            Print("\n"),
            Print("=".repeat(60)),
            Print("\n"),
            ResetColor
        )?;

        // Timestamp and device
        let timestamp_str = match data.timestamp {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "No data received".to_string(),
        };
        let device_str = data.device.as_deref().unwrap_or("No device");
        execute!(
            stdout,
            Print(format!("Last Update: {} ({})\n\n", timestamp_str, device_str))
        )?;

        self.render_position_section(stdout, data)?;
        self.render_movement_section(stdout, data)?;

        if data.satellites.is_some() || data.hdop.is_some() || data.fix_quality.is_some() {
            self.render_quality_section(stdout, data)?;
        }

        self.render_raw_data_section(stdout, data)?;

        // Footer
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print("Press Ctrl+C to exit"),
            Print("\n"),
            ResetColor
        )?;

        Ok(())
    }

    fn render_position_section(&self, stdout: &mut impl Write, data: &GpsState) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Yellow),
            Print("POSITION:\n"),
            ResetColor,
            Print(format!("  Latitude:  {}\n", GpsState::format_coordinate(data.latitude))),
            Print(format!("  Longitude: {}\n", GpsState::format_coordinate(data.longitude))),
            Print(format!("  Altitude:  {}\n", GpsState::format_value(data.altitude, "m"))),
        )?;

        if let (Some(date), Some(time)) = (data.fix_date, data.fix_time) {
            execute!(stdout, Print(format!("  Fix Time:  {} {} UTC\n", date, time)))?;
        }

        execute!(stdout, Print("\n"))?;
        Ok(())
    }

    fn render_movement_section(&self, stdout: &mut impl Write, data: &GpsState) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Cyan),
            Print("MOVEMENT:\n"),
            ResetColor,
            Print(format!("  Speed:     {}\n", GpsState::format_value(data.speed, "km/h"))),
            Print(format!("  Course:    {}\n\n", GpsState::format_value(data.course, "°"))),
        )?;

        Ok(())
    }

    fn render_quality_section(&self, stdout: &mut impl Write, data: &GpsState) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Magenta),
            Print("QUALITY:\n"),
            ResetColor,
            Print(format!("  Satellites: {}\n", GpsState::format_value(data.satellites, ""))),
            Print(format!("  In View:    {:>12}\n", data.satellites_info.len())),
            Print(format!("  Used:       {:>12}\n", data.satellites_used())),
            Print(format!("  HDOP:       {}\n", GpsState::format_value(data.hdop, ""))),
            Print(format!("  PDOP:       {}\n", GpsState::format_value(data.pdop, ""))),
            Print(format!("  Fix Type:   {:>12}\n\n", data.get_fix_description())),
        )?;

        Ok(())
    }

    fn render_raw_data_section(&self, stdout: &mut impl Write, data: &GpsState) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Blue),
            Print("RAW DATA:\n"),
            ResetColor
        )?;

        if data.raw_history.is_empty() {
            execute!(stdout, Print("  No data\n\n"))?;
        } else {
            for sentence in &data.raw_history {
                execute!(stdout, Print(format!("  {}\n", sentence)))?;
            }
            execute!(stdout, Print("\n"))?;
        }

        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_data() {
        let mut out = Vec::new();
        TerminalDisplay::new()
            .render_display(&mut out, &GpsState::new())
            .unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("No data received (No device)"));
        assert!(text.contains("No fix"));
        assert!(!text.contains("QUALITY:"));
    }

    #[test]
    fn test_render_with_fix() {
        let state = SharedState::new();
        state.update(|s| s.device = Some("/dev/ttyUSB0".to_string()));
        state
            .ingest("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47")
            .unwrap();

        let mut out = Vec::new();
        TerminalDisplay::new()
            .render_display(&mut out, &state.snapshot())
            .unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("/dev/ttyUSB0"));
        assert!(text.contains("48.117300°"));
        assert!(text.contains("QUALITY:"));
        assert!(text.contains("$GPGGA,123519"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        TerminalDisplay::new()
            .run(SharedState::new(), shutdown)
            .await
            .unwrap();
    }
}
