//! Output formatters for the one-shot CLI commands.
//!
//! Supports human-readable (with colors), JSON, and NDJSON formats.

use std::io::{self, Write};

use serde::Serialize;

use crate::models::EventRecord;
use crate::view::format_event_time;

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

// Magnitude-based colors
const RED: &str = "\x1b[91m"; // mag >= 7.0
const YELLOW: &str = "\x1b[93m"; // mag >= 6.0
const CYAN: &str = "\x1b[96m"; // mag >= 4.5
const GREEN: &str = "\x1b[92m"; // mag >= 3.0
const WHITE: &str = "\x1b[97m";

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON array
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

/// Flat event shape emitted by the JSON formats.
#[derive(Debug, Serialize)]
struct OutputEvent<'a> {
    time: String,
    magnitude: f64,
    latitude: f64,
    longitude: f64,
    place: &'a str,
    url: &'a str,
}

impl<'a> From<&'a EventRecord> for OutputEvent<'a> {
    fn from(r: &'a EventRecord) -> Self {
        Self {
            time: format_event_time(r),
            magnitude: r.magnitude,
            latitude: r.latitude,
            longitude: r.longitude,
            place: &r.place,
            url: &r.url,
        }
    }
}

fn magnitude_color(mag: f64) -> &'static str {
    match mag {
        m if m >= 7.0 => RED,
        m if m >= 6.0 => YELLOW,
        m if m >= 4.5 => CYAN,
        m if m >= 3.0 => GREEN,
        _ => WHITE,
    }
}

/// Write events one per line, color-coded by magnitude.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, events: &[EventRecord]) -> io::Result<()> {
    for event in events {
        let color = magnitude_color(event.magnitude);
        let place = if event.place.is_empty() {
            "Unknown location"
        } else {
            &event.place
        };

        writeln!(
            writer,
            "{color}{BOLD}M{mag:.1}{RESET} │ {time} │ {DIM}{lat:>7.2}, {lon:>7.2}{RESET} │ {place}",
            mag = event.magnitude,
            time = format_event_time(event),
            lat = event.latitude,
            lon = event.longitude,
        )?;
    }
    Ok(())
}

/// Write events as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(writer: &mut W, events: &[EventRecord]) -> io::Result<()> {
    let output: Vec<OutputEvent<'_>> = events.iter().map(OutputEvent::from).collect();
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

/// Write events as newline-delimited JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write>(writer: &mut W, events: &[EventRecord]) -> io::Result<()> {
    for event in events {
        let json = serde_json::to_string(&OutputEvent::from(event))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{json}")?;
    }
    Ok(())
}

/// Write events in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(writer: &mut W, events: &[EventRecord], format: Format) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, events),
        Format::Json => write_json(writer, events),
        Format::Ndjson => write_ndjson(writer, events),
    }
}
