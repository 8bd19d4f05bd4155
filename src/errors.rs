//! Error types for quakemap.
//!
//! Uses `thiserror` for library-style error definitions. Each concern gets
//! its own enum so callers can tell a bad feed from a bad config at a glance.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while fetching and decoding a feed.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout, reading the body)
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream answered with a non-2xx status
    #[error("feed API error (HTTP {status}): {message}")]
    HttpStatus { status: u16, message: String },

    /// Body was not valid JSON, or not the JSON shape we expect
    #[error("failed to parse feed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// JSON parsed but is not a GeoJSON feature collection
    #[error("invalid feed response: {0}")]
    InvalidResponse(String),
}

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    HttpStatus,
    Parse,
}

impl FetchError {
    /// Classify this error as network, http-status or parse.
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network(_) => FetchErrorKind::Network,
            Self::HttpStatus { .. } => FetchErrorKind::HttpStatus,
            Self::Parse(_) | Self::InvalidResponse(_) => FetchErrorKind::Parse,
        }
    }
}

/// A single feature that cannot be turned into an event record.
#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("feature is missing `{0}`")]
    MissingField(&'static str),

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

/// Startup configuration problems. Always fatal.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A date range the UI sent that cannot be queried.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    Unparseable(String),

    #[error("start date {start} is after end date {end}")]
    Reversed { start: NaiveDate, end: NaiveDate },

    #[error("start date {start} is before the earliest available date {earliest}")]
    BeforeEarliest { start: NaiveDate, earliest: NaiveDate },
}
