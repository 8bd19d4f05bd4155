//! Data models for USGS GeoJSON feeds and the normalized event record.
//!
//! The wire types are deliberately lenient: individual features are kept as
//! raw JSON until they are converted, so one malformed feature never sinks the
//! whole batch.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::{FetchError, RangeError, RecordError};

/// Date format used by the picker and by the FDSN query parameters.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Earliest date the event catalogue is queried from.
#[must_use]
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1995, 8, 5).unwrap_or(NaiveDate::MIN)
}

/// Top-level GeoJSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    /// Always "FeatureCollection"
    #[serde(rename = "type")]
    pub type_: String,

    /// Feed metadata (absent on some static site lists)
    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Raw features, converted one by one
    pub features: Vec<Value>,
}

impl FeatureCollection {
    /// Validate the response structure.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.type_ != "FeatureCollection" {
            return Err(FetchError::InvalidResponse(format!(
                "expected type 'FeatureCollection', got '{}'",
                self.type_
            )));
        }
        Ok(())
    }

    /// Convert every feature into an [`EventRecord`], in feed order.
    ///
    /// Features that cannot be converted are logged and skipped.
    #[must_use]
    pub fn into_records(self) -> Vec<EventRecord> {
        self.features
            .into_iter()
            .enumerate()
            .filter_map(|(index, feature)| match EventRecord::from_feature(feature) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("skipping feature #{index}: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Metadata about the feed response.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// Human-readable title
    pub title: Option<String>,

    /// Number of events in response
    pub count: Option<usize>,
}

/// Shape of a single feature before validation.
#[derive(Debug, Deserialize)]
struct RawFeature {
    geometry: Option<RawGeometry>,
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    coordinates: Option<Vec<Value>>,
}

/// One event from a feed, normalized for display.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub longitude: f64,
    pub latitude: f64,
    /// Never negative; missing magnitudes are 0
    pub magnitude: f64,
    pub place: String,
    pub url: String,
    /// Event time (ms since epoch)
    pub time: Option<i64>,
    /// The feature's full `properties` object
    pub payload: Map<String, Value>,
}

impl EventRecord {
    /// Build a record from one GeoJSON feature.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when geometry or properties are missing or the
    /// coordinates are not numeric.
    pub fn from_feature(feature: Value) -> Result<Self, RecordError> {
        let raw: RawFeature = serde_json::from_value(feature)
            .map_err(|_| RecordError::MissingField("geometry"))?;

        let coordinates = raw
            .geometry
            .and_then(|g| g.coordinates)
            .ok_or(RecordError::MissingField("geometry.coordinates"))?;
        let properties = raw
            .properties
            .ok_or(RecordError::MissingField("properties"))?;

        let (longitude, latitude) = lon_lat(&coordinates)?;

        let magnitude = normalize_magnitude(properties.get("mag").and_then(Value::as_f64));
        let place = string_property(&properties, "place");
        let url = string_property(&properties, "url");
        let time = properties.get("time").and_then(|t| {
            t.as_i64()
                .or_else(|| t.as_f64().map(|ms| ms.trunc() as i64))
        });

        Ok(Self {
            longitude,
            latitude,
            magnitude,
            place,
            url,
            time,
            payload: properties,
        })
    }

    /// Get the event time in the local timezone.
    #[must_use]
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        self.time
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
    }

    /// Read a string field from the raw payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Fill a missing magnitude with 0, then clamp negatives to 0.
///
/// Both steps are applied because a feed can send either.
#[must_use]
pub fn normalize_magnitude(mag: Option<f64>) -> f64 {
    let filled = mag.unwrap_or(0.0);
    if filled.is_nan() { 0.0 } else { filled.max(0.0) }
}

fn lon_lat(coordinates: &[Value]) -> Result<(f64, f64), RecordError> {
    if coordinates.len() < 2 {
        return Err(RecordError::InvalidCoordinates(format!(
            "expected at least 2 coordinates, got {}",
            coordinates.len()
        )));
    }

    let lon = coordinates[0].as_f64();
    let lat = coordinates[1].as_f64();
    match (lon, lat) {
        (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => Ok((lon, lat)),
        _ => Err(RecordError::InvalidCoordinates(format!(
            "non-numeric longitude/latitude: {}, {}",
            coordinates[0], coordinates[1]
        ))),
    }
}

fn string_property(properties: &Map<String, Value>, key: &str) -> String {
    properties
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A closed calendar date range for the events query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range from the picker's two optional bounds.
    ///
    /// Returns `Ok(None)` while either bound is missing or blank; that is the
    /// "no query yet" state, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] if a bound does not parse, the bounds are
    /// reversed, or the start predates the catalogue.
    pub fn from_bounds(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>, RangeError> {
        let start = start.map(str::trim).filter(|s| !s.is_empty());
        let end = end.map(str::trim).filter(|s| !s.is_empty());

        let (Some(start), Some(end)) = (start, end) else {
            return Ok(None);
        };

        let start = parse_date(start)?;
        let end = parse_date(end)?;

        if start > end {
            return Err(RangeError::Reversed { start, end });
        }
        let earliest = earliest_date();
        if start < earliest {
            return Err(RangeError::BeforeEarliest { start, earliest });
        }

        Ok(Some(Self { start, end }))
    }

    /// `starttime` query value.
    #[must_use]
    pub fn start_param(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    /// `endtime` query value.
    #[must_use]
    pub fn end_param(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

/// Accepts `YYYY-MM-DD`, or an ISO timestamp whose date part is that.
fn parse_date(s: &str) -> Result<NaiveDate, RangeError> {
    let date_part = s.split('T').next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .map_err(|_| RangeError::Unparseable(s.to_string()))
}
