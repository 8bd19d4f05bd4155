//! Renderer-facing view models: the marker layer and the detail card.
//!
//! Both builders are pure functions of the event records.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::EventRecord;

/// Marker fill color.
pub const MARKER_COLOR: &str = "rgb(255, 0, 0)";

/// Marker opacity.
pub const MARKER_OPACITY: f64 = 0.3;

/// Detail card timestamp format (local time).
pub const CARD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column-oriented description of the markers to draw.
///
/// All vectors have the same length, one entry per marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    /// Marker diameter in pixels
    pub size: Vec<f64>,
    /// Hover text
    pub text: Vec<String>,
    pub color: &'static str,
    pub opacity: f64,
    /// Raw `properties` of each marker's feature
    pub payload: Vec<Map<String, Value>>,
}

impl MapLayer {
    /// A layer with no markers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lon: Vec::new(),
            lat: Vec::new(),
            size: Vec::new(),
            text: Vec::new(),
            color: MARKER_COLOR,
            opacity: MARKER_OPACITY,
            payload: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lon.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lon.is_empty()
    }
}

impl Default for MapLayer {
    fn default() -> Self {
        Self::empty()
    }
}

/// Marker size for a magnitude.
///
/// Squared on purpose: large events should dominate the map.
#[must_use]
pub fn marker_size(magnitude: f64) -> f64 {
    magnitude * magnitude
}

/// Build the marker layer for a batch of records, preserving order.
#[must_use]
pub fn build_map_layer(records: &[EventRecord]) -> MapLayer {
    MapLayer {
        lon: records.iter().map(|r| r.longitude).collect(),
        lat: records.iter().map(|r| r.latitude).collect(),
        size: records.iter().map(|r| marker_size(r.magnitude)).collect(),
        text: records.iter().map(|r| r.place.clone()).collect(),
        color: MARKER_COLOR,
        opacity: MARKER_OPACITY,
        payload: records.iter().map(|r| r.payload.clone()).collect(),
    }
}

/// Content of the click-detail panel.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailCard {
    pub title: String,
    pub detail_url: String,
    pub magnitude: f64,
    pub place: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    pub time: String,
}

/// Build the detail card for the selected record, if any.
#[must_use]
pub fn build_detail_card(selected: Option<&EventRecord>) -> Option<DetailCard> {
    let record = selected?;

    let title = record
        .payload_str("title")
        .map_or_else(|| fallback_title(record), str::to_string);
    let detail_url = record
        .payload_str("detail")
        .unwrap_or(&record.url)
        .to_string();

    Some(DetailCard {
        title,
        detail_url,
        magnitude: record.magnitude,
        place: record.place.clone(),
        time: format_event_time(record),
    })
}

/// Format the event time as local time truncated to whole seconds.
#[must_use]
pub fn format_event_time(record: &EventRecord) -> String {
    record
        .local_time()
        .map_or_else(|| "unknown".to_string(), |t| t.format(CARD_TIME_FORMAT).to_string())
}

fn fallback_title(record: &EventRecord) -> String {
    format!("M {:.1} - {}", record.magnitude, record.place)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use serde_json::json;

    fn record(mag: Option<f64>, place: &str, time: Option<i64>) -> EventRecord {
        EventRecord::from_feature(json!({
            "geometry": { "coordinates": [10.5, -20.25, 3.0] },
            "properties": {
                "mag": mag,
                "place": place,
                "url": "https://example.test/event",
                "detail": "https://example.test/detail.geojson",
                "title": format!("Quake near {place}"),
                "time": time
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_empty_layer() {
        let layer = build_map_layer(&[]);
        assert!(layer.is_empty());
        assert_eq!(layer, MapLayer::empty());
    }

    #[test]
    fn test_layer_one_marker_per_record_in_order() {
        let records = vec![
            record(Some(2.0), "A", None),
            record(Some(-1.0), "B", None),
            record(None, "C", None),
            record(Some(5.0), "D", None),
        ];

        let layer = build_map_layer(&records);

        assert_eq!(layer.len(), 4);
        assert_eq!(layer.text, vec!["A", "B", "C", "D"]);
        assert_eq!(layer.size, vec![4.0, 0.0, 0.0, 25.0]);
        assert_eq!(layer.lon, vec![10.5; 4]);
        assert_eq!(layer.lat, vec![-20.25; 4]);
        assert_eq!(layer.color, "rgb(255, 0, 0)");
        assert!((layer.opacity - 0.3).abs() < f64::EPSILON);
        assert_eq!(layer.payload[1].get("mag"), Some(&json!(-1.0)));
    }

    #[test]
    fn test_marker_size_is_monotonic() {
        let sizes: Vec<f64> = [0.0, 0.5, 1.0, 2.5, 7.1].iter().map(|m| marker_size(*m)).collect();
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_no_selection_no_card() {
        assert_eq!(build_detail_card(None), None);
    }

    #[test]
    fn test_detail_card_fields() {
        let r = record(Some(4.25), "Offshore", Some(1_577_836_800_000));
        let card = build_detail_card(Some(&r)).unwrap();

        assert_eq!(card.title, "Quake near Offshore");
        assert_eq!(card.detail_url, "https://example.test/detail.geojson");
        assert!((card.magnitude - 4.25).abs() < f64::EPSILON);
        assert_eq!(card.place, "Offshore");

        let expected = Local
            .timestamp_opt(1_577_836_800, 0)
            .single()
            .unwrap()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        assert_eq!(card.time, expected);
    }

    #[test]
    fn test_timestamp_truncates_to_seconds() {
        let base = format_event_time(&record(None, "X", Some(1_577_836_800_000)));
        let later = format_event_time(&record(None, "X", Some(1_577_836_800_999)));
        assert_eq!(later, base);
        assert_eq!(base.len(), "YYYY-MM-DD HH:MM:SS".len());
    }

    #[test]
    fn test_card_fallbacks() {
        let r = EventRecord::from_feature(json!({
            "geometry": { "coordinates": [0.0, 0.0] },
            "properties": { "mag": 3.0, "place": "Nowhere", "url": "https://example.test/u" }
        }))
        .unwrap();

        let card = build_detail_card(Some(&r)).unwrap();
        assert_eq!(card.title, "M 3.0 - Nowhere");
        assert_eq!(card.detail_url, "https://example.test/u");
        assert_eq!(card.time, "unknown");
    }
}
