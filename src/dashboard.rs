//! Interaction state for one dashboard: the displayed layer and the selection.
//!
//! All mutation goes through [`Dashboard`], one event at a time. Fetches are
//! keyed by a monotonically increasing [`RequestId`]; a response is only
//! applied if it is newer than the displayed layer. A slow old query can
//! never overwrite the result of a newer one, but it still lands when every
//! newer fetch failed.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::FeedFetcher;
use crate::config::FeedMode;
use crate::errors::{FetchError, FetchErrorKind};
use crate::models::{DateRange, EventRecord};
use crate::view::{DetailCard, MapLayer, build_detail_card, build_map_layer};

/// Identifies one fetch. Also names the layer generation it produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

/// Which record, if any, the user clicked.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SelectionState {
    #[default]
    NoSelection,
    Selected(EventRecord),
}

/// What happened to a layer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// New records are displayed
    Applied,
    /// A newer fetch is already displayed; the result was dropped
    Stale,
    /// The fetch failed; the previous layer is kept
    Failed,
    /// Nothing to fetch (range not set yet)
    Unchanged,
}

/// A fetch the caller should perform and then report back.
#[derive(Debug, Clone, Copy)]
pub struct PendingFetch {
    pub id: RequestId,
    pub range: Option<DateRange>,
}

/// Displayed layer, its records, and the current selection.
#[derive(Debug, Default)]
pub struct Dashboard {
    records: Vec<EventRecord>,
    layer: MapLayer,
    /// Request that produced the displayed layer (0 = initial empty layer)
    generation: RequestId,
    /// Most recently started request
    latest: RequestId,
    selection: SelectionState,
}

impl Dashboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a range change needs a fetch, and register it.
    ///
    /// In ranged mode a missing bound means "no query yet": nothing is
    /// fetched and the current layer stays. Static mode always fetches the
    /// summary feed and ignores the range.
    pub fn begin_query(&mut self, mode: FeedMode, range: Option<DateRange>) -> Option<PendingFetch> {
        let range = match mode {
            FeedMode::Static => None,
            FeedMode::Ranged => Some(range?),
        };

        self.latest = RequestId(self.latest.0 + 1);
        debug!("starting fetch #{} for {:?}", self.latest.0, range);
        Some(PendingFetch { id: self.latest, range })
    }

    /// Apply the result of fetch `id`.
    pub fn complete_fetch(
        &mut self,
        id: RequestId,
        result: Result<Vec<EventRecord>, FetchError>,
    ) -> FetchOutcome {
        if id <= self.generation {
            debug!("dropping result of fetch #{} (layer is from #{})", id.0, self.generation.0);
            return FetchOutcome::Stale;
        }

        match result {
            Ok(records) => {
                self.layer = build_map_layer(&records);
                self.records = records;
                self.generation = id;
                self.selection = SelectionState::NoSelection;
                if self.layer.is_empty() {
                    debug!("fetch #{} applied: no events", id.0);
                } else {
                    debug!("fetch #{} applied: {} markers", id.0, self.layer.len());
                }
                FetchOutcome::Applied
            }
            Err(e) => {
                warn!("fetch #{} failed, keeping previous map: {}", id.0, e);
                FetchOutcome::Failed
            }
        }
    }

    /// Handle a marker click on layer `generation`.
    ///
    /// `None`, an unknown marker, or a click on an outdated layer clears the
    /// selection.
    pub fn select(&mut self, generation: RequestId, marker: Option<usize>) -> Option<DetailCard> {
        let picked = marker
            .filter(|_| generation == self.generation)
            .and_then(|i| self.records.get(i));

        self.selection = match picked {
            Some(record) => SelectionState::Selected(record.clone()),
            None => SelectionState::NoSelection,
        };
        self.card()
    }

    /// Card for the current selection.
    #[must_use]
    pub fn card(&self) -> Option<DetailCard> {
        match &self.selection {
            SelectionState::Selected(record) => build_detail_card(Some(record)),
            SelectionState::NoSelection => None,
        }
    }

    #[must_use]
    pub fn layer(&self) -> &MapLayer {
        &self.layer
    }

    #[must_use]
    pub fn generation(&self) -> RequestId {
        self.generation
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }
}

/// Run one range change end to end against `fetcher`.
///
/// The lock is not held across the network call.
pub async fn refresh(
    dashboard: &Mutex<Dashboard>,
    fetcher: &FeedFetcher,
    mode: FeedMode,
    range: Option<DateRange>,
) -> (FetchOutcome, Option<FetchErrorKind>) {
    let Some(pending) = dashboard.lock().await.begin_query(mode, range) else {
        return (FetchOutcome::Unchanged, None);
    };

    let result = fetcher.fetch(pending.range.as_ref()).await;
    let kind = result.as_ref().err().map(FetchError::kind);

    let outcome = dashboard.lock().await.complete_fetch(pending.id, result);
    (outcome, kind)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::ResponseCache;
    use crate::client::FeedType;
    use crate::testutil::{StubFeed, feature_collection};

    fn records(mags: &[f64]) -> Vec<EventRecord> {
        let body = feature_collection(mags);
        let feed: crate::models::FeatureCollection = serde_json::from_str(&body).unwrap();
        feed.into_records()
    }

    fn range() -> Option<DateRange> {
        DateRange::from_bounds(Some("2020-01-01"), Some("2020-01-02")).unwrap()
    }

    fn parse_error() -> FetchError {
        FetchError::Parse(serde_json::from_str::<serde_json::Value>("{").unwrap_err())
    }

    #[test]
    fn test_initial_state() {
        let dash = Dashboard::new();
        assert!(dash.layer().is_empty());
        assert_eq!(dash.selection(), &SelectionState::NoSelection);
        assert_eq!(dash.card(), None);
    }

    #[test]
    fn test_unset_range_does_not_fetch() {
        let mut dash = Dashboard::new();
        assert!(dash.begin_query(FeedMode::Ranged, None).is_none());
        assert!(dash.layer().is_empty());
    }

    #[test]
    fn test_static_mode_ignores_range() {
        let mut dash = Dashboard::new();
        let pending = dash.begin_query(FeedMode::Static, range()).unwrap();
        assert_eq!(pending.range, None);
        assert!(dash.begin_query(FeedMode::Static, None).is_some());
    }

    #[test]
    fn test_apply_builds_layer() {
        let mut dash = Dashboard::new();
        let pending = dash.begin_query(FeedMode::Ranged, range()).unwrap();

        let outcome = dash.complete_fetch(pending.id, Ok(records(&[1.0, 2.0, 3.0])));

        assert_eq!(outcome, FetchOutcome::Applied);
        assert_eq!(dash.layer().len(), 3);
        assert_eq!(dash.generation(), pending.id);
    }

    #[test]
    fn test_click_selects_and_new_fetch_clears() {
        let mut dash = Dashboard::new();
        let first = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        dash.complete_fetch(first.id, Ok(records(&[1.0, 2.0])));

        let card = dash.select(first.id, Some(1)).unwrap();
        assert_eq!(card.place, "Place 1");
        assert!(matches!(dash.selection(), SelectionState::Selected(r) if r.place == "Place 1"));

        let second = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        dash.complete_fetch(second.id, Ok(records(&[4.0])));

        assert_eq!(dash.selection(), &SelectionState::NoSelection);
        assert_eq!(dash.card(), None);
    }

    #[test]
    fn test_click_without_payload_clears() {
        let mut dash = Dashboard::new();
        let p = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        dash.complete_fetch(p.id, Ok(records(&[1.0])));

        assert!(dash.select(p.id, Some(0)).is_some());
        assert!(dash.select(p.id, None).is_none());
        assert_eq!(dash.selection(), &SelectionState::NoSelection);

        assert!(dash.select(p.id, Some(0)).is_some());
        assert!(dash.select(p.id, Some(7)).is_none());
    }

    #[test]
    fn test_click_on_outdated_layer_is_ignored() {
        let mut dash = Dashboard::new();
        let first = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        dash.complete_fetch(first.id, Ok(records(&[1.0])));
        let second = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        dash.complete_fetch(second.id, Ok(records(&[2.0, 3.0])));

        assert!(dash.select(first.id, Some(0)).is_none());
    }

    #[test]
    fn test_failed_fetch_keeps_layer_and_selection() {
        let mut dash = Dashboard::new();
        let first = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        dash.complete_fetch(first.id, Ok(records(&[1.0, 2.0])));
        dash.select(first.id, Some(0));
        let before = dash.layer().clone();

        let second = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        let outcome = dash.complete_fetch(second.id, Err(parse_error()));

        assert_eq!(outcome, FetchOutcome::Failed);
        assert_eq!(dash.layer(), &before);
        assert_eq!(dash.generation(), first.id);
        assert!(matches!(dash.selection(), SelectionState::Selected(_)));
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut dash = Dashboard::new();
        let older = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        let newer = dash.begin_query(FeedMode::Ranged, range()).unwrap();

        assert_eq!(dash.complete_fetch(newer.id, Ok(records(&[5.0]))), FetchOutcome::Applied);
        assert_eq!(
            dash.complete_fetch(older.id, Ok(records(&[1.0, 2.0, 3.0]))),
            FetchOutcome::Stale
        );
        assert_eq!(dash.layer().len(), 1);
        assert_eq!(dash.generation(), newer.id);
    }

    #[test]
    fn test_older_success_lands_when_newer_fetch_failed() {
        let mut dash = Dashboard::new();
        let older = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        let newer = dash.begin_query(FeedMode::Ranged, range()).unwrap();

        assert_eq!(dash.complete_fetch(newer.id, Err(parse_error())), FetchOutcome::Failed);
        assert_eq!(
            dash.complete_fetch(older.id, Ok(records(&[1.0, 2.0]))),
            FetchOutcome::Applied
        );
        assert_eq!(dash.layer().len(), 2);
        assert_eq!(dash.generation(), older.id);

        // A late failure of an already superseded fetch changes nothing.
        let latest = dash.begin_query(FeedMode::Ranged, range()).unwrap();
        dash.complete_fetch(latest.id, Ok(records(&[3.0])));
        assert_eq!(dash.complete_fetch(older.id, Err(parse_error())), FetchOutcome::Stale);
        assert_eq!(dash.generation(), latest.id);
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_layer_on_bad_json() {
        let stub = StubFeed::serve(vec![
            (200, feature_collection(&[2.0, 3.0])),
            (200, "<html>oops".to_string()),
        ])
        .await;
        let fetcher =
            FeedFetcher::new(&stub.base_url, FeedType::AllDay, ResponseCache::new(Duration::ZERO))
                .unwrap();
        let dash = Mutex::new(Dashboard::new());

        let (first, _) = refresh(&dash, &fetcher, FeedMode::Ranged, range()).await;
        let (second, kind) = refresh(&dash, &fetcher, FeedMode::Ranged, range()).await;

        assert_eq!(first, FetchOutcome::Applied);
        assert_eq!(second, FetchOutcome::Failed);
        assert_eq!(kind, Some(FetchErrorKind::Parse));
        let dash = dash.lock().await;
        assert_eq!(dash.layer().len(), 2);
        assert_eq!(dash.layer().text, vec!["Place 0", "Place 1"]);
    }

    #[tokio::test]
    async fn test_refresh_unset_range_makes_no_request() {
        let stub = StubFeed::serve(vec![(200, feature_collection(&[1.0]))]).await;
        let fetcher =
            FeedFetcher::new(&stub.base_url, FeedType::AllDay, ResponseCache::default()).unwrap();
        let dash = Mutex::new(Dashboard::new());

        let (outcome, _) = refresh(&dash, &fetcher, FeedMode::Ranged, None).await;

        assert_eq!(outcome, FetchOutcome::Unchanged);
        assert_eq!(stub.hits(), 0);
        assert!(dash.lock().await.layer().is_empty());
    }
}
