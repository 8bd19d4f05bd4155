//! USGS feed fetcher.
//!
//! One fetcher covers both dashboard modes: a date range selects the FDSN
//! events query, no range selects the configured summary feed. Uses reqwest
//! with rustls for TLS.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use crate::cache::ResponseCache;
use crate::errors::FetchError;
use crate::models::{DateRange, EventRecord, FeatureCollection};

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("quakemap/", env!("CARGO_PKG_VERSION"));

/// USGS base URL for earthquake feeds.
pub const USGS_BASE_URL: &str = "https://earthquake.usgs.gov";

/// Path of the FDSN events query endpoint.
const EVENTS_QUERY_PATH: &str = "/fdsnws/event/1/query";

/// Available summary feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedType {
    AllHour,
    AllDay,
    AllWeek,
    AllMonth,
    Mag25Day,
    Mag25Week,
    Mag45Day,
    Mag45Week,
    SignificantWeek,
    SignificantMonth,
}

impl FeedType {
    /// Get the URL path segment for this feed type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllHour => "all_hour",
            Self::AllDay => "all_day",
            Self::AllWeek => "all_week",
            Self::AllMonth => "all_month",
            Self::Mag25Day => "2.5_day",
            Self::Mag25Week => "2.5_week",
            Self::Mag45Day => "4.5_day",
            Self::Mag45Week => "4.5_week",
            Self::SignificantWeek => "significant_week",
            Self::SignificantMonth => "significant_month",
        }
    }
}

impl std::str::FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_hour" => Ok(Self::AllHour),
            "all_day" => Ok(Self::AllDay),
            "all_week" => Ok(Self::AllWeek),
            "all_month" => Ok(Self::AllMonth),
            "2.5_day" => Ok(Self::Mag25Day),
            "2.5_week" => Ok(Self::Mag25Week),
            "4.5_day" => Ok(Self::Mag45Day),
            "4.5_week" => Ok(Self::Mag45Week),
            "significant_week" => Ok(Self::SignificantWeek),
            "significant_month" => Ok(Self::SignificantMonth),
            _ => Err(format!("unknown feed type: {s}")),
        }
    }
}

/// Fetches a feed and turns it into event records.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    base_url: String,
    summary: FeedType,
    cache: ResponseCache,
}

impl FeedFetcher {
    /// Create a fetcher against `base_url`.
    ///
    /// `summary` is the feed queried when no date range is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(
        base_url: impl Into<String>,
        summary: FeedType,
        cache: ResponseCache,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            summary,
            cache,
        })
    }

    /// Build the request URL for a range, or the summary feed for `None`.
    #[must_use]
    pub fn request_url(&self, range: Option<&DateRange>) -> String {
        match range {
            Some(range) => format!(
                "{}{}?format=geojson&starttime={}&endtime={}",
                self.base_url,
                EVENTS_QUERY_PATH,
                range.start_param(),
                range.end_param()
            ),
            None => format!(
                "{}/earthquakes/feed/v1.0/summary/{}.geojson",
                self.base_url,
                self.summary.as_str()
            ),
        }
    }

    /// Fetch events for `range` (or the summary feed) in feed order.
    ///
    /// Performs at most one network request; a fresh cached body skips it.
    ///
    /// # Errors
    ///
    /// Returns a network, http-status or parse [`FetchError`].
    #[instrument(skip(self), fields(summary = self.summary.as_str()))]
    pub async fn fetch(&self, range: Option<&DateRange>) -> Result<Vec<EventRecord>, FetchError> {
        let url = self.request_url(range);

        let (body, cached) = match self.cache.get(&url) {
            Some(body) => (body, true),
            None => (self.download(&url).await?, false),
        };

        let feed: FeatureCollection = serde_json::from_str(&body)?;
        feed.validate()?;

        if let Some(meta) = &feed.metadata {
            debug!(
                "feed '{}' reports {} events",
                meta.title.as_deref().unwrap_or("untitled"),
                meta.count.map_or_else(|| "?".to_string(), |c| c.to_string())
            );
        }

        let total = feed.features.len();
        let records = feed.into_records();

        if !cached {
            self.cache.put(&url, body);
        }

        debug!(
            "fetched {} events ({} features, cached: {}, cache size: {})",
            records.len(),
            total,
            cached,
            self.cache.len()
        );
        Ok(records)
    }

    async fn download(&self, url: &str) -> Result<Arc<str>, FetchError> {
        debug!("fetching feed from {}", url);

        let response = self.client.get(url).send().await?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(Arc::from(response.text().await?))
    }
}
