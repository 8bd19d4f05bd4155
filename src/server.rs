//! Web server for the quakemap dashboard.
//!
//! Provides a single-page earthquake map using:
//! - Axum for HTTP server
//! - plotly.js `scattermapbox` for the map, fed with [`MapLayer`] JSON
//! - a small HTML fragment endpoint for the click-detail card
//!
//! Every browser works on its own dashboard, found through a signed session
//! cookie (see [`crate::session`]).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, Response},
    routing::{get, post},
};
use chrono::Local;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::client::FeedFetcher;
use crate::config::{AppConfig, FeedMode};
use crate::dashboard::{self, FetchOutcome, RequestId};
use crate::errors::FetchErrorKind;
use crate::models::{DATE_FORMAT, DateRange, earliest_date};
use crate::session::SessionStore;
use crate::view::{DetailCard, MapLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    fetcher: FeedFetcher,
    sessions: SessionStore,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, fetcher: FeedFetcher) -> Self {
        let sessions = SessionStore::new(&config.credentials.secret_key);
        Self {
            config,
            fetcher,
            sessions,
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/layer", get(layer_handler))
        .route("/api/select", post(select_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the web server.
pub async fn run_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let cache = ResponseCache::new(config.cache_ttl);
    let fetcher = FeedFetcher::new(&config.base_url, config.summary, cache)?;

    let addr = config.bind_addr();
    let app = create_router(AppState::new(Arc::clone(&config), fetcher));

    info!("quakemap UI starting at http://{} ({} mode)", addr, config.mode.as_str());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Query string of `/api/layer`.
#[derive(Debug, Default, Deserialize)]
pub struct LayerQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Body of `/api/layer`.
#[derive(Debug, Serialize)]
pub struct LayerResponse {
    /// Generation of the layer below; clicks must echo it back
    pub generation: RequestId,
    pub outcome: FetchOutcome,
    /// Set when the fetch failed
    pub error: Option<FetchErrorKind>,
    pub layer: MapLayer,
}

/// Body of `/api/select`.
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub generation: RequestId,
    /// Index of the clicked marker, `null` for a click on empty map
    pub marker: Option<usize>,
}

/// Main page handler - serves the dashboard and opens a session.
async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = state.sessions.attach(&headers);
    session.respond(Html(render_index(&state.config)))
}

/// Range change: fetch (unless the range is incomplete) and return the layer.
async fn layer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LayerQuery>,
) -> Response {
    let session = state.sessions.attach(&headers);

    let mode = state.config.mode;
    let range = match mode {
        FeedMode::Static => None,
        FeedMode::Ranged => {
            match DateRange::from_bounds(query.start.as_deref(), query.end.as_deref()) {
                Ok(range) => range,
                Err(e) => {
                    warn!("rejected date range: {}", e);
                    return session.respond((StatusCode::BAD_REQUEST, e.to_string()));
                }
            }
        }
    };

    let (outcome, error) =
        dashboard::refresh(&session.dashboard, &state.fetcher, mode, range).await;
    debug!("layer request: {:?} ({} sessions)", outcome, state.sessions.len());

    let dash = session.dashboard.lock().await;
    let body = Json(LayerResponse {
        generation: dash.generation(),
        outcome,
        error,
        layer: dash.layer().clone(),
    });
    session.respond(body)
}

/// Marker click: update the selection and return the card fragment.
async fn select_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SelectRequest>,
) -> Response {
    let session = state.sessions.attach(&headers);
    let card = session
        .dashboard
        .lock()
        .await
        .select(request.generation, request.marker);

    session.respond(Html(card.as_ref().map(render_card_html).unwrap_or_default()))
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// Rendering
// ============================================================================

/// Render the detail card as an HTML fragment.
fn render_card_html(card: &DetailCard) -> String {
    format!(
        r#"<div class="card">
  <div class="card-header">{title}</div>
  <div class="card-body">URL: <a href="{href}" target="_blank" rel="noopener">{url}</a></div>
  <div class="card-body">Magnitude: {mag}</div>
  <div class="card-body">Place: {place}</div>
  <div class="card-body">Time: {time}</div>
  <button class="card-close" onclick="selectMarker(null)">Close</button>
</div>"#,
        title = encode_text(&card.title),
        href = encode_double_quoted_attribute(&card.detail_url),
        url = encode_text(&card.detail_url),
        mag = card.magnitude,
        place = encode_text(&card.place),
        time = encode_text(&card.time),
    )
}

/// Render the page with its runtime settings embedded.
fn render_index(config: &AppConfig) -> String {
    let settings = serde_json::json!({
        "mode": config.mode.as_str(),
        "mapboxToken": config.credentials.mapbox_token,
        "minDate": earliest_date().format(DATE_FORMAT).to_string(),
        "maxDate": Local::now().date_naive().format(DATE_FORMAT).to_string(),
    });
    // Keep the JSON from closing the surrounding <script> element.
    let settings = settings.to_string().replace("</", "<\\/");

    INDEX_HTML.replace("__DASHBOARD_SETTINGS__", &settings)
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>World Earthquakes</title>

    <script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>

    <style>
        :root {
            --font: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
            --bg: #f8fafc;
            --surface: #ffffff;
            --text: #0f172a;
            --text-muted: #475569;
            --border: #e2e8f0;
            --accent: #ef4444;
            --radius: 10px;
        }

        body {
            margin: 0;
            font-family: var(--font);
            background: var(--bg);
            color: var(--text);
            text-align: center;
        }

        h1 { margin: 1.5rem 0 1rem; }

        .range-picker {
            display: inline-flex;
            gap: 0.75rem;
            align-items: center;
            padding: 0.5rem 1rem;
            background: var(--surface);
            border: 1px solid var(--border);
            border-radius: var(--radius);
        }

        .range-picker input { font: inherit; padding: 0.25rem 0.5rem; }

        .status { min-height: 1.25rem; margin: 0.5rem; color: var(--text-muted); font-size: 0.875rem; }

        #world-map { height: 70vh; margin: 0 1rem; }

        #earthquake-info { width: 30%; min-width: 280px; margin: 1rem auto; }

        .card {
            text-align: left;
            background: var(--surface);
            border: 1px solid var(--border);
            border-radius: var(--radius);
            overflow: hidden;
        }

        .card-header { padding: 0.75rem 1rem; font-weight: 600; border-bottom: 1px solid var(--border); }
        .card-body { padding: 0.5rem 1rem; word-break: break-all; }
        .card-close { margin: 0.5rem 1rem 0.75rem; }
    </style>
</head>
<body>
    <h1>World Earthquakes</h1>

    <div class="range-picker" id="date-range-picker">
        <label>From <input type="date" id="start-date"></label>
        <label>To <input type="date" id="end-date"></label>
    </div>
    <div class="status" id="status"></div>

    <div id="world-map"></div>
    <div id="earthquake-info"></div>

    <script>
        const SETTINGS = __DASHBOARD_SETTINGS__;
        let generation = 0;
        let requestSeq = 0;

        function mapLayout() {
            const mapbox = { bearing: 0, pitch: 0, zoom: 1, center: { lat: 0, lon: 0 } };
            if (SETTINGS.mapboxToken) {
                mapbox.accesstoken = SETTINGS.mapboxToken;
                mapbox.style = 'light';
            } else {
                mapbox.style = 'open-street-map';
            }
            return { autosize: true, margin: { l: 0, r: 0, t: 0, b: 0 }, mapbox: mapbox };
        }

        function draw(layer) {
            const trace = {
                type: 'scattermapbox',
                mode: 'markers',
                lat: layer.lat,
                lon: layer.lon,
                text: layer.text,
                hoverinfo: 'text',
                customdata: layer.lon.map((_, i) => i),
                marker: { size: layer.size, color: layer.color, opacity: layer.opacity }
            };
            Plotly.react('world-map', [trace], mapLayout());
        }

        function setStatus(text) {
            document.getElementById('status').textContent = text;
        }

        async function loadLayer() {
            const params = new URLSearchParams();
            const start = document.getElementById('start-date').value;
            const end = document.getElementById('end-date').value;
            if (start) params.set('start', start);
            if (end) params.set('end', end);

            const seq = ++requestSeq;
            try {
                const response = await fetch('/api/layer?' + params.toString());
                if (seq !== requestSeq) return;
                if (!response.ok) {
                    setStatus(await response.text());
                    return;
                }
                const body = await response.json();
                if (seq !== requestSeq) return;
                if (body.outcome === 'failed') {
                    setStatus('Could not load earthquakes (' + body.error + '), showing previous results');
                }
                if (body.outcome === 'applied') {
                    setStatus(body.layer.lon.length + ' earthquakes');
                }
                if (body.generation !== generation) {
                    document.getElementById('earthquake-info').innerHTML = '';
                }
                generation = body.generation;
                draw(body.layer);
            } catch (e) {
                setStatus('Could not reach the server');
            }
        }

        async function selectMarker(marker) {
            const response = await fetch('/api/select', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ generation: generation, marker: marker })
            });
            if (response.ok) {
                document.getElementById('earthquake-info').innerHTML = await response.text();
            }
        }

        const startInput = document.getElementById('start-date');
        const endInput = document.getElementById('end-date');
        for (const input of [startInput, endInput]) {
            input.min = SETTINGS.minDate;
            input.max = SETTINGS.maxDate;
            input.addEventListener('change', loadLayer);
        }

        draw({ lat: [], lon: [], text: [], size: [], color: 'rgb(255, 0, 0)', opacity: 0.3 });
        document.getElementById('world-map').on('plotly_click', function (ev) {
            const point = ev.points && ev.points[0];
            selectMarker(point && point.customdata !== undefined ? point.customdata : null);
        });

        if (SETTINGS.mode === 'static') {
            document.getElementById('date-range-picker').style.display = 'none';
            loadLayer();
        }
    </script>
</body>
</html>
"##;
