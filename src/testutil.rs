//! Test helpers: a local stand-in for the USGS endpoints.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    routing::get,
};
use serde_json::json;

#[derive(Default)]
struct StubState {
    responses: Mutex<VecDeque<(u16, String)>>,
    hits: AtomicUsize,
    last_query: Mutex<Option<String>>,
    last_path: Mutex<Option<String>>,
}

impl StubState {
    /// Pop the next canned response; the last one repeats forever.
    fn next(&self, path: Option<String>, query: Option<String>) -> (StatusCode, String) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = query;
        *self.last_path.lock().unwrap() = path;

        let mut responses = self.responses.lock().unwrap();
        let (status, body) = if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap_or((404, String::new()))
        };
        (StatusCode::from_u16(status).unwrap(), body)
    }
}

/// A running stub feed server.
pub struct StubFeed {
    pub base_url: String,
    state: Arc<StubState>,
}

impl StubFeed {
    /// Serve `responses` in order on both the query and summary endpoints.
    pub async fn serve(responses: Vec<(u16, String)>) -> Self {
        let state = Arc::new(StubState {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        });

        let app = Router::new()
            .route(
                "/fdsnws/event/1/query",
                get(|State(s): State<Arc<StubState>>, RawQuery(q): RawQuery| async move {
                    s.next(None, q)
                }),
            )
            .route(
                "/earthquakes/feed/v1.0/summary/{file}",
                get(
                    |State(s): State<Arc<StubState>>, Path(file): Path<String>, RawQuery(q): RawQuery| async move {
                        s.next(Some(file), q)
                    },
                ),
            )
            .with_state(Arc::clone(&state));

        let base_url = serve_router(app).await;
        Self { base_url, state }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<String> {
        self.state.last_query.lock().unwrap().clone()
    }

    pub fn last_path(&self) -> Option<String> {
        self.state.last_path.lock().unwrap().clone()
    }
}

/// Bind `app` on an ephemeral local port and return its base URL.
pub async fn serve_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// A GeoJSON feature collection with one feature per magnitude.
///
/// Feature `i` is at (lon `i`, lat `-i`), has `time = i` and place `Place i`.
pub fn feature_collection(mags: &[f64]) -> String {
    let features: Vec<_> = mags
        .iter()
        .enumerate()
        .map(|(i, mag)| {
            json!({
                "type": "Feature",
                "id": format!("ev{i}"),
                "geometry": { "type": "Point", "coordinates": [i as f64, -(i as f64), 10.0] },
                "properties": {
                    "mag": mag,
                    "place": format!("Place {i}"),
                    "url": format!("https://example.test/event/ev{i}"),
                    "detail": format!("https://example.test/detail/ev{i}.geojson"),
                    "title": format!("M {mag} - Place {i}"),
                    "time": i
                }
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "metadata": { "title": "stub feed", "count": mags.len() },
        "features": features
    })
    .to_string()
}
