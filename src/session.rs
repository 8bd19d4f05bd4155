//! Per-browser dashboard sessions.
//!
//! Each browser carries a signed session cookie naming its own [`Dashboard`],
//! so one visitor's queries never move another visitor's layer or selection.
//! Sessions live in a bounded LRU map; an evicted session starts over with an
//! empty dashboard under the same cookie.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use lru::LruCache;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::dashboard::Dashboard;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "quakemap_session";

/// Upper bound on live sessions.
const MAX_SESSIONS: usize = 1024;

/// Session ids are 128 random bits in lowercase hex.
const ID_LEN: usize = 32;

pub type SharedDashboard = Arc<tokio::sync::Mutex<Dashboard>>;

/// The dashboard bound to one request.
pub struct Session {
    pub dashboard: SharedDashboard,
    /// `Set-Cookie` value to send back when the session is new
    set_cookie: Option<String>,
}

impl Session {
    /// Attach the session cookie, if one was issued, to `body`.
    pub fn respond(&self, body: impl IntoResponse) -> Response {
        let mut response = body.into_response();
        if let Some(value) = self.set_cookie.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        response
    }
}

/// Signs session cookies with the server secret and maps them to dashboards.
#[derive(Clone)]
pub struct SessionStore {
    key: Arc<str>,
    sessions: Arc<Mutex<LruCache<String, SharedDashboard>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(secret_key: &str) -> Self {
        Self::with_capacity(secret_key, MAX_SESSIONS)
    }

    fn with_capacity(secret_key: &str, capacity: usize) -> Self {
        Self {
            key: Arc::from(secret_key),
            sessions: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    fn sign(&self, id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(b":");
        hasher.update(id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn cookie_value(&self, id: &str) -> String {
        format!("{id}.{}", self.sign(id))
    }

    /// Session id carried by a cookie value, if its signature checks out.
    fn verify(&self, value: &str) -> Option<String> {
        let (id, signature) = value.split_once('.')?;
        if id.len() != ID_LEN || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        (self.sign(id) == signature).then(|| id.to_string())
    }

    /// Find the session of the requesting browser, or start a new one.
    pub fn attach(&self, headers: &HeaderMap) -> Session {
        let known = session_cookie(headers).and_then(|value| self.verify(value));

        let (id, set_cookie) = match known {
            Some(id) => (id, None),
            None => {
                let id = format!("{:032x}", rand::random::<u128>());
                debug!("starting session {}", &id[..8]);
                let cookie = format!(
                    "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
                    self.cookie_value(&id)
                );
                (id, Some(cookie))
            }
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let dashboard = Arc::clone(sessions.get_or_insert(id, || {
            Arc::new(tokio::sync::Mutex::new(Dashboard::new()))
        }));

        Session {
            dashboard,
            set_cookie,
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}
