//! Time-bounded in-memory cache for feed response bodies.
//!
//! Keyed by request URL. Only bodies that decoded successfully are stored, so
//! an upstream hiccup is never replayed from cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(500);

/// Upper bound on cached URLs. Each distinct date range is one entry.
const MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone)]
struct CachedBody {
    body: Arc<str>,
    stored_at: Instant,
}

/// Shared TTL cache. Cloning shares the underlying storage.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<Mutex<LruCache<String, CachedBody>>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a cache whose entries expire after `ttl`. A zero TTL disables it.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            ))),
            ttl,
        }
    }

    /// Whether the cache stores anything at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Look up a fresh body for `url`.
    pub fn get(&self, url: &str) -> Option<Arc<str>> {
        self.get_at(url, Instant::now())
    }

    fn get_at(&self, url: &str, now: Instant) -> Option<Arc<str>> {
        if !self.is_enabled() {
            return None;
        }

        let mut entries = self.entries.lock().ok()?;
        let found = entries
            .get(url)
            .map(|entry| (now.duration_since(entry.stored_at) < self.ttl, Arc::clone(&entry.body)));

        match found {
            Some((true, body)) => {
                debug!("response cache hit for {}", url);
                Some(body)
            }
            Some((false, _)) => {
                debug!("response cache entry expired for {}", url);
                entries.pop(url);
                None
            }
            None => {
                debug!("response cache miss for {}", url);
                None
            }
        }
    }

    /// Store a body for `url`.
    pub fn put(&self, url: &str, body: Arc<str>) {
        self.put_at(url, body, Instant::now());
    }

    fn put_at(&self, url: &str, body: Arc<str>, now: Instant) {
        if !self.is_enabled() {
            return;
        }

        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        if let Some((evicted, _)) = entries.push(url.to_string(), CachedBody { body, stored_at: now })
            && evicted != url
        {
            debug!("response cache evicted {}", evicted);
        }
    }

    /// Number of stored entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
