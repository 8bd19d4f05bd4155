//! Startup configuration.
//!
//! Everything is read and validated once at boot into an immutable
//! [`AppConfig`]; the rest of the program only ever borrows it.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::FeedType;
use crate::errors::ConfigError;

/// Map tile token. Optional.
pub const MAPBOX_TOKEN_VAR: &str = "MAPBOX_ACCESS_TOKEN";
/// Session signing key. Optional, falls back to [`DEFAULT_SECRET_KEY`].
pub const SECRET_KEY_VAR: &str = "SECRET_KEY";
/// Charting service account. Required.
pub const CHART_USERNAME_VAR: &str = "PLOTLY_USERNAME";
/// Charting service key. Required.
pub const CHART_API_KEY_VAR: &str = "PLOTLY_API_KEY";

pub const DEFAULT_SECRET_KEY: &str = "default-secret-key";

/// Which feed the dashboard shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedMode {
    /// Events query driven by the date-range picker
    #[default]
    Ranged,
    /// Fixed summary feed, loaded once per page view
    Static,
}

impl FeedMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ranged => "ranged",
            Self::Static => "static",
        }
    }
}

impl std::str::FromStr for FeedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ranged" => Ok(Self::Ranged),
            "static" => Ok(Self::Static),
            _ => Err(format!("unknown mode: {s} (expected: ranged, static)")),
        }
    }
}

/// Secrets and tokens from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub mapbox_token: Option<String>,
    pub secret_key: String,
    pub chart_username: String,
    pub chart_api_key: String,
}

impl Credentials {
    /// Read credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if a required credential is absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`. Blank values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if a required credential is absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let chart_username = get(CHART_USERNAME_VAR).ok_or(ConfigError::Missing(CHART_USERNAME_VAR))?;
        let chart_api_key = get(CHART_API_KEY_VAR).ok_or(ConfigError::Missing(CHART_API_KEY_VAR))?;

        let mapbox_token = get(MAPBOX_TOKEN_VAR);
        if mapbox_token.is_none() {
            warn!("{} not set, falling back to keyless map tiles", MAPBOX_TOKEN_VAR);
        }

        let secret_key = get(SECRET_KEY_VAR).unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string());

        Ok(Self {
            mapbox_token,
            secret_key,
            chart_username,
            chart_api_key,
        })
    }

    #[must_use]
    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == DEFAULT_SECRET_KEY
    }

    /// The charting API key with all but its last 4 characters hidden.
    #[must_use]
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.chart_api_key.chars().collect();
        let visible = chars.len().saturating_sub(4);
        chars
            .iter()
            .enumerate()
            .map(|(i, c)| if i < visible { '*' } else { *c })
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mapbox_token", &self.mapbox_token.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &"<redacted>")
            .field("chart_username", &self.chart_username)
            .field("chart_api_key", &"<redacted>")
            .finish()
    }
}

/// Load a `.env` file from the working directory, if there is one.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("no .env file found"),
        Err(e) => warn!("failed to read .env file: {}", e),
    }
}

/// Validated, read-only server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mode: FeedMode,
    pub summary: FeedType,
    pub base_url: String,
    pub cache_ttl: Duration,
    pub debug: bool,
    pub credentials: Credentials,
}

impl AppConfig {
    /// Check the parts that cannot be expressed in types.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a non-HTTP upstream base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "base-url",
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        Ok(())
    }

    /// Address to bind, `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
