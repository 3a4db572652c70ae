//! Centralized configuration for the Abyss data layer.
//!
//! Constants for network behavior and feed caching live on unit structs, the
//! same way the rest of the workspace groups tunables. Runtime settings that
//! vary per deployment (upstream origin, build profile) are read from the
//! environment by [`ClientSettings::from_env`].

use crate::{AbyssError, Result};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const RETRY_DELAY: Duration = Duration::from_secs(1);
    pub const USER_AGENT: &'static str = concat!("abyss/", env!("CARGO_PKG_VERSION"));
    /// Origin the development proxy listens on when no base URL is configured.
    pub const DEV_PROXY_ORIGIN: &'static str = "http://localhost:8080";
    /// Local store key holding the session bearer token.
    pub const AUTH_TOKEN_KEY: &'static str = "auth_token";
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_ACCEPT: &'static str = "application/vnd.github.v3+json";
    pub const RATE_LIMIT_WARN_THRESHOLD: i64 = 5;
}

/// Feed cache configuration.
pub struct FeedConfig;

impl FeedConfig {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
    pub const ROADMAP_CACHE_KEY: &'static str = "from_abyss_roadmap_cache";
    pub const STORE_DIR_NAME: &'static str = "abyss";
}

/// Environment variable names read by [`ClientSettings::from_env`].
pub struct EnvVars;

impl EnvVars {
    pub const API_BASE_URL: &'static str = "ABYSS_API_BASE_URL";
    pub const API_URL: &'static str = "ABYSS_API_URL";
    pub const PROFILE: &'static str = "ABYSS_PROFILE";
    pub const REQUEST_TIMEOUT_MS: &'static str = "ABYSS_REQUEST_TIMEOUT_MS";
}

/// Build profile the client runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildProfile {
    Development,
    Production,
}

impl BuildProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildProfile::Development => "development",
            BuildProfile::Production => "production",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(BuildProfile::Development),
            "production" | "prod" => Some(BuildProfile::Production),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, BuildProfile::Production)
    }
}

impl Default for BuildProfile {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            BuildProfile::Development
        } else {
            BuildProfile::Production
        }
    }
}

impl std::fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deployment settings for an [`ApiClient`](crate::network::ApiClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Upstream origin, without a trailing slash.
    pub base_url: String,
    pub profile: BuildProfile,
    /// Timeout applied when a call does not specify one.
    pub default_timeout: Duration,
}

impl ClientSettings {
    /// Settings for an explicit origin.
    pub fn new(base_url: impl Into<String>, profile: BuildProfile) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            profile,
            default_timeout: NetworkConfig::REQUEST_TIMEOUT,
        }
    }

    /// Development settings pointing at the local proxy.
    pub fn development() -> Self {
        Self::new(NetworkConfig::DEV_PROXY_ORIGIN, BuildProfile::Development)
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.default_timeout = timeout;
        }
        self
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// `ABYSS_API_BASE_URL` wins over `ABYSS_API_URL`. Production builds must
    /// name an origin; development builds fall back to the proxy origin.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let profile = match lookup(EnvVars::PROFILE) {
            Some(raw) => BuildProfile::from_str(&raw).ok_or_else(|| AbyssError::Config {
                message: format!("Unknown build profile '{}'", raw),
            })?,
            None => BuildProfile::default(),
        };

        let configured = lookup(EnvVars::API_BASE_URL)
            .or_else(|| lookup(EnvVars::API_URL))
            .filter(|value| !value.trim().is_empty());

        let base_url = match configured {
            Some(raw) => {
                let normalized = normalize_base_url(&raw);
                url::Url::parse(&normalized).map_err(|e| AbyssError::Config {
                    message: format!("Invalid API base URL '{}': {}", raw, e),
                })?;
                normalized
            }
            None if profile.is_production() => {
                return Err(AbyssError::Config {
                    message: format!(
                        "{} must be set for production builds",
                        EnvVars::API_BASE_URL
                    ),
                });
            }
            None => NetworkConfig::DEV_PROXY_ORIGIN.to_string(),
        };

        let mut settings = Self::new(base_url, profile);
        if let Some(raw) = lookup(EnvVars::REQUEST_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| AbyssError::Config {
                message: format!("Invalid {} '{}'", EnvVars::REQUEST_TIMEOUT_MS, raw),
            })?;
            settings = settings.with_default_timeout(Duration::from_millis(millis));
        }
        Ok(settings)
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
