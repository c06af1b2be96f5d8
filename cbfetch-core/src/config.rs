//! Fetcher configuration.
//!
//! A plain value handed to [`Fetcher`](crate::data::fetcher::Fetcher) and
//! [`CandleCache`](crate::data::cache::CandleCache) constructors. Sources, in
//! priority order: programmatic override, TOML file, `CBFETCH_CACHE_DIR`, and
//! finally a platform cache directory.

use crate::data::coinbase::DEFAULT_BASE_URL;
use crate::data::retry::{duration_millis, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the cache directory.
pub const CACHE_DIR_ENV: &str = "CBFETCH_CACHE_DIR";

/// Coinbase allows 10 public requests per second.
pub const PUBLIC_REQUESTS_PER_SECOND: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub cache_dir: PathBuf,
    pub base_url: String,
    /// Minimum pause between consecutive candle requests.
    #[serde(with = "duration_millis")]
    pub request_delay: Duration,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_delay: Duration::from_millis(1_000 / PUBLIC_REQUESTS_PER_SECOND),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetcherConfig {
    /// Defaults with the cache directory taken from `CBFETCH_CACHE_DIR` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_cache_dir() {
            config.cache_dir = dir;
        }
        config
    }

    /// Load a TOML config file. Missing keys fall back to [`FetcherConfig::from_env`].
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("read config file: {e}"))?;
        Self::from_toml(&content)
    }

    /// Parse a TOML string. An explicit `cache_dir` beats the environment.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        let value: toml::Value =
            toml::from_str(content).map_err(|e| format!("parse config TOML: {e}"))?;
        let has_cache_dir = value
            .as_table()
            .is_some_and(|t| t.contains_key("cache_dir"));
        let mut config: Self = value
            .try_into()
            .map_err(|e| format!("invalid config: {e}"))?;
        if !has_cache_dir {
            if let Some(dir) = env_cache_dir() {
                config.cache_dir = dir;
            }
        }
        Ok(config)
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn env_cache_dir() -> Option<PathBuf> {
    std::env::var_os(CACHE_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `{platform cache dir}/cbfetch`, or the temp dir when the platform has none.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cbfetch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_matches_public_rate_limit() {
        let config = FetcherConfig::default();
        assert_eq!(config.request_delay, Duration::from_millis(100));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.cache_dir.ends_with("cbfetch"));
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = FetcherConfig::from_toml(
            r#"
            cache_dir = "/tmp/cbfetch-test"
            request_delay = 250

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cbfetch-test"));
        assert_eq!(config.request_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_backoff, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_toml_is_reported() {
        let err = FetcherConfig::from_toml("request_delay = \"soon\"").unwrap_err();
        assert!(err.contains("invalid config"), "{err}");
    }

    #[test]
    fn builder_methods_override() {
        let config = FetcherConfig::default()
            .with_cache_dir("/var/tmp/x")
            .with_request_delay(Duration::ZERO)
            .with_retry(RetryPolicy::immediate(1));
        assert_eq!(config.cache_dir, PathBuf::from("/var/tmp/x"));
        assert_eq!(config.request_delay, Duration::ZERO);
        assert_eq!(config.retry.max_attempts, 1);
    }
}
