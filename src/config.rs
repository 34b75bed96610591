//! Client configuration and per-call overrides.

use std::time::Duration;

use log::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.wavespeed.ai";
pub const API_PATH: &str = "/api/v3";

pub const ENV_API_KEY: &str = "WAVESPEED_API_KEY";
pub const ENV_BASE_URL: &str = "WAVESPEED_BASE_URL";
pub const ENV_POLL_INTERVAL: &str = "WAVESPEED_POLL_INTERVAL";
pub const ENV_TIMEOUT: &str = "WAVESPEED_TIMEOUT";

/// Immutable settings shared by every call made through one client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Bearer credential. Must be non-empty before any request is made.
    pub api_key: String,
    /// Service origin without the API path (default: `https://api.wavespeed.ai`).
    pub base_url: String,
    /// Upper bound for a single HTTP exchange (default: 10s).
    pub connection_timeout: Duration,
    /// Overall budget for one `run` call (default: 36000s).
    pub timeout: Duration,
    /// Delay between status polls (default: 1s).
    pub poll_interval: Duration,
    /// Task-level retries: full resubmissions after a transient failure (default: 0).
    pub max_retries: u32,
    /// Connection-level retries for a single exchange (default: 5).
    pub max_connection_retries: u32,
    /// Base back-off; the actual delay is `retry_interval * attempt` (default: 1s).
    pub retry_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            connection_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(36000),
            poll_interval: Duration::from_secs(1),
            max_retries: 0,
            max_connection_retries: 5,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Builds a configuration from the `WAVESPEED_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    /// Unparseable numeric values are ignored and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            config.api_key = key;
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            debug!("Using base URL from {}: {}", ENV_BASE_URL, url);
            config.base_url = url;
        }
        if let Some(poll) = lookup(ENV_POLL_INTERVAL).and_then(|v| parse_seconds(ENV_POLL_INTERVAL, &v)) {
            config.poll_interval = poll;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT).and_then(|v| parse_seconds(ENV_TIMEOUT, &v)) {
            config.timeout = timeout;
        }

        config
    }

    /// Base URL with trailing slashes removed and the API path appended.
    pub fn api_root(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), API_PATH)
    }
}

/// Parses a non-negative number of seconds, logging and discarding bad input.
pub fn parse_seconds(name: &str, value: &str) -> Option<Duration> {
    match value.trim().parse::<f64>().ok().map(Duration::try_from_secs_f64) {
        Some(Ok(duration)) => Some(duration),
        _ => {
            warn!("Ignoring invalid value for {}: {:?}", name, value);
            None
        }
    }
}

/// Per-call overrides for `Client::run`. Unset fields inherit from [`ClientConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
    pub enable_sync_mode: Option<bool>,
    pub max_retries: Option<u32>,
}

/// Settings for one `run` call, resolved once at call entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EffectiveRun {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub sync: bool,
    pub task_retries: u32,
    /// Per-exchange timeout: a short overall budget caps the connection timeout.
    pub exchange_timeout: Duration,
}

impl RunOptions {
    pub(crate) fn resolve(&self, config: &ClientConfig) -> EffectiveRun {
        let timeout = self.timeout.unwrap_or(config.timeout);
        EffectiveRun {
            timeout,
            poll_interval: self.poll_interval.unwrap_or(config.poll_interval),
            sync: self.enable_sync_mode.unwrap_or(false),
            task_retries: self.max_retries.unwrap_or(config.max_retries),
            exchange_timeout: config.connection_timeout.min(timeout),
        }
    }
}

/// Per-call overrides for `Client::upload`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    /// Overall budget for the upload; defaults to the client's overall timeout.
    pub timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_key, "");
        assert_eq!(config.base_url, "https://api.wavespeed.ai");
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.timeout, Duration::from_secs(36000));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.max_connection_retries, 5);
        assert_eq!(config.retry_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_new_sets_api_key() {
        let config = ClientConfig::new("test-key");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_api_root_trims_trailing_slash() {
        let mut config = ClientConfig::new("k");
        config.base_url = "https://custom.api.com/".to_string();
        assert_eq!(config.api_root(), "https://custom.api.com/api/v3");

        config.base_url = "https://custom.api.com".to_string();
        assert_eq!(config.api_root(), "https://custom.api.com/api/v3");
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "env-key"),
            (ENV_BASE_URL, "http://localhost:8080"),
            (ENV_POLL_INTERVAL, "0.5"),
            (ENV_TIMEOUT, "60"),
        ]));

        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_ignores_invalid_numbers() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_POLL_INTERVAL, "fast"),
            (ENV_TIMEOUT, "-3"),
        ]));

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_secs(36000));
    }

    #[test]
    fn test_from_lookup_ignores_out_of_range_seconds() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_TIMEOUT, "1e20"),
            (ENV_POLL_INTERVAL, "NaN"),
        ]));

        assert_eq!(config.timeout, Duration::from_secs(36000));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_from_lookup_without_variables_uses_defaults() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_run_options_inherit_client_defaults() {
        let mut config = ClientConfig::new("k");
        config.max_retries = 2;

        let run = RunOptions::default().resolve(&config);
        assert_eq!(run.timeout, Duration::from_secs(36000));
        assert_eq!(run.poll_interval, Duration::from_secs(1));
        assert!(!run.sync);
        assert_eq!(run.task_retries, 2);
        assert_eq!(run.exchange_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_run_options_override_client_defaults() {
        let config = ClientConfig::new("k");
        let options = RunOptions {
            timeout: Some(Duration::from_secs(30)),
            poll_interval: Some(Duration::from_millis(200)),
            enable_sync_mode: Some(true),
            max_retries: Some(4),
        };

        let run = options.resolve(&config);
        assert_eq!(run.timeout, Duration::from_secs(30));
        assert_eq!(run.poll_interval, Duration::from_millis(200));
        assert!(run.sync);
        assert_eq!(run.task_retries, 4);
    }

    #[test]
    fn test_short_timeout_caps_exchange_timeout() {
        let config = ClientConfig::new("k");
        let options = RunOptions {
            timeout: Some(Duration::from_secs(3)),
            ..RunOptions::default()
        };

        let run = options.resolve(&config);
        assert_eq!(run.exchange_timeout, Duration::from_secs(3));
    }
}
