//! Application configuration loaded from environment variables.
//!
//! Credentials **must** be provided via environment variables:
//! - `MARKETFEED_API_KEY`: API key sent in the WebSocket login frame
//!
//! Optional overrides:
//! - `MARKETFEED_WEBSOCKET_URL`: streaming endpoint
//! - `MARKETFEED_REST_URL`: REST backend for historical candles and search
//! - `MARKETFEED_AUTH_TIMEOUT_MS`, `MARKETFEED_HEARTBEAT_TIMEOUT_MS`,
//!   `MARKETFEED_RECONNECT_BASE_MS`, `MARKETFEED_MAX_RECONNECT_ATTEMPTS`,
//!   `MARKETFEED_DEFAULT_INTERVAL_MS`: connection tunables

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::error::FeedError;

/// Default streaming endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://stream.marketfeed.dev/v1";

/// How long to wait for a login acknowledgement before assuming success.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum silence between heartbeats before the connection is considered dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before the first reconnect attempt; doubles on every further attempt.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Reconnect attempts allowed before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Candle interval used for symbols without an explicit one.
pub const DEFAULT_INTERVAL_MS: u64 = 60_000;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed: ClientConfig,
    pub rest_url: Option<String>,
}

/// Settings for a single [`MarketDataClient`](crate::MarketDataClient).
#[derive(Clone)]
pub struct ClientConfig {
    pub websocket_url: String,
    pub api_key: Zeroizing<String>,
    pub auth_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub default_interval_ms: u64,
}

impl ClientConfig {
    /// Creates a config with default tunables.
    #[must_use]
    pub fn new(websocket_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            websocket_url: websocket_url.into(),
            api_key: Zeroizing::new(api_key.into()),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            default_interval_ms: DEFAULT_INTERVAL_MS,
        }
    }

    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    #[must_use]
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn default_interval_ms(mut self, interval_ms: u64) -> Self {
        self.default_interval_ms = interval_ms;
        self
    }

    /// Backoff before reconnect attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.reconnect_base_delay.saturating_mul(1 << exponent)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("websocket_url", &self.websocket_url)
            .field("api_key", &"<redacted>")
            .field("auth_timeout", &self.auth_timeout)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("reconnect_base_delay", &self.reconnect_base_delay)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("default_interval_ms", &self.default_interval_ms)
            .finish()
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`FeedError::Config`] if `MARKETFEED_API_KEY` is missing or a
/// numeric tunable cannot be parsed.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("MARKETFEED_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());

    let api_key = non_empty_var("MARKETFEED_API_KEY")
        .ok_or_else(|| FeedError::Config("MARKETFEED_API_KEY is not set".to_string()))?;

    let mut feed = ClientConfig::new(websocket_url, api_key);

    if let Some(ms) = parsed_var::<u64>("MARKETFEED_AUTH_TIMEOUT_MS")? {
        feed.auth_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed_var::<u64>("MARKETFEED_HEARTBEAT_TIMEOUT_MS")? {
        feed.heartbeat_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed_var::<u64>("MARKETFEED_RECONNECT_BASE_MS")? {
        feed.reconnect_base_delay = Duration::from_millis(ms);
    }
    if let Some(attempts) = parsed_var::<u32>("MARKETFEED_MAX_RECONNECT_ATTEMPTS")? {
        feed.max_reconnect_attempts = attempts;
    }
    if let Some(interval) = parsed_var::<u64>("MARKETFEED_DEFAULT_INTERVAL_MS")? {
        if interval == 0 {
            return Err(FeedError::Config(
                "MARKETFEED_DEFAULT_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        feed.default_interval_ms = interval;
    }

    Ok(AppConfig {
        feed,
        rest_url: non_empty_var("MARKETFEED_REST_URL"),
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Parses a non-empty environment variable, failing on unparseable values.
fn parsed_var<T: FromStr>(name: &str) -> crate::Result<Option<T>> {
    non_empty_var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| FeedError::Config(format!("{name} is not a valid number: {raw}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 8] = [
        "MARKETFEED_WEBSOCKET_URL",
        "MARKETFEED_API_KEY",
        "MARKETFEED_REST_URL",
        "MARKETFEED_AUTH_TIMEOUT_MS",
        "MARKETFEED_HEARTBEAT_TIMEOUT_MS",
        "MARKETFEED_RECONNECT_BASE_MS",
        "MARKETFEED_MAX_RECONNECT_ATTEMPTS",
        "MARKETFEED_DEFAULT_INTERVAL_MS",
    ];

    /// Serializes tests that touch the process environment.
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    /// Helper that temporarily sets env vars, runs `f`, then restores originals.
    ///
    /// Variables not listed in `vars` are cleared for the duration of `f`.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let _guard = ENV_LOCK.lock();
        let originals: Vec<(&str, Option<String>)> = ALL_VARS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        for k in ALL_VARS {
            let value = vars.iter().find(|(name, _)| *name == k).and_then(|(_, v)| *v);
            // SAFETY: ENV_LOCK is held and no other code reads these variables.
            unsafe {
                match value {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: restoring original values while still holding ENV_LOCK.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_with_only_api_key() {
        with_env(&[("MARKETFEED_API_KEY", Some("test-key"))], || {
            let config = fetch_config().unwrap();
            assert_eq!(config.feed.websocket_url, DEFAULT_WEBSOCKET_URL);
            assert_eq!(config.feed.api_key.as_str(), "test-key");
            assert_eq!(config.feed.auth_timeout, DEFAULT_AUTH_TIMEOUT);
            assert_eq!(config.feed.heartbeat_timeout, DEFAULT_HEARTBEAT_TIMEOUT);
            assert_eq!(config.feed.reconnect_base_delay, DEFAULT_RECONNECT_BASE_DELAY);
            assert_eq!(config.feed.max_reconnect_attempts, 5);
            assert_eq!(config.feed.default_interval_ms, 60_000);
            assert!(config.rest_url.is_none());
        });
    }

    #[test]
    fn rejects_missing_api_key() {
        with_env(&[], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("MARKETFEED_API_KEY is not set"));
        });
    }

    #[test]
    fn empty_values_treated_as_absent() {
        with_env(
            &[
                ("MARKETFEED_API_KEY", Some("key")),
                ("MARKETFEED_WEBSOCKET_URL", Some("")),
                ("MARKETFEED_REST_URL", Some("")),
                ("MARKETFEED_MAX_RECONNECT_ATTEMPTS", Some("")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.feed.websocket_url, DEFAULT_WEBSOCKET_URL);
                assert!(config.rest_url.is_none());
                assert_eq!(config.feed.max_reconnect_attempts, 5);
            },
        );
    }

    #[test]
    fn tunables_override_defaults() {
        with_env(
            &[
                ("MARKETFEED_API_KEY", Some("key")),
                ("MARKETFEED_WEBSOCKET_URL", Some("wss://custom.example.com")),
                ("MARKETFEED_REST_URL", Some("https://api.example.com")),
                ("MARKETFEED_AUTH_TIMEOUT_MS", Some("500")),
                ("MARKETFEED_HEARTBEAT_TIMEOUT_MS", Some("10000")),
                ("MARKETFEED_RECONNECT_BASE_MS", Some("250")),
                ("MARKETFEED_MAX_RECONNECT_ATTEMPTS", Some("8")),
                ("MARKETFEED_DEFAULT_INTERVAL_MS", Some("300000")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.feed.websocket_url, "wss://custom.example.com");
                assert_eq!(config.rest_url.as_deref(), Some("https://api.example.com"));
                assert_eq!(config.feed.auth_timeout, Duration::from_millis(500));
                assert_eq!(config.feed.heartbeat_timeout, Duration::from_secs(10));
                assert_eq!(config.feed.reconnect_base_delay, Duration::from_millis(250));
                assert_eq!(config.feed.max_reconnect_attempts, 8);
                assert_eq!(config.feed.default_interval_ms, 300_000);
            },
        );
    }

    #[test]
    fn rejects_non_numeric_tunable() {
        with_env(
            &[
                ("MARKETFEED_API_KEY", Some("key")),
                ("MARKETFEED_HEARTBEAT_TIMEOUT_MS", Some("soon")),
            ],
            || {
                let err = fetch_config().unwrap_err();
                assert!(err.to_string().contains("MARKETFEED_HEARTBEAT_TIMEOUT_MS"));
            },
        );
    }

    #[test]
    fn rejects_zero_default_interval() {
        with_env(
            &[
                ("MARKETFEED_API_KEY", Some("key")),
                ("MARKETFEED_DEFAULT_INTERVAL_MS", Some("0")),
            ],
            || {
                assert!(fetch_config().is_err());
            },
        );
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = ClientConfig::new("ws://localhost", "key")
            .reconnect_base_delay(Duration::from_millis(2000));
        let delays: Vec<u128> = (1..=5)
            .map(|attempt| config.backoff_delay(attempt).as_millis())
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 32000]);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ClientConfig::new("ws://localhost", "super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
