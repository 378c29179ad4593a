//! Engine config: request timeout, attachment limit, matching window, feed buffer. Loaded from env.

use std::env;
use std::time::Duration;

use anyhow::Result;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_MATCH_WINDOW_SECS: u64 = 120;
const DEFAULT_FEED_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// CHAT_REQUEST_TIMEOUT_MS: fetch/insert/update/count/upload fail after this long
    pub request_timeout: Duration,
    /// CHAT_MAX_ATTACHMENT_BYTES: payloads above this are rejected before upload
    pub max_attachment_bytes: u64,
    /// CHAT_MATCH_WINDOW_SECS: max distance between a pending send and its committed echo
    pub match_window: Duration,
    /// CHAT_FEED_BUFFER: per-subscription event buffer
    pub feed_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            match_window: Duration::from_secs(DEFAULT_MATCH_WINDOW_SECS),
            feed_buffer: DEFAULT_FEED_BUFFER,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl SyncConfig {
    /// Load from environment variables; unset or unparsable values fall back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            request_timeout: env_parse("CHAT_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            max_attachment_bytes: env_parse("CHAT_MAX_ATTACHMENT_BYTES")
                .unwrap_or(defaults.max_attachment_bytes),
            match_window: env_parse("CHAT_MATCH_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.match_window),
            feed_buffer: env_parse("CHAT_FEED_BUFFER").unwrap_or(defaults.feed_buffer),
        })
    }

    /// Validate config. Call after from_env() to fail fast before building components.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            anyhow::bail!("CHAT_REQUEST_TIMEOUT_MS must be greater than 0");
        }
        if self.max_attachment_bytes == 0 {
            anyhow::bail!("CHAT_MAX_ATTACHMENT_BYTES must be greater than 0");
        }
        if self.feed_buffer == 0 {
            anyhow::bail!("CHAT_FEED_BUFFER must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "CHAT_REQUEST_TIMEOUT_MS",
        "CHAT_MAX_ATTACHMENT_BYTES",
        "CHAT_MATCH_WINDOW_SECS",
        "CHAT_FEED_BUFFER",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_load_config_with_defaults() {
        clear();

        let config = SyncConfig::from_env().unwrap();

        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_attachment_bytes, 20 * 1024 * 1024);
        assert_eq!(config.match_window, Duration::from_secs(120));
        assert_eq!(config.feed_buffer, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_config_with_custom_values() {
        clear();
        env::set_var("CHAT_REQUEST_TIMEOUT_MS", "250");
        env::set_var("CHAT_MAX_ATTACHMENT_BYTES", "1024");
        env::set_var("CHAT_MATCH_WINDOW_SECS", "5");
        env::set_var("CHAT_FEED_BUFFER", "8");

        let config = SyncConfig::from_env().unwrap();
        clear();

        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.max_attachment_bytes, 1024);
        assert_eq!(config.match_window, Duration::from_secs(5));
        assert_eq!(config.feed_buffer, 8);
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back_and_zero_fails_validation() {
        clear();
        env::set_var("CHAT_REQUEST_TIMEOUT_MS", "soon");
        env::set_var("CHAT_FEED_BUFFER", "0");

        let config = SyncConfig::from_env().unwrap();
        clear();

        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.feed_buffer, 0);
        assert!(config.validate().is_err());
    }
}
