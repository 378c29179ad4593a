//! CLI config: database, log file and blob directory, plus the engine's [`SyncConfig`].

use std::env;

use anyhow::{Context, Result};
use chat_sync::SyncConfig;

const DEFAULT_DATABASE_URL: &str = "sqlite://chat.db";
const DEFAULT_LOG_FILE: &str = "logs/chat.log";
const DEFAULT_BLOB_DIR: &str = "./blobs";

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// DATABASE_URL
    pub database_url: String,
    /// LOG_FILE
    pub log_file: String,
    /// BLOB_DIR: where the local blob store writes attachments
    pub blob_dir: String,
    pub sync: SyncConfig,
}

impl CliConfig {
    /// Load from environment. Each `Some` flag value overrides its variable.
    pub fn load(
        database_url: Option<String>,
        log_file: Option<String>,
        blob_dir: Option<String>,
    ) -> Result<Self> {
        let sync = SyncConfig::from_env().context("Load engine config (CHAT_* variables)")?;
        sync.validate()?;

        Ok(Self {
            database_url: database_url
                .or_else(|| env::var("DATABASE_URL").ok())
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            log_file: log_file
                .or_else(|| env::var("LOG_FILE").ok())
                .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            blob_dir: blob_dir
                .or_else(|| env::var("BLOB_DIR").ok())
                .unwrap_or_else(|| DEFAULT_BLOB_DIR.to_string()),
            sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for var in ["DATABASE_URL", "LOG_FILE", "BLOB_DIR", "CHAT_FEED_BUFFER"] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();

        let config = CliConfig::load(None, None, None).unwrap();

        assert_eq!(config.database_url, "sqlite://chat.db");
        assert_eq!(config.log_file, "logs/chat.log");
        assert_eq!(config.blob_dir, "./blobs");
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    #[serial]
    fn test_flag_overrides_env() {
        clear();
        env::set_var("DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BLOB_DIR", "/tmp/chat-blobs");

        let from_env = CliConfig::load(None, None, None).unwrap();
        let from_flag = CliConfig::load(
            Some("sqlite::memory:".to_string()),
            None,
            Some("/tmp/flag-blobs".to_string()),
        )
        .unwrap();
        clear();

        assert_eq!(from_env.database_url, "sqlite://from-env.db");
        assert_eq!(from_env.blob_dir, "/tmp/chat-blobs");
        assert_eq!(from_flag.database_url, "sqlite::memory:");
        assert_eq!(from_flag.blob_dir, "/tmp/flag-blobs");
        assert_eq!(from_flag.log_file, "logs/chat.log");
    }

    #[test]
    #[serial]
    fn test_invalid_engine_config_fails() {
        clear();
        env::set_var("CHAT_FEED_BUFFER", "0");

        let result = CliConfig::load(None, None, None);
        clear();

        assert!(result.is_err());
    }
}
