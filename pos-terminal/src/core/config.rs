//! Terminal engine configuration

use crate::catalog::DEFAULT_CACHE_TTL_MS;
use crate::queue::DEFAULT_RETENTION_MS;
use std::path::PathBuf;

/// Engine configuration
///
/// # Environment variables
///
/// All settings can be overridden through environment variables:
///
/// | Variable | Default | Purpose |
/// |----------|---------|---------|
/// | POS_STATE_PATH | ./pos-terminal.redb | Durable state database file |
/// | POS_REMOTE_URL | http://localhost:3000 | Remote entity store base URL |
/// | POS_CACHE_TTL_MS | 3600000 | Reference cache time-to-live |
/// | POS_QUEUE_RETENTION_MS | 604800000 | Processed-transaction retention |
/// | POS_LOG_LEVEL | info | tracing subscriber level |
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Path of the redb state file
    pub state_path: PathBuf,
    /// Base URL of the remote entity store
    pub remote_base_url: String,
    /// Reference cache TTL (milliseconds)
    pub cache_ttl_ms: i64,
    /// How long processed queue entries are retained (milliseconds)
    pub queue_retention_ms: i64,
    /// tracing level: trace | debug | info | warn | error
    pub log_level: String,
}

impl TerminalConfig {
    /// Load configuration from environment variables, with defaults
    pub fn from_env() -> Self {
        Self {
            state_path: std::env::var("POS_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./pos-terminal.redb")),
            remote_base_url: std::env::var("POS_REMOTE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cache_ttl_ms: std::env::var("POS_CACHE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CACHE_TTL_MS),
            queue_retention_ms: std::env::var("POS_QUEUE_RETENTION_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_MS),
            log_level: std::env::var("POS_LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("./pos-terminal.redb"),
            remote_base_url: "http://localhost:3000".into(),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            queue_retention_ms: DEFAULT_RETENTION_MS,
            log_level: "info".into(),
        }
    }
}
