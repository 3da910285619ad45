//! Configuration structures
//!
//! Every section has a `Default` so partial TOML/JSON files and sparse
//! environments still produce a usable configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALENDAR_ID, DEFAULT_FAILURE_THRESHOLD, DEFAULT_JOB_TIMEOUT_SECS,
    DEFAULT_LOOKAHEAD_DAYS, DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_REFRESH_WINDOW_SECS, DEFAULT_REMOTE_BASE_BACKOFF_MS, DEFAULT_REMOTE_MAX_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SYNC_CRON, GOOGLE_CALENDAR_API_BASE, GOOGLE_TOKEN_URL,
    MAX_CONCURRENCY,
};

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// SQLite storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "calsync.db".into(), pool_size: 4 }
    }
}

/// Google Calendar client settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: String,
    pub token_url: String,
    pub calendar_id: String,
    pub request_timeout_secs: u64,
    /// Total attempts (initial try included) for 5xx and network failures.
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base_url: GOOGLE_CALENDAR_API_BASE.into(),
            token_url: GOOGLE_TOKEN_URL.into(),
            calendar_id: DEFAULT_CALENDAR_ID.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_REMOTE_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_REMOTE_BASE_BACKOFF_MS,
        }
    }
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("token_url", &self.token_url)
            .field("calendar_id", &self.calendar_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff_ms", &self.base_backoff_ms)
            .finish()
    }
}

/// Sync engine policy and automatic scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub cron_expression: String,
    /// Users synced by the automatic scheduler.
    pub user_ids: Vec<String>,
    pub lookback_days: i64,
    pub lookahead_days: i64,
    /// Error count at which a run is finalized as `failed` instead of `partial`.
    pub failure_threshold: usize,
    pub max_concurrency: usize,
    pub refresh_window_secs: u64,
    pub job_timeout_secs: u64,
}

impl SyncConfig {
    /// Worker pool size clamped to the supported range.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_expression: DEFAULT_SYNC_CRON.into(),
            user_ids: Vec::new(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            refresh_window_secs: DEFAULT_REFRESH_WINDOW_SECS,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), json: false }
    }
}
