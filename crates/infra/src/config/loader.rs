//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required ones are missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `CALSYNC_DB_PATH`: Database file path
//! - `CALSYNC_GOOGLE_CLIENT_ID`: OAuth client id
//! - `CALSYNC_GOOGLE_CLIENT_SECRET`: OAuth client secret
//!
//! Optional (defaults apply when unset):
//! - `CALSYNC_DB_POOL_SIZE`
//! - `CALSYNC_GOOGLE_API_BASE_URL`, `CALSYNC_GOOGLE_TOKEN_URL`,
//!   `CALSYNC_GOOGLE_CALENDAR_ID`
//! - `CALSYNC_SYNC_ENABLED`, `CALSYNC_SYNC_CRON`, `CALSYNC_SYNC_USERS`
//!   (comma separated)
//! - `CALSYNC_SYNC_LOOKBACK_DAYS`, `CALSYNC_SYNC_LOOKAHEAD_DAYS`
//! - `CALSYNC_SYNC_FAILURE_THRESHOLD`, `CALSYNC_SYNC_MAX_CONCURRENCY`
//! - `CALSYNC_LOG_LEVEL`, `CALSYNC_LOG_JSON`
//!
//! ## File Locations
//! The loader probes `config.{json,toml}` and `calsync.{json,toml}` in the
//! current directory, its two parents, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calsync_domain::{CalSyncError, Config, Result};

const CONFIG_FILE_NAMES: [&str; 4] = ["config.json", "config.toml", "calsync.json", "calsync.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `CalSyncError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `CALSYNC_*` environment variables
///
/// # Errors
/// Returns `CalSyncError::Config` if a required variable is missing or a
/// value does not parse.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("CALSYNC_DB_PATH")?;
    config.google.client_id = env_var("CALSYNC_GOOGLE_CLIENT_ID")?;
    config.google.client_secret = env_var("CALSYNC_GOOGLE_CLIENT_SECRET")?;

    if let Some(pool_size) = env_parse("CALSYNC_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }
    if let Some(url) = env_opt("CALSYNC_GOOGLE_API_BASE_URL") {
        config.google.api_base_url = url;
    }
    if let Some(url) = env_opt("CALSYNC_GOOGLE_TOKEN_URL") {
        config.google.token_url = url;
    }
    if let Some(calendar_id) = env_opt("CALSYNC_GOOGLE_CALENDAR_ID") {
        config.google.calendar_id = calendar_id;
    }

    config.sync.enabled = env_bool("CALSYNC_SYNC_ENABLED", config.sync.enabled);
    if let Some(cron) = env_opt("CALSYNC_SYNC_CRON") {
        config.sync.cron_expression = cron;
    }
    if let Some(users) = env_opt("CALSYNC_SYNC_USERS") {
        config.sync.user_ids = users
            .split(',')
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_owned)
            .collect();
    }
    if let Some(days) = env_parse("CALSYNC_SYNC_LOOKBACK_DAYS")? {
        config.sync.lookback_days = days;
    }
    if let Some(days) = env_parse("CALSYNC_SYNC_LOOKAHEAD_DAYS")? {
        config.sync.lookahead_days = days;
    }
    if let Some(threshold) = env_parse("CALSYNC_SYNC_FAILURE_THRESHOLD")? {
        config.sync.failure_threshold = threshold;
    }
    if let Some(concurrency) = env_parse("CALSYNC_SYNC_MAX_CONCURRENCY")? {
        config.sync.max_concurrency = concurrency;
    }

    if let Some(level) = env_opt("CALSYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("CALSYNC_LOG_JSON", config.logging.json);

    validate(&config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. The format is picked
/// by file extension.
///
/// # Errors
/// Returns `CalSyncError::Config` if the file is missing, unreadable, or
/// invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalSyncError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    validate(&config)?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CalSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Reject values the engine cannot run with.
///
/// # Errors
/// Returns `CalSyncError::Config` naming the offending field.
pub fn validate(config: &Config) -> Result<()> {
    if config.database.path.trim().is_empty() {
        return Err(CalSyncError::Config("database.path must not be empty".into()));
    }
    if config.database.pool_size == 0 {
        return Err(CalSyncError::Config("database.pool_size must be at least 1".into()));
    }
    if config.sync.failure_threshold == 0 {
        return Err(CalSyncError::Config("sync.failure_threshold must be at least 1".into()));
    }
    if config.sync.lookback_days < 0 || config.sync.lookahead_days < 0 {
        return Err(CalSyncError::Config("sync lookback/lookahead days must not be negative".into()));
    }
    if config.sync.enabled && config.sync.cron_expression.trim().is_empty() {
        return Err(CalSyncError::Config("sync.cron_expression must be set when sync is enabled".into()));
    }
    if config.google.max_attempts == 0 {
        return Err(CalSyncError::Config("google.max_attempts must be at least 1".into()));
    }
    Ok(())
}

/// First existing config file in the standard locations, if any.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| CalSyncError::Config(format!("Missing required environment variable: {key}")))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CalSyncError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
