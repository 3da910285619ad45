//! Application constants
//!
//! Centralized location for domain-level constants used throughout the sync
//! engine.

// Credential lifecycle
pub const DEFAULT_REFRESH_WINDOW_SECS: u64 = 300;

// Run finalization policy
pub const DEFAULT_FAILURE_THRESHOLD: usize = 5;

// Bounded worker pool within a single sync phase
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY: usize = 8;

// Remote adapter retry budget
pub const DEFAULT_REMOTE_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_REMOTE_BASE_BACKOFF_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Google Calendar endpoints
pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_CALENDAR_ID: &str = "primary";

// Event defaults
pub const UNTITLED_EVENT_TITLE: &str = "Untitled";
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const TASK_TITLE_PREFIX: &str = "📋 ";
pub const DEFAULT_TASK_DUE_HOUR: u32 = 21;
pub const DEFAULT_TASK_DURATION_MINUTES: u32 = 30;

// Automatic sync
pub const DEFAULT_SYNC_CRON: &str = "0 */15 * * * *";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 30;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;

// Broadcast buffer for sync status notifications
pub const STATUS_CHANNEL_CAPACITY: usize = 256;
