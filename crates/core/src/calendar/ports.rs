//! Port interfaces for calendar synchronization
//!
//! These traits define the boundaries between the sync engine and its
//! infrastructure: the local event store, the audit log, the credential store,
//! the OAuth refresh endpoint and the remote calendar service.

use async_trait::async_trait;
use calsync_domain::{
    AccessToken, CalSyncError, CalendarEvent, Credentials, DateRange, RemoteEvent, Result,
    SyncLogEntry,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Persistence for local calendar rows, keyed by local id
#[async_trait]
pub trait CalendarEventRepository: Send + Sync {
    /// Insert a new row.
    async fn insert(&self, event: &CalendarEvent) -> Result<()>;

    /// Overwrite an existing row. Returns `NotFound` when the id is unknown.
    async fn update(&self, event: &CalendarEvent) -> Result<()>;

    /// Hard-delete a row. Deleting an unknown id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<CalendarEvent>>;

    /// Rows for `user_id` whose start time falls inside `range`.
    async fn list_in_range(&self, user_id: &str, range: &DateRange) -> Result<Vec<CalendarEvent>>;

    /// Rows for `user_id` linked to any of the given remote ids.
    async fn find_by_remote_ids(
        &self,
        user_id: &str,
        remote_ids: &[String],
    ) -> Result<Vec<CalendarEvent>>;

    /// Rows starting inside `range` that wait for the push phase: `local`,
    /// `sync_failed` and `deleted`.
    async fn list_pending_push(&self, user_id: &str, range: &DateRange) -> Result<Vec<CalendarEvent>>;
}

/// Append-only audit trail of sync runs
#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    async fn insert(&self, entry: &SyncLogEntry) -> Result<()>;

    /// Persist the final state of an entry created by [`Self::insert`].
    async fn finalize(&self, entry: &SyncLogEntry) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<SyncLogEntry>>;

    /// Entries started within `[from, to]`, newest first.
    async fn list_for_user(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SyncLogEntry>>;

    async fn latest_for_user(&self, user_id: &str) -> Result<Option<SyncLogEntry>>;
}

/// Storage for per-user OAuth credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Credentials>>;

    /// Insert or replace the credentials for `credentials.user_id()`.
    async fn put(&self, credentials: &Credentials) -> Result<()>;
}

/// New token material returned by the provider's refresh endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present only when the provider rotates the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in_secs: i64,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in_secs", &self.expires_in_secs)
            .finish_non_exhaustive()
    }
}

/// Refresh failures. The credential manager reports all of them as
/// `ReconnectRequired`, the variants only shape the log message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("refresh token rejected: {0}")]
    Rejected(String),

    #[error("token endpoint unavailable: {0}")]
    Unavailable(String),
}

/// OAuth token endpoint
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> std::result::Result<RefreshedToken, RefreshError>;
}

/// Remote adapter error taxonomy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// 401: the access token was rejected.
    #[error("remote rejected the access token")]
    Auth,

    /// 403: the grant lacks the required scope.
    #[error("insufficient permission: {0}")]
    Permission(String),

    /// 5xx or network failure after the retry budget was spent.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Any other non-success status, with the provider's message.
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },
}

impl From<RemoteError> for CalSyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Auth => Self::Auth("remote rejected the access token".into()),
            RemoteError::Permission(message) => Self::ReconnectRequired(message),
            RemoteError::Transient(message) => Self::Transient(message),
            RemoteError::Provider { status, message } => {
                Self::Remote(format!("status {status}: {message}"))
            }
        }
    }
}

/// Result of a remote delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// 410: the object was already removed remotely.
    AlreadyGone,
}

/// Typed operations against the remote calendar service
#[async_trait]
pub trait RemoteCalendar: Send + Sync {
    async fn list_events(
        &self,
        token: &AccessToken,
        range: &DateRange,
    ) -> std::result::Result<Vec<RemoteEvent>, RemoteError>;

    /// Create the event remotely and return its remote id.
    async fn create_event(
        &self,
        token: &AccessToken,
        event: &CalendarEvent,
    ) -> std::result::Result<String, RemoteError>;

    async fn update_event(
        &self,
        token: &AccessToken,
        remote_id: &str,
        event: &CalendarEvent,
    ) -> std::result::Result<(), RemoteError>;

    async fn delete_event(
        &self,
        token: &AccessToken,
        remote_id: &str,
    ) -> std::result::Result<DeleteOutcome, RemoteError>;
}
