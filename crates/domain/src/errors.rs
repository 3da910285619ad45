//! Error types used throughout the sync engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CalSync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Access token rejected; a refresh and single retry may succeed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The user has to re-authorize the calendar connection.
    #[error("Calendar reconnect required: {0}")]
    ReconnectRequired(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Network failure or 5xx that survived the retry budget.
    #[error("Transient remote error: {0}")]
    Transient(String),

    #[error("Remote calendar error: {0}")]
    Remote(String),

    #[error("Sync already in progress for user {0}")]
    AlreadyInProgress(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalSyncError {
    /// True for the only error class that aborts an entire sync run.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::ReconnectRequired(_))
    }

    /// Stable label suitable for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::ReconnectRequired(_) => "reconnect_required",
            Self::Validation(_) => "validation",
            Self::Transient(_) => "transient",
            Self::Remote(_) => "remote",
            Self::AlreadyInProgress(_) => "already_in_progress",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for CalSync operations
pub type Result<T> = std::result::Result<T, CalSyncError>;
