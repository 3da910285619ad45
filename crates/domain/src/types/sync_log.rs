//! Sync run audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// What triggered a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Manual,
    Auto,
}

impl_domain_status_conversions!(SyncType {
    Manual => "manual",
    Auto => "auto",
});

/// Which phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Pull,
    Push,
    Bidirectional,
}

impl_domain_status_conversions!(SyncDirection {
    Pull => "pull",
    Push => "push",
    Bidirectional => "bidirectional",
});

impl SyncDirection {
    pub const fn includes_pull(&self) -> bool {
        matches!(self, Self::Pull | Self::Bidirectional)
    }

    pub const fn includes_push(&self) -> bool {
        matches!(self, Self::Push | Self::Bidirectional)
    }
}

/// Outcome of a run as recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Success,
    Partial,
    Failed,
}

impl_domain_status_conversions!(RunStatus {
    InProgress => "in_progress",
    Success => "success",
    Partial => "partial",
    Failed => "failed",
});

impl RunStatus {
    /// Zero errors is a success, `failure_threshold` or more is a failure,
    /// anything in between is partial.
    pub fn from_error_count(errors: usize, failure_threshold: usize) -> Self {
        match errors {
            0 => Self::Success,
            n if n >= failure_threshold.max(1) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

/// Event counters accumulated by a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
}

/// One row per sync run, created at start and finalized at the end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: String,
    pub user_id: String,
    pub sync_type: SyncType,
    pub direction: SyncDirection,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub events_created: u32,
    pub events_updated: u32,
    pub events_deleted: u32,
    pub errors: Vec<String>,
}

impl SyncLogEntry {
    /// Open a new `in_progress` entry stamped with the current time.
    pub fn start(user_id: impl Into<String>, sync_type: SyncType, direction: SyncDirection) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            sync_type,
            direction,
            status: RunStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            events_created: 0,
            events_updated: 0,
            events_deleted: 0,
            errors: Vec::new(),
        }
    }

    pub fn finalize(&mut self, status: RunStatus, counts: SyncCounts, errors: Vec<String>) {
        self.status = status;
        self.events_created = counts.created;
        self.events_updated = counts.updated;
        self.events_deleted = counts.deleted;
        self.errors = errors;
        self.completed_at = Some(Utc::now());
    }

    /// First recorded error, shown as the headline in sync history.
    pub fn error_message(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            created: self.events_created,
            updated: self.events_updated,
            deleted: self.events_deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_thresholds() {
        assert_eq!(RunStatus::from_error_count(0, 5), RunStatus::Success);
        assert_eq!(RunStatus::from_error_count(1, 5), RunStatus::Partial);
        assert_eq!(RunStatus::from_error_count(4, 5), RunStatus::Partial);
        assert_eq!(RunStatus::from_error_count(5, 5), RunStatus::Failed);
        assert_eq!(RunStatus::from_error_count(7, 5), RunStatus::Failed);
    }

    #[test]
    fn custom_threshold_is_respected() {
        assert_eq!(RunStatus::from_error_count(2, 2), RunStatus::Failed);
        assert_eq!(RunStatus::from_error_count(1, 0), RunStatus::Failed);
    }

    #[test]
    fn direction_phases() {
        assert!(SyncDirection::Pull.includes_pull());
        assert!(!SyncDirection::Pull.includes_push());
        assert!(SyncDirection::Bidirectional.includes_pull());
        assert!(SyncDirection::Bidirectional.includes_push());
    }

    #[test]
    fn finalize_records_counts_and_first_error() {
        let mut entry = SyncLogEntry::start("u1", SyncType::Manual, SyncDirection::Pull);
        assert_eq!(entry.status, RunStatus::InProgress);
        assert!(entry.completed_at.is_none());

        entry.finalize(
            RunStatus::Partial,
            SyncCounts { created: 2, updated: 1, deleted: 0 },
            vec!["first".into(), "second".into()],
        );

        assert_eq!(entry.status, RunStatus::Partial);
        assert_eq!(entry.events_created, 2);
        assert_eq!(entry.error_message(), Some("first"));
        assert!(entry.completed_at.is_some());
    }
}
