//! Calendar event model shared by the local store, the diff engine and the
//! remote adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Sync lifecycle of a local calendar row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created locally, never pushed. `remote_id` is always `None`.
    Local,
    /// Mirrors a remote object. `remote_id` is always set.
    Synced,
    /// Last push attempt failed; retried on the next push phase.
    SyncFailed,
    /// Soft-deleted, waiting for the remote object to be confirmed gone.
    Deleted,
}

impl_domain_status_conversions!(SyncStatus {
    Local => "local",
    Synced => "synced",
    SyncFailed => "sync_failed",
    Deleted => "deleted",
});

impl SyncStatus {
    /// Rows in these states are picked up by the push phase as create/update.
    pub const fn needs_push(&self) -> bool {
        matches!(self, Self::Local | Self::SyncFailed)
    }
}

/// Link from a calendar event back to the domain entity that scheduled it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DomainLink {
    Task(String),
    Goal(String),
    Habit(String),
    Workout(String),
}

/// Foreign-key style references held on a calendar row.
///
/// No cascading behaviour: orphan cleanup belongs to the owning module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_id: Option<String>,
}

impl From<DomainLink> for DomainLinks {
    fn from(link: DomainLink) -> Self {
        let mut links = Self::default();
        match link {
            DomainLink::Task(id) => links.task_id = Some(id),
            DomainLink::Goal(id) => links.goal_id = Some(id),
            DomainLink::Habit(id) => links.habit_id = Some(id),
            DomainLink::Workout(id) => links.workout_id = Some(id),
        }
        links
    }
}

/// Persisted calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    /// IANA zone the event was authored in, used when writing to the remote.
    pub timezone: Option<String>,
    pub location: Option<String>,
    pub color: Option<String>,
    /// Opaque recurrence rule, passed through unmodified.
    pub recurrence_rule: Option<String>,
    pub remote_id: Option<String>,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub links: DomainLinks,
}

/// Fields compared by the pull-side diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub location: Option<&'a str>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub color: Option<&'a str>,
}

impl CalendarEvent {
    /// Build a never-synced local event with a fresh id.
    pub fn new_local(
        user_id: impl Into<String>,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            start_time,
            end_time,
            is_all_day: false,
            timezone: None,
            location: None,
            color: None,
            recurrence_rule: None,
            remote_id: None,
            sync_status: SyncStatus::Local,
            last_synced_at: None,
            links: DomainLinks::default(),
        }
    }

    pub fn fields(&self) -> EventFields<'_> {
        EventFields {
            title: &self.title,
            description: self.description.as_deref(),
            location: self.location.as_deref(),
            start_time: self.start_time,
            end_time: self.end_time,
            is_all_day: self.is_all_day,
            color: self.color.as_deref(),
        }
    }

    /// Record a confirmed remote counterpart.
    pub fn mark_synced(&mut self, remote_id: impl Into<String>, at: DateTime<Utc>) {
        self.remote_id = Some(remote_id.into());
        self.sync_status = SyncStatus::Synced;
        self.last_synced_at = Some(at);
    }

    /// Soft-delete. Rows that never reached the remote have nothing to clean
    /// up and return `false`; callers hard-delete those instead.
    pub fn mark_deleted(&mut self) -> bool {
        if self.remote_id.is_none() {
            return false;
        }
        self.sync_status = SyncStatus::Deleted;
        true
    }

    /// Checks the `synced ⇒ remote_id` and `local ⇒ no remote_id` invariant.
    pub fn has_consistent_status(&self) -> bool {
        match self.sync_status {
            SyncStatus::Synced => self.remote_id.is_some(),
            SyncStatus::Local => self.remote_id.is_none(),
            SyncStatus::SyncFailed | SyncStatus::Deleted => true,
        }
    }
}

/// Notification published whenever a sync run changes an event's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusChanged {
    pub event_id: String,
    pub user_id: String,
    pub status: SyncStatus,
}
