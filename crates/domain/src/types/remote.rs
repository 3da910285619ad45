//! Events as reported by the remote calendar, before validation.

use serde::{Deserialize, Serialize};

/// Start or end of a remote event: either a date (all-day) or a date-time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEventTime {
    /// RFC 3339 timestamp for timed events.
    pub date_time: Option<String>,
    /// `yyyy-MM-dd` for all-day events.
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

impl RemoteEventTime {
    pub fn at(date_time: impl Into<String>) -> Self {
        Self { date_time: Some(date_time.into()), ..Self::default() }
    }

    pub fn on(date: impl Into<String>) -> Self {
        Self { date: Some(date.into()), ..Self::default() }
    }

    pub fn is_date_only(&self) -> bool {
        self.date_time.is_none()
    }
}

/// Remote event keyed by its provider id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub remote_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color: Option<String>,
    /// Recurrence lines, passed through untouched.
    #[serde(default)]
    pub recurrence: Vec<String>,
    pub start: RemoteEventTime,
    pub end: RemoteEventTime,
}
