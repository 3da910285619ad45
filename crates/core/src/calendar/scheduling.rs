//! Event scheduling for domain collaborators
//!
//! Tasks, goals, habits and workouts never write calendar rows directly. They
//! go through [`EventScheduler`], which validates the event and inserts it as
//! `local` so the next push phase creates it remotely.

use std::sync::Arc;

use calsync_domain::constants::{
    DEFAULT_TASK_DUE_HOUR, DEFAULT_TASK_DURATION_MINUTES, DEFAULT_TIMEZONE, TASK_TITLE_PREFIX,
};
use calsync_domain::{
    impl_domain_status_conversions, CalSyncError, CalendarEvent, DomainLink, DomainLinks, Result,
    SyncStatus,
};
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::ports::CalendarEventRepository;
use super::validator::{localize, parse_local_timestamp, parse_timezone, validate_event};

/// Request from a collaborator to put something on the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// RFC 3339, or local `yyyy-MM-ddTHH:mm[:ss]` in `timezone`.
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub domain_link: Option<DomainLink>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl_domain_status_conversions!(TaskPriority {
    High => "high",
    Medium => "medium",
    Low => "low",
    Unspecified => "unspecified",
});

impl TaskPriority {
    /// Calendar color id used for events created from a task.
    pub const fn color_id(&self) -> &'static str {
        match self {
            Self::High => "4",
            Self::Medium => "5",
            Self::Low => "9",
            Self::Unspecified => "1",
        }
    }
}

/// Task to block out time for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSchedule {
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    /// Defaults to 21:00.
    #[serde(default)]
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Defaults to 30 minutes.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: Option<String>,
}

/// Entry point for collaborators that schedule events
pub struct EventScheduler {
    events: Arc<dyn CalendarEventRepository>,
}

impl EventScheduler {
    pub fn new(events: Arc<dyn CalendarEventRepository>) -> Self {
        Self { events }
    }

    /// Insert a new `local` event and return its id.
    ///
    /// # Errors
    /// `Validation` for unparseable times, an unknown timezone, a blank title,
    /// a non-UUID user id or an end that is not after the start.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn schedule_event(&self, user_id: &str, request: ScheduleEventRequest) -> Result<String> {
        let timezone = request.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        let start_time = parse_local_timestamp(&request.start_time, timezone)
            .map_err(|err| CalSyncError::Validation(format!("start_time: {}", err.message)))?;
        let end_time = parse_local_timestamp(&request.end_time, timezone)
            .map_err(|err| CalSyncError::Validation(format!("end_time: {}", err.message)))?;

        let mut event = CalendarEvent::new_local(user_id, request.title.trim(), start_time, end_time);
        event.description = request.description.filter(|d| !d.trim().is_empty());
        event.location = request.location.filter(|l| !l.trim().is_empty());
        event.color = request.color;
        event.is_all_day = request.is_all_day;
        event.timezone = Some(timezone.to_owned());
        if let Some(link) = request.domain_link {
            event.links = DomainLinks::from(link);
        }

        self.insert(event).await
    }

    /// Block out time for a task on its due date.
    #[instrument(skip(self, task), fields(task_id = %task.task_id))]
    pub async fn schedule_task(&self, user_id: &str, task: TaskSchedule) -> Result<String> {
        let timezone = task.timezone.clone().unwrap_or_else(|| DEFAULT_TIMEZONE.to_owned());
        let tz = parse_timezone(&timezone).map_err(|err| CalSyncError::Validation(err.to_string()))?;

        let due_time = match task.due_time {
            Some(time) => time,
            None => NaiveTime::from_hms_opt(DEFAULT_TASK_DUE_HOUR, 0, 0)
                .ok_or_else(|| CalSyncError::Internal("invalid default due time".into()))?,
        };
        let duration = task.duration_minutes.unwrap_or(DEFAULT_TASK_DURATION_MINUTES);

        let start_time = localize(tz, task.due_date.and_time(due_time))
            .map_err(|err| CalSyncError::Validation(err.to_string()))?;
        let end_time = start_time + Duration::minutes(i64::from(duration));

        let mut event = CalendarEvent::new_local(
            user_id,
            format!("{TASK_TITLE_PREFIX}{}", task.title.trim()),
            start_time,
            end_time,
        );
        event.description = Some(task_description(&task, duration, &timezone));
        event.color = Some(task.priority.color_id().to_owned());
        event.timezone = Some(timezone);
        event.links = DomainLinks::from(DomainLink::Task(task.task_id));

        self.insert(event).await
    }

    /// Current sync status of one of the user's events.
    pub async fn event_status(&self, user_id: &str, event_id: &str) -> Result<SyncStatus> {
        Ok(self.owned_event(user_id, event_id).await?.sync_status)
    }

    /// Remove an event. Never-synced rows go away immediately; synced rows are
    /// soft-deleted until the next push removes them remotely.
    #[instrument(skip(self))]
    pub async fn remove_event(&self, user_id: &str, event_id: &str) -> Result<()> {
        let mut event = self.owned_event(user_id, event_id).await?;

        if event.mark_deleted() {
            self.events.update(&event).await?;
            info!("event soft-deleted, pending remote delete");
        } else {
            self.events.delete(&event.id).await?;
            info!("never-synced event deleted");
        }
        Ok(())
    }

    async fn insert(&self, event: CalendarEvent) -> Result<String> {
        validate_event(&event)?;
        self.events.insert(&event).await?;
        info!(event_id = %event.id, user_id = %event.user_id, "event scheduled");
        Ok(event.id)
    }

    async fn owned_event(&self, user_id: &str, event_id: &str) -> Result<CalendarEvent> {
        self.events
            .get(event_id)
            .await?
            .filter(|event| event.user_id == user_id)
            .ok_or_else(|| CalSyncError::NotFound(format!("calendar event {event_id}")))
    }
}

fn task_description(task: &TaskSchedule, duration: u32, timezone: &str) -> String {
    let mut lines = Vec::new();
    if let Some(description) = task.description.as_deref().filter(|d| !d.trim().is_empty()) {
        lines.push(description.trim().to_owned());
        lines.push(String::new());
    }
    lines.push(format!("Priority: {}", task.priority));
    if let Some(status) = task.status.as_deref() {
        lines.push(format!("Status: {status}"));
    }
    lines.push(format!("Duration: {duration} minutes"));
    lines.push(format!("Timezone: {timezone}"));
    lines.push(format!("Task ID: {}", task.task_id));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(priority: TaskPriority) -> TaskSchedule {
        TaskSchedule {
            task_id: "task-42".into(),
            title: "Write report".into(),
            description: Some("Quarterly numbers".into()),
            due_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            due_time: None,
            timezone: Some("Europe/Berlin".into()),
            duration_minutes: None,
            priority,
            status: Some("todo".into()),
        }
    }

    #[test]
    fn priority_maps_to_color() {
        assert_eq!(TaskPriority::High.color_id(), "4");
        assert_eq!(TaskPriority::Medium.color_id(), "5");
        assert_eq!(TaskPriority::Low.color_id(), "9");
        assert_eq!(TaskPriority::Unspecified.color_id(), "1");
    }

    #[test]
    fn unknown_priority_deserializes_as_unspecified() {
        let priority: TaskPriority = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(priority, TaskPriority::Unspecified);
    }

    #[test]
    fn description_summarises_task() {
        let description = task_description(&task(TaskPriority::High), 30, "Europe/Berlin");

        assert!(description.starts_with("Quarterly numbers\n\n"));
        assert!(description.contains("Priority: high"));
        assert!(description.contains("Status: todo"));
        assert!(description.contains("Duration: 30 minutes"));
        assert!(description.contains("Task ID: task-42"));
    }
}
