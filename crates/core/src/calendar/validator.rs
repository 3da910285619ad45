//! Event validation
//!
//! Every event is checked before it reaches the local store or the remote
//! service. A failed check drops that single event; the run continues.

use std::fmt;

use calsync_domain::constants::{DEFAULT_TIMEZONE, UNTITLED_EVENT_TITLE};
use calsync_domain::{CalSyncError, CalendarEvent, EventFields, RemoteEvent, RemoteEventTime};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

/// A single failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All checks that failed for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        f.write_str(&joined)
    }
}

impl From<ValidationErrors> for CalSyncError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

type Validation<T> = Result<T, ValidationErrors>;

/// Remote event after normalisation and validation, ready to be applied to
/// the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledEvent {
    pub remote_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color: Option<String>,
    pub recurrence_rule: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub timezone: Option<String>,
}

impl PulledEvent {
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

    /// New local row mirroring this remote event.
    pub fn to_local(&self, user_id: &str, now: DateTime<Utc>) -> CalendarEvent {
        let mut event =
            CalendarEvent::new_local(user_id, self.title.clone(), self.start_time, self.end_time);
        self.apply_to(&mut event);
        event.mark_synced(self.remote_id.clone(), now);
        event
    }

    /// Overwrite the remote-owned fields of `event`. Domain links and the
    /// local id are preserved.
    pub fn apply_to(&self, event: &mut CalendarEvent) {
        event.title.clone_from(&self.title);
        event.description.clone_from(&self.description);
        event.location.clone_from(&self.location);
        event.color.clone_from(&self.color);
        event.recurrence_rule.clone_from(&self.recurrence_rule);
        event.start_time = self.start_time;
        event.end_time = self.end_time;
        event.is_all_day = self.is_all_day;
        if self.timezone.is_some() {
            event.timezone.clone_from(&self.timezone);
        }
    }
}

/// Check a local row before it is stored or pushed.
pub fn validate_event(event: &CalendarEvent) -> Validation<()> {
    let mut errors = Vec::new();

    if let Err(err) = validate_user_id(&event.user_id) {
        errors.push(err);
    }
    if event.title.trim().is_empty() {
        errors.push(ValidationError::new("title", "must not be empty"));
    }
    if event.start_time >= event.end_time {
        errors.push(ValidationError::new("end_time", "must be after start_time"));
    }

    finish(errors, ())
}

/// Normalise and check a remote event pulled for `user_id`.
pub fn validate_remote(user_id: &str, remote: &RemoteEvent) -> Validation<PulledEvent> {
    let mut errors = Vec::new();

    if let Err(err) = validate_user_id(user_id) {
        errors.push(err);
    }
    if remote.remote_id.trim().is_empty() {
        errors.push(ValidationError::new("remote_id", "must not be empty"));
    }

    let start = resolve_remote_time("start_time", &remote.start).map_err(|e| errors.push(e)).ok();
    let end = resolve_remote_time("end_time", &remote.end).map_err(|e| errors.push(e)).ok();

    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            errors.push(ValidationError::new("end_time", "must be after start_time"));
        }
    }

    let (Some(start_time), Some(end_time)) = (start, end) else {
        return Err(ValidationErrors(errors));
    };

    let title = non_blank(remote.title.as_deref()).unwrap_or_else(|| UNTITLED_EVENT_TITLE.into());

    finish(
        errors,
        PulledEvent {
            remote_id: remote.remote_id.clone(),
            title,
            description: non_blank(remote.description.as_deref()),
            location: non_blank(remote.location.as_deref()),
            color: non_blank(remote.color.as_deref()),
            recurrence_rule: remote.recurrence.first().cloned(),
            start_time,
            end_time,
            is_all_day: remote.start.is_date_only(),
            timezone: remote.start.time_zone.clone(),
        },
    )
}

/// User ids are UUIDs.
pub fn validate_user_id(user_id: &str) -> Result<(), ValidationError> {
    Uuid::try_parse(user_id)
        .map(|_| ())
        .map_err(|_| ValidationError::new("user_id", format!("not a valid UUID: {user_id:?}")))
}

/// Parse an RFC 3339 timestamp.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Parse either an RFC 3339 timestamp or a local `yyyy-MM-ddTHH:mm[:ss]`
/// wall-clock time interpreted in `timezone`.
pub fn parse_local_timestamp(raw: &str, timezone: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Some(instant) = parse_timestamp(raw) {
        return Ok(instant);
    }

    let tz = parse_timezone(timezone)?;
    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw.trim(), format).ok())
        .ok_or_else(|| ValidationError::new("time", format!("not an ISO timestamp: {raw:?}")))?;

    localize(tz, naive)
}

pub fn parse_timezone(timezone: &str) -> Result<Tz, ValidationError> {
    timezone
        .parse::<Tz>()
        .map_err(|_| ValidationError::new("timezone", format!("unknown timezone: {timezone:?}")))
}

/// Resolve a local wall-clock time in `tz`. Ambiguous times (DST fall-back)
/// take the earlier instant; nonexistent ones (spring-forward gap) are errors.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>, ValidationError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            ValidationError::new("time", format!("{naive} does not exist in {}", tz.name()))
        })
}

fn resolve_remote_time(
    field: &'static str,
    time: &RemoteEventTime,
) -> Result<DateTime<Utc>, ValidationError> {
    if let Some(raw) = time.date_time.as_deref() {
        return parse_timestamp(raw)
            .ok_or_else(|| ValidationError::new(field, format!("not an ISO timestamp: {raw:?}")));
    }

    let raw = time
        .date
        .as_deref()
        .ok_or_else(|| ValidationError::new(field, "missing date and dateTime"))?;
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::new(field, format!("not an ISO date: {raw:?}")))?;
    let tz = parse_timezone(time.time_zone.as_deref().unwrap_or(DEFAULT_TIMEZONE))
        .map_err(|err| ValidationError::new(field, err.message))?;

    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ValidationError::new(field, format!("invalid date: {raw:?}")))?;

    localize(tz, midnight).map_err(|err| ValidationError::new(field, err.message))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(ToOwned::to_owned)
}

fn finish<T>(errors: Vec<ValidationError>, value: T) -> Validation<T> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(ValidationErrors(errors))
    }
}
