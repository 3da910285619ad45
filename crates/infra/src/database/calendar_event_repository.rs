//! SQLite-backed implementation of the CalendarEventRepository port.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::CalendarEventRepository;
use calsync_domain::{CalSyncError, CalendarEvent, DateRange, DomainLinks, Result, SyncStatus};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{debug, instrument};

use super::pool::{SqliteConnection, SqlitePool};
use crate::errors::InfraError;

const EVENT_COLUMNS: &str = "id, user_id, title, description, start_ms, end_ms, is_all_day,
     timezone, location, color, recurrence_rule, remote_id, sync_status, last_synced_ms,
     task_id, goal_id, habit_id, workout_id";

/// SQLite's default bound-parameter limit is 999; stay well under it.
const REMOTE_ID_CHUNK: usize = 500;

/// SQLite implementation of CalendarEventRepository
pub struct SqliteCalendarEventRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCalendarEventRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn connection(&self) -> Result<SqliteConnection> {
        Ok(self.pool.get().map_err(InfraError::from)?)
    }

    fn query_events(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<CalendarEvent>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql).map_err(InfraError::from)?;
        let rows = stmt
            .query_map(params, map_event_row)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;
        Ok(rows)
    }
}

#[async_trait]
impl CalendarEventRepository for SqliteCalendarEventRepository {
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn insert(&self, event: &CalendarEvent) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "INSERT INTO calendar_events ({EVENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
            ),
            params![
                event.id,
                event.user_id,
                event.title,
                event.description,
                event.start_time.timestamp_millis(),
                event.end_time.timestamp_millis(),
                event.is_all_day,
                event.timezone,
                event.location,
                event.color,
                event.recurrence_rule,
                event.remote_id,
                event.sync_status.as_str(),
                event.last_synced_at.map(|at| at.timestamp_millis()),
                event.links.task_id,
                event.links.goal_id,
                event.links.habit_id,
                event.links.workout_id,
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn update(&self, event: &CalendarEvent) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE calendar_events SET
                    user_id = ?2, title = ?3, description = ?4, start_ms = ?5, end_ms = ?6,
                    is_all_day = ?7, timezone = ?8, location = ?9, color = ?10,
                    recurrence_rule = ?11, remote_id = ?12, sync_status = ?13,
                    last_synced_ms = ?14, task_id = ?15, goal_id = ?16, habit_id = ?17,
                    workout_id = ?18
                 WHERE id = ?1",
                params![
                    event.id,
                    event.user_id,
                    event.title,
                    event.description,
                    event.start_time.timestamp_millis(),
                    event.end_time.timestamp_millis(),
                    event.is_all_day,
                    event.timezone,
                    event.location,
                    event.color,
                    event.recurrence_rule,
                    event.remote_id,
                    event.sync_status.as_str(),
                    event.last_synced_at.map(|at| at.timestamp_millis()),
                    event.links.task_id,
                    event.links.goal_id,
                    event.links.habit_id,
                    event.links.workout_id,
                ],
            )
            .map_err(InfraError::from)?;

        if changed == 0 {
            return Err(CalSyncError::NotFound(format!("calendar event {}", event.id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.connection()?;
        let removed = conn
            .execute("DELETE FROM calendar_events WHERE id = ?1", params![id])
            .map_err(InfraError::from)?;
        debug!(removed, "calendar event deleted");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CalendarEvent>> {
        let conn = self.connection()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM calendar_events WHERE id = ?1"),
                params![id],
                map_event_row,
            )
            .optional()
            .map_err(InfraError::from)?;
        Ok(event)
    }

    #[instrument(skip(self, range))]
    async fn list_in_range(&self, user_id: &str, range: &DateRange) -> Result<Vec<CalendarEvent>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events
                 WHERE user_id = ?1 AND start_ms >= ?2 AND start_ms < ?3
                 ORDER BY start_ms"
            ),
            params![user_id, range.start.timestamp_millis(), range.end.timestamp_millis()],
        )
    }

    #[instrument(skip(self, remote_ids), fields(count = remote_ids.len()))]
    async fn find_by_remote_ids(
        &self,
        user_id: &str,
        remote_ids: &[String],
    ) -> Result<Vec<CalendarEvent>> {
        let mut found = Vec::new();

        for chunk in remote_ids.chunks(REMOTE_ID_CHUNK) {
            let placeholders = (0..chunk.len()).map(|i| format!("?{}", i + 2)).collect::<Vec<_>>();
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events
                 WHERE user_id = ?1 AND remote_id IN ({})",
                placeholders.join(", ")
            );
            let values = std::iter::once(user_id).chain(chunk.iter().map(String::as_str));
            found.extend(self.query_events(&sql, params_from_iter(values))?);
        }

        Ok(found)
    }

    #[instrument(skip(self))]
    async fn list_pending_push(&self, user_id: &str, range: &DateRange) -> Result<Vec<CalendarEvent>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events
                 WHERE user_id = ?1 AND sync_status IN ('local', 'sync_failed', 'deleted')
                   AND start_ms >= ?2 AND start_ms < ?3
                 ORDER BY start_ms"
            ),
            params![user_id, range.start.timestamp_millis(), range.end.timestamp_millis()],
        )
    }
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    let status: String = row.get(12)?;
    let sync_status = SyncStatus::from_str(&status)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, err.into()))?;

    Ok(CalendarEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start_time: from_millis(4, row.get(4)?)?,
        end_time: from_millis(5, row.get(5)?)?,
        is_all_day: row.get(6)?,
        timezone: row.get(7)?,
        location: row.get(8)?,
        color: row.get(9)?,
        recurrence_rule: row.get(10)?,
        remote_id: row.get(11)?,
        sync_status,
        last_synced_at: row
            .get::<_, Option<i64>>(13)?
            .map(|ms| from_millis(13, ms))
            .transpose()?,
        links: DomainLinks {
            task_id: row.get(14)?,
            goal_id: row.get(15)?,
            habit_id: row.get(16)?,
            workout_id: row.get(17)?,
        },
    })
}

pub(crate) fn from_millis(column: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp out of range: {ms}").into(),
        )
    })
}
