//! SQLite-backed sync log (audit trail of sync runs).

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::SyncLogRepository;
use calsync_domain::{CalSyncError, Result, RunStatus, SyncDirection, SyncLogEntry, SyncType};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::instrument;

use super::calendar_event_repository::from_millis;
use super::pool::{SqliteConnection, SqlitePool};
use crate::errors::InfraError;

const LOG_COLUMNS: &str = "id, user_id, sync_type, direction, status, started_ms, completed_ms,
     events_created, events_updated, events_deleted, errors_json";

pub struct SqliteSyncLogRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteSyncLogRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn connection(&self) -> Result<SqliteConnection> {
        Ok(self.pool.get().map_err(InfraError::from)?)
    }
}

#[async_trait]
impl SyncLogRepository for SqliteSyncLogRepository {
    #[instrument(skip(self, entry), fields(log_id = %entry.id))]
    async fn insert(&self, entry: &SyncLogEntry) -> Result<()> {
        let errors_json = serde_json::to_string(&entry.errors).map_err(InfraError::from)?;
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO calendar_sync_logs (
                id, user_id, sync_type, direction, status, started_ms, completed_ms,
                events_created, events_updated, events_deleted, error_message, errors_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.id,
                entry.user_id,
                entry.sync_type.as_str(),
                entry.direction.as_str(),
                entry.status.as_str(),
                entry.started_at.timestamp_millis(),
                entry.completed_at.map(|at| at.timestamp_millis()),
                entry.events_created,
                entry.events_updated,
                entry.events_deleted,
                entry.error_message(),
                errors_json,
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(log_id = %entry.id, status = %entry.status))]
    async fn finalize(&self, entry: &SyncLogEntry) -> Result<()> {
        let errors_json = serde_json::to_string(&entry.errors).map_err(InfraError::from)?;
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE calendar_sync_logs SET
                    status = ?2, completed_ms = ?3, events_created = ?4, events_updated = ?5,
                    events_deleted = ?6, error_message = ?7, errors_json = ?8
                 WHERE id = ?1",
                params![
                    entry.id,
                    entry.status.as_str(),
                    entry.completed_at.map(|at| at.timestamp_millis()),
                    entry.events_created,
                    entry.events_updated,
                    entry.events_deleted,
                    entry.error_message(),
                    errors_json,
                ],
            )
            .map_err(InfraError::from)?;

        if changed == 0 {
            return Err(CalSyncError::NotFound(format!("sync log {}", entry.id)));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SyncLogEntry>> {
        let conn = self.connection()?;
        let entry = conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM calendar_sync_logs WHERE id = ?1"),
                params![id],
                map_log_row,
            )
            .optional()
            .map_err(InfraError::from)?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    async fn list_for_user(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SyncLogEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM calendar_sync_logs
                 WHERE user_id = ?1 AND started_ms BETWEEN ?2 AND ?3
                 ORDER BY started_ms DESC, id DESC"
            ))
            .map_err(InfraError::from)?;
        let entries = stmt
            .query_map(params![user_id, from.timestamp_millis(), to.timestamp_millis()], map_log_row)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;
        Ok(entries)
    }

    async fn latest_for_user(&self, user_id: &str) -> Result<Option<SyncLogEntry>> {
        let conn = self.connection()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM calendar_sync_logs
                     WHERE user_id = ?1 ORDER BY started_ms DESC, id DESC LIMIT 1"
                ),
                params![user_id],
                map_log_row,
            )
            .optional()
            .map_err(InfraError::from)?;
        Ok(entry)
    }
}

fn map_log_row(row: &Row<'_>) -> rusqlite::Result<SyncLogEntry> {
    let errors_json: String = row.get(10)?;
    let errors: Vec<String> = serde_json::from_str(&errors_json)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(err)))?;

    Ok(SyncLogEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sync_type: parse_column::<SyncType>(row, 2)?,
        direction: parse_column::<SyncDirection>(row, 3)?,
        status: parse_column::<RunStatus>(row, 4)?,
        started_at: from_millis(5, row.get(5)?)?,
        completed_at: row.get::<_, Option<i64>>(6)?.map(|ms| from_millis(6, ms)).transpose()?,
        events_created: row.get(7)?,
        events_updated: row.get(8)?,
        events_deleted: row.get(9)?,
        errors,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into()))
}
