//! SQLite-backed credential store.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::CredentialStore;
use calsync_domain::{Credentials, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::instrument;

use super::calendar_event_repository::from_millis;
use super::pool::SqlitePool;
use crate::errors::InfraError;

/// Per-user OAuth token pair, keyed by `user_id`
pub struct SqliteCredentialStore {
    pool: Arc<SqlitePool>,
}

impl SqliteCredentialStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credentials>> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        let credentials = conn
            .query_row(
                "SELECT user_id, access_token, refresh_token, expires_ms
                 FROM calendar_credentials WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Credentials::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        from_millis(3, row.get(3)?)?,
                    ))
                },
            )
            .optional()
            .map_err(InfraError::from)?;
        Ok(credentials)
    }

    #[instrument(skip(self, credentials), fields(user_id = %credentials.user_id()))]
    async fn put(&self, credentials: &Credentials) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        conn.execute(
            "INSERT INTO calendar_credentials (user_id, access_token, refresh_token, expires_ms, updated_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_ms = excluded.expires_ms,
                updated_ms = excluded.updated_ms",
            params![
                credentials.user_id(),
                credentials.access_token().as_str(),
                credentials.refresh_token(),
                credentials.expires_at().timestamp_millis(),
                Utc::now().timestamp_millis(),
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, DurationRound};
    use tempfile::TempDir;

    use super::*;
    use crate::database::DbManager;

    #[tokio::test]
    async fn put_upserts_by_user() {
        let temp_dir = TempDir::new().unwrap();
        let manager = DbManager::new(temp_dir.path().join("creds.db"), 1).unwrap();
        manager.run_migrations().unwrap();
        let store = SqliteCredentialStore::new(manager.pool().clone());

        let expiry =
            (Utc::now() + Duration::hours(1)).duration_trunc(Duration::milliseconds(1)).unwrap();
        store.put(&Credentials::new("u1", "first", "rt", expiry)).await.unwrap();
        let rotated = Credentials::new("u1", "second", "rt-2", expiry + Duration::hours(1));
        store.put(&rotated).await.unwrap();

        assert_eq!(store.get("u1").await.unwrap(), Some(rotated));
        assert_eq!(store.get("u2").await.unwrap(), None);
    }
}
