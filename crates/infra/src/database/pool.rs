//! SQLite connection pool
//!
//! r2d2 pool over `r2d2_sqlite`. Every new connection gets the same pragmas:
//! WAL journaling, NORMAL synchronous mode, foreign keys and a busy timeout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use calsync_domain::Result;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::InfraError;

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;
pub type SqliteConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool tuning
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    pub busy_timeout: Duration,
    pub enable_wal: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            enable_wal: true,
        }
    }
}

/// Open (creating if needed) the database at `path` behind a pool.
pub fn create_pool<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Arc<SqlitePool>> {
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(move |conn| apply_connection_pragmas(conn, &config));

    let pool = r2d2::Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(InfraError::from)?;

    Ok(Arc::new(pool))
}

fn apply_connection_pragmas(conn: &mut Connection, config: &PoolConfig) -> rusqlite::Result<()> {
    let mut pragma_sql = String::new();

    if config.enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
        pragma_sql.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }
    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");
    pragma_sql.push_str("PRAGMA foreign_keys=ON;\n");

    conn.execute_batch(&pragma_sql)?;
    conn.busy_timeout(config.busy_timeout)
}
