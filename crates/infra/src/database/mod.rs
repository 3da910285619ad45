//! Database implementations

pub mod calendar_event_repository;
pub mod credential_repository;
pub mod manager;
pub mod pool;
pub mod sync_log_repository;

pub use calendar_event_repository::SqliteCalendarEventRepository;
pub use credential_repository::SqliteCredentialStore;
pub use manager::DbManager;
pub use pool::{create_pool, PoolConfig, SqliteConnection, SqlitePool};
pub use sync_log_repository::SqliteSyncLogRepository;
