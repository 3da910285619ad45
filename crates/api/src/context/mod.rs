//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use calsync_core::{
    CalendarEventRepository, CredentialManager, EventScheduler, RemoteCalendar, SyncOrchestrator,
    SyncPolicy, TokenRefresher,
};
use calsync_domain::{CalSyncError, Config, Result};
use calsync_infra::database::{
    DbManager, SqliteCalendarEventRepository, SqliteCredentialStore, SqliteSyncLogRepository,
};
use calsync_infra::integrations::calendar::{GoogleCalendarClient, GoogleTokenRefresher};
use calsync_infra::scheduling::{CalendarScheduler, CalendarSchedulerConfig};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub events: Arc<dyn CalendarEventRepository>,
    pub credentials: Arc<CredentialManager>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub event_scheduler: Arc<EventScheduler>,
    pub calendar_scheduler: Mutex<CalendarScheduler>,
}

impl AppContext {
    /// Wire the production stack: SQLite storage and the Google adapters.
    ///
    /// # Errors
    /// Database, migration, or configuration failures.
    pub fn new(config: Config) -> Result<Self> {
        let remote = Arc::new(GoogleCalendarClient::from_config(&config.google)?);
        let refresher = Arc::new(GoogleTokenRefresher::from_config(&config.google)?);
        Self::with_adapters(config, remote, refresher)
    }

    /// Wire the stack with caller-provided remote adapters.
    ///
    /// # Errors
    /// Database or migration failures.
    pub fn with_adapters(
        config: Config,
        remote: Arc<dyn RemoteCalendar>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self> {
        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;
        info!(path = %db.path().display(), "database ready");

        let pool = db.pool().clone();
        let events: Arc<dyn CalendarEventRepository> =
            Arc::new(SqliteCalendarEventRepository::new(pool.clone()));
        let logs = Arc::new(SqliteSyncLogRepository::new(pool.clone()));
        let store = Arc::new(SqliteCredentialStore::new(pool));

        let credentials = Arc::new(
            CredentialManager::new(store, refresher)
                .with_refresh_window(Duration::from_secs(config.sync.refresh_window_secs)),
        );
        let orchestrator = Arc::new(
            SyncOrchestrator::new(Arc::clone(&events), logs, Arc::clone(&credentials), remote)
                .with_policy(SyncPolicy::from(&config.sync)),
        );
        let event_scheduler = Arc::new(EventScheduler::new(Arc::clone(&events)));
        let calendar_scheduler = Mutex::new(CalendarScheduler::new(
            CalendarSchedulerConfig::from(&config.sync),
            Arc::clone(&orchestrator),
        ));

        Ok(Self { config, db, events, credentials, orchestrator, event_scheduler, calendar_scheduler })
    }

    /// Start automatic sync if enabled in the configuration.
    ///
    /// Returns `false` when automatic sync is disabled.
    ///
    /// # Errors
    /// Scheduler start failures, including an invalid cron expression.
    pub async fn start_scheduler(&self) -> Result<bool> {
        if !self.config.sync.enabled {
            info!("automatic sync disabled");
            return Ok(false);
        }
        if self.config.sync.user_ids.is_empty() {
            warn!("automatic sync enabled without configured users");
        }

        self.calendar_scheduler.lock().await.start().await.map_err(CalSyncError::from)?;
        Ok(true)
    }

    /// Stop the scheduler if it is running.
    ///
    /// # Errors
    /// Scheduler shutdown failures.
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.calendar_scheduler.lock().await;
        if scheduler.is_running() {
            scheduler.stop().await.map_err(CalSyncError::from)?;
        }
        info!("application context shut down");
        Ok(())
    }
}
