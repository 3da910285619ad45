//! Shared fixtures for infra integration tests: a real SQLite database in a
//! temporary directory and a wiremock server standing in for both the
//! calendar API and the OAuth token endpoint.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use calsync_core::{
    CalendarEventRepository, CredentialManager, CredentialStore, EventScheduler, SyncOrchestrator,
};
use calsync_domain::{CalendarEvent, Credentials, DateRange};
use calsync_infra::database::{
    DbManager, SqliteCalendarEventRepository, SqliteCredentialStore, SqliteSyncLogRepository,
};
use calsync_infra::http::HttpClient;
use calsync_infra::integrations::calendar::{GoogleCalendarClient, GoogleTokenRefresher};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tempfile::TempDir;
use wiremock::MockServer;

pub const USER: &str = "5a4f2b1c-8d3e-4f60-9a7b-1c2d3e4f5a6b";
pub const EVENTS_PATH: &str = "/calendars/primary/events";

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
}

pub fn week() -> DateRange {
    DateRange::new(at(18, 0), at(25, 0)).unwrap()
}

/// Full sync stack over SQLite and a mock Google endpoint.
pub struct SyncStack {
    pub server: MockServer,
    pub db: Arc<DbManager>,
    pub events: Arc<SqliteCalendarEventRepository>,
    pub store: Arc<SqliteCredentialStore>,
    pub credentials: Arc<CredentialManager>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub scheduler: EventScheduler,
    _temp_dir: TempDir,
}

impl SyncStack {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("temporary directory should be created");
        let db = Arc::new(
            DbManager::new(temp_dir.path().join("calsync.db"), 4)
                .expect("database manager should initialise"),
        );
        db.run_migrations().expect("schema migrations should apply");
        let pool = db.pool().clone();

        let server = MockServer::start().await;
        let http = HttpClient::builder()
            .max_attempts(2)
            .base_backoff(Duration::from_millis(5))
            .build()
            .expect("http client");

        let events = Arc::new(SqliteCalendarEventRepository::new(pool.clone()));
        let store = Arc::new(SqliteCredentialStore::new(pool.clone()));
        let refresher = GoogleTokenRefresher::new(
            http.clone(),
            format!("{}/token", server.uri()),
            "client-id",
            "client-secret",
        );
        let credentials = Arc::new(CredentialManager::new(store.clone(), Arc::new(refresher)));
        let remote = GoogleCalendarClient::new(http, server.uri(), "primary");

        let orchestrator = Arc::new(SyncOrchestrator::new(
            events.clone(),
            Arc::new(SqliteSyncLogRepository::new(pool)),
            credentials.clone(),
            Arc::new(remote),
        ));
        let scheduler = EventScheduler::new(events.clone());

        Self {
            server,
            db,
            events,
            store,
            credentials,
            orchestrator,
            scheduler,
            _temp_dir: temp_dir,
        }
    }

    /// Store credentials that expire `expires_in` from now.
    pub async fn connect(&self, access_token: &str, expires_in: ChronoDuration) {
        let credentials =
            Credentials::new(USER, access_token, "1//refresh", Utc::now() + expires_in);
        self.credentials.connect(credentials).await.expect("credentials stored");
    }

    pub async fn stored_credentials(&self) -> Credentials {
        self.store.get(USER).await.unwrap().expect("credentials present")
    }

    pub async fn rows(&self) -> Vec<CalendarEvent> {
        self.events.list_in_range(USER, &week()).await.unwrap()
    }

    pub async fn row(&self, id: &str) -> Option<CalendarEvent> {
        self.events.get(id).await.unwrap()
    }
}
