//! Shared test helpers for `calsync-core` integration tests.
//!
//! In-memory implementations of every port. State lives behind
//! `Arc<Mutex<…>>` so tests can seed it before a run and inspect it after.
//! Mocks that matter for ordering assertions append to a shared [`Journal`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync_core::{
    CalendarEventRepository, CredentialManager, CredentialStore, DeleteOutcome, RefreshError,
    RefreshedToken, RemoteCalendar, RemoteError, SyncLogRepository, SyncOrchestrator, SyncPolicy,
    TokenRefresher,
};
use calsync_domain::{
    AccessToken, CalSyncError, CalendarEvent, Credentials, DateRange, RemoteEvent, RemoteEventTime,
    Result, SyncLogEntry, SyncStatus,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;

pub const USER: &str = "6f1c1a58-3f0e-4c1e-9d7a-2b8f4f1e9a10";

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
}

/// 2026-10-18 .. 2026-10-25
pub fn week() -> DateRange {
    DateRange::new(at(18, 0), at(25, 0)).unwrap()
}

pub fn remote_event(id: &str, title: &str, start: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent {
        remote_id: id.into(),
        title: Some(title.into()),
        description: None,
        location: None,
        color: None,
        recurrence: Vec::new(),
        start: RemoteEventTime::at(start.to_rfc3339()),
        end: RemoteEventTime::at((start + Duration::hours(1)).to_rfc3339()),
    }
}

pub fn local_event(title: &str, start: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent::new_local(USER, title, start, start + Duration::hours(1))
}

pub fn synced_event(remote_id: &str, title: &str, start: DateTime<Utc>) -> CalendarEvent {
    let mut event = local_event(title, start);
    event.mark_synced(remote_id, Utc::now() - Duration::hours(1));
    event
}

/// Ordered record of side effects across mocks.
#[derive(Debug, Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

// ============================================================================
// Local store
// ============================================================================

#[derive(Default, Clone)]
pub struct MockEventRepository {
    rows: Arc<Mutex<Vec<CalendarEvent>>>,
}

impl MockEventRepository {
    pub fn seed(&self, event: CalendarEvent) {
        self.rows.lock().unwrap().push(event);
    }

    pub fn all(&self) -> Vec<CalendarEvent> {
        self.rows.lock().unwrap().clone()
    }

    pub fn row(&self, id: &str) -> Option<CalendarEvent> {
        self.rows.lock().unwrap().iter().find(|e| e.id == id).cloned()
    }

    pub fn by_remote_id(&self, remote_id: &str) -> Option<CalendarEvent> {
        self.rows.lock().unwrap().iter().find(|e| e.remote_id.as_deref() == Some(remote_id)).cloned()
    }
}

#[async_trait]
impl CalendarEventRepository for MockEventRepository {
    async fn insert(&self, event: &CalendarEvent) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|e| e.id == event.id) {
            return Err(CalSyncError::Database(format!("duplicate id {}", event.id)));
        }
        rows.push(event.clone());
        Ok(())
    }

    async fn update(&self, event: &CalendarEvent) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| CalSyncError::NotFound(format!("calendar event {}", event.id)))?;
        *row = event.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.rows.lock().unwrap().retain(|e| e.id != id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CalendarEvent>> {
        Ok(self.row(id))
    }

    async fn list_in_range(&self, user_id: &str, range: &DateRange) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|e| e.user_id == user_id && range.contains(e.start_time))
            .collect())
    }

    async fn find_by_remote_ids(
        &self,
        user_id: &str,
        remote_ids: &[String],
    ) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.remote_id.as_ref().is_some_and(|id| remote_ids.contains(id))
            })
            .collect())
    }

    async fn list_pending_push(&self, user_id: &str, range: &DateRange) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|e| {
                e.user_id == user_id
                    && range.contains(e.start_time)
                    && matches!(
                        e.sync_status,
                        SyncStatus::Local | SyncStatus::SyncFailed | SyncStatus::Deleted
                    )
            })
            .collect())
    }
}

// ============================================================================
// Sync log
// ============================================================================

#[derive(Default, Clone)]
pub struct MockSyncLogRepository {
    entries: Arc<Mutex<Vec<SyncLogEntry>>>,
}

impl MockSyncLogRepository {
    pub fn all(&self) -> Vec<SyncLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncLogRepository for MockSyncLogRepository {
    async fn insert(&self, entry: &SyncLogEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn finalize(&self, entry: &SyncLogEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let row = entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| CalSyncError::NotFound(format!("sync log {}", entry.id)))?;
        *row = entry.clone();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SyncLogEntry>> {
        Ok(self.all().into_iter().find(|e| e.id == id))
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SyncLogEntry>> {
        let mut entries: Vec<_> = self
            .all()
            .into_iter()
            .filter(|e| e.user_id == user_id && e.started_at >= from && e.started_at <= to)
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(entries)
    }

    async fn latest_for_user(&self, user_id: &str) -> Result<Option<SyncLogEntry>> {
        let entries =
            self.list_for_user(user_id, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC).await?;
        Ok(entries.into_iter().next())
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Default, Clone)]
pub struct MockCredentialStore {
    rows: Arc<Mutex<HashMap<String, Credentials>>>,
    journal: Journal,
}

impl MockCredentialStore {
    pub fn with_journal(journal: Journal) -> Self {
        Self { journal, ..Self::default() }
    }

    pub fn seed(&self, credentials: Credentials) {
        self.rows.lock().unwrap().insert(credentials.user_id().to_owned(), credentials);
    }

    pub fn current(&self, user_id: &str) -> Option<Credentials> {
        self.rows.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credentials>> {
        Ok(self.current(user_id))
    }

    async fn put(&self, credentials: &Credentials) -> Result<()> {
        self.journal.push("store.put");
        self.seed(credentials.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockRefresher {
    pub calls: AtomicUsize,
    pub reject: bool,
    /// Lifetime reported for refreshed tokens; one hour when unset.
    pub expires_in_secs: Option<i64>,
    journal: Journal,
}

impl MockRefresher {
    pub fn with_journal(journal: Journal) -> Self {
        Self { journal, ..Self::default() }
    }

    pub fn rejecting() -> Self {
        Self { reject: true, ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for MockRefresher {
    async fn refresh(&self, _refresh_token: &str) -> std::result::Result<RefreshedToken, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.push("refresh");
        if self.reject {
            return Err(RefreshError::Rejected("invalid_grant".into()));
        }
        Ok(RefreshedToken {
            access_token: format!("fresh-{n}"),
            refresh_token: None,
            expires_in_secs: self.expires_in_secs.unwrap_or(3600),
        })
    }
}

// ============================================================================
// Remote calendar
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    List,
    Create(String),
    Update(String),
    Delete(String),
}

/// Failure injection for [`MockRemote`]
#[derive(Default)]
pub struct RemoteBehavior {
    /// Requests carrying this token get a 401.
    pub rejected_token: Option<String>,
    pub list_error: Option<RemoteError>,
    pub create_error: Option<RemoteError>,
    pub update_error: Option<RemoteError>,
    pub delete_error: Option<RemoteError>,
    /// Remote ids whose delete reports 410.
    pub gone: Vec<String>,
    /// When set, each create waits for one permit before completing.
    pub create_gate: Option<Arc<Notify>>,
}

#[derive(Default)]
pub struct MockRemote {
    events: Mutex<Vec<RemoteEvent>>,
    calls: Mutex<Vec<RemoteCall>>,
    pub behavior: Mutex<RemoteBehavior>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    journal: Journal,
}

impl MockRemote {
    pub fn with_journal(journal: Journal) -> Self {
        Self { journal, ..Self::default() }
    }

    pub fn seed(&self, event: RemoteEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<RemoteEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_title(&self, remote_id: &str, title: &str) {
        if let Some(event) =
            self.events.lock().unwrap().iter_mut().find(|e| e.remote_id == remote_id)
        {
            event.title = Some(title.into());
        }
    }

    fn record(&self, call: RemoteCall, token: &AccessToken) -> std::result::Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        let behavior = self.behavior.lock().unwrap();
        match behavior.rejected_token.as_deref() {
            Some(rejected) if rejected == token.as_str() => Err(RemoteError::Auth),
            _ => Ok(()),
        }
    }

    fn to_remote(remote_id: String, event: &CalendarEvent) -> RemoteEvent {
        RemoteEvent {
            remote_id,
            title: Some(event.title.clone()),
            description: event.description.clone(),
            location: event.location.clone(),
            color: event.color.clone(),
            recurrence: event.recurrence_rule.iter().cloned().collect(),
            start: RemoteEventTime::at(event.start_time.to_rfc3339()),
            end: RemoteEventTime::at(event.end_time.to_rfc3339()),
        }
    }
}

#[async_trait]
impl RemoteCalendar for MockRemote {
    async fn list_events(
        &self,
        token: &AccessToken,
        range: &DateRange,
    ) -> std::result::Result<Vec<RemoteEvent>, RemoteError> {
        self.journal.push("remote.list");
        self.record(RemoteCall::List, token)?;
        if let Some(err) = self.behavior.lock().unwrap().list_error.clone() {
            return Err(err);
        }
        Ok(self
            .events()
            .into_iter()
            .filter(|e| {
                e.start
                    .date_time
                    .as_deref()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map_or(true, |start| range.contains(start.with_timezone(&Utc)))
            })
            .collect())
    }

    async fn create_event(
        &self,
        token: &AccessToken,
        event: &CalendarEvent,
    ) -> std::result::Result<String, RemoteError> {
        self.record(RemoteCall::Create(event.title.clone()), token)?;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let gate = self.behavior.lock().unwrap().create_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.behavior.lock().unwrap().create_error.clone() {
            return Err(err);
        }
        let remote_id = format!("g-new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.seed(Self::to_remote(remote_id.clone(), event));
        Ok(remote_id)
    }

    async fn update_event(
        &self,
        token: &AccessToken,
        remote_id: &str,
        event: &CalendarEvent,
    ) -> std::result::Result<(), RemoteError> {
        self.record(RemoteCall::Update(remote_id.into()), token)?;
        if let Some(err) = self.behavior.lock().unwrap().update_error.clone() {
            return Err(err);
        }
        let mut events = self.events.lock().unwrap();
        events.retain(|e| e.remote_id != remote_id);
        events.push(Self::to_remote(remote_id.into(), event));
        Ok(())
    }

    async fn delete_event(
        &self,
        token: &AccessToken,
        remote_id: &str,
    ) -> std::result::Result<DeleteOutcome, RemoteError> {
        self.record(RemoteCall::Delete(remote_id.into()), token)?;
        let behavior = self.behavior.lock().unwrap();
        if let Some(err) = behavior.delete_error.clone() {
            return Err(err);
        }
        if behavior.gone.iter().any(|id| id == remote_id) {
            return Ok(DeleteOutcome::AlreadyGone);
        }
        drop(behavior);
        self.events.lock().unwrap().retain(|e| e.remote_id != remote_id);
        Ok(DeleteOutcome::Deleted)
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub events: Arc<MockEventRepository>,
    pub logs: Arc<MockSyncLogRepository>,
    pub store: Arc<MockCredentialStore>,
    pub refresher: Arc<MockRefresher>,
    pub remote: Arc<MockRemote>,
    pub journal: Journal,
    pub orchestrator: Arc<SyncOrchestrator>,
}

pub struct HarnessBuilder {
    credentials: Option<Credentials>,
    reject_refresh: bool,
    refreshed_lifetime: Option<i64>,
    policy: SyncPolicy,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            credentials: Some(Credentials::new(USER, "valid", "refresh", Utc::now() + Duration::hours(1))),
            reject_refresh: false,
            refreshed_lifetime: None,
            policy: SyncPolicy::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn rejecting_refresh(mut self) -> Self {
        self.reject_refresh = true;
        self
    }

    pub fn refreshed_lifetime(mut self, secs: i64) -> Self {
        self.refreshed_lifetime = Some(secs);
        self
    }

    pub fn policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Harness {
        let journal = Journal::default();
        let store = Arc::new(MockCredentialStore::with_journal(journal.clone()));
        if let Some(credentials) = self.credentials {
            store.seed(credentials);
        }
        let refresher = Arc::new(MockRefresher {
            reject: self.reject_refresh,
            expires_in_secs: self.refreshed_lifetime,
            ..MockRefresher::with_journal(journal.clone())
        });
        let remote = Arc::new(MockRemote::with_journal(journal.clone()));
        let events = Arc::new(MockEventRepository::default());
        let logs = Arc::new(MockSyncLogRepository::default());

        let credentials = Arc::new(CredentialManager::new(store.clone(), refresher.clone()));
        let orchestrator = Arc::new(
            SyncOrchestrator::new(events.clone(), logs.clone(), credentials, remote.clone())
                .with_policy(self.policy),
        );

        Harness { events, logs, store, refresher, remote, journal, orchestrator }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::default().build()
}
