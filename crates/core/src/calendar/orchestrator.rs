//! Sync orchestrator
//!
//! Sequences one sync run for a user:
//!
//! 1. Validate the request and claim the user's single-flight slot
//! 2. Open an `in_progress` sync log entry
//! 3. Load and, if close to expiry, refresh credentials
//! 4. Pull: plan against the remote window and commit to the local store
//! 5. Push: create/update/delete pending local rows remotely
//! 6. Purge rows the pull found absent remotely, even when the run was
//!    cancelled or aborted
//! 7. Finalize the log entry and release the slot
//!
//! Per-event failures are collected and never stop the run. Only
//! `ReconnectRequired` (revoked grant, missing scope, unobtainable
//! credentials) aborts it.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use calsync_domain::constants::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_CONCURRENCY, MAX_CONCURRENCY, STATUS_CHANNEL_CAPACITY,
};
use calsync_domain::{
    AccessToken, CalSyncError, CalendarEvent, Credentials, DateRange, Result, RunStatus,
    SyncConfig, SyncCounts, SyncDirection, SyncLogEntry, SyncStatus, SyncStatusChanged, SyncType,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::credentials::CredentialManager;
use super::diff::{plan_pull, plan_push, PullDecision, PushDecision};
use super::ports::{CalendarEventRepository, RemoteCalendar, RemoteError, SyncLogRepository};
use super::single_flight::SingleFlight;
use super::validator::validate_event;

/// Tunable run policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Error count at which a run is recorded as `failed` rather than
    /// `partial`.
    pub failure_threshold: usize,
    /// Events processed concurrently within one phase.
    pub max_concurrency: usize,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self { failure_threshold: DEFAULT_FAILURE_THRESHOLD, max_concurrency: DEFAULT_MAX_CONCURRENCY }
    }
}

impl From<&SyncConfig> for SyncPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            max_concurrency: config.effective_concurrency(),
        }
    }
}

/// Parameters of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub user_id: String,
    /// Identity that asked for the run; must match `user_id`.
    pub requested_by: String,
    pub range: DateRange,
    pub direction: SyncDirection,
    pub sync_type: SyncType,
}

impl SyncRequest {
    /// Run requested by the user themselves.
    pub fn manual(user_id: impl Into<String>, range: DateRange, direction: SyncDirection) -> Self {
        let user_id = user_id.into();
        Self {
            requested_by: user_id.clone(),
            user_id,
            range,
            direction,
            sync_type: SyncType::Manual,
        }
    }

    /// Run started by the scheduler on the user's behalf.
    pub fn automatic(user_id: impl Into<String>, range: DateRange, direction: SyncDirection) -> Self {
        Self { sync_type: SyncType::Auto, ..Self::manual(user_id, range, direction) }
    }

    pub fn requested_by(mut self, requester: impl Into<String>) -> Self {
        self.requested_by = requester.into();
        self
    }
}

/// Aggregated result handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub log_id: String,
    pub status: RunStatus,
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub errors: Vec<String>,
    /// The user must re-authorize the calendar before syncing again.
    pub reconnect_required: bool,
    pub cancelled: bool,
}

/// Whether a user currently has a run in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

/// Sync orchestrator
pub struct SyncOrchestrator {
    events: Arc<dyn CalendarEventRepository>,
    logs: Arc<dyn SyncLogRepository>,
    credentials: Arc<CredentialManager>,
    remote: Arc<dyn RemoteCalendar>,
    policy: SyncPolicy,
    flights: SingleFlight,
    status_tx: broadcast::Sender<SyncStatusChanged>,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default policy.
    pub fn new(
        events: Arc<dyn CalendarEventRepository>,
        logs: Arc<dyn SyncLogRepository>,
        credentials: Arc<CredentialManager>,
        remote: Arc<dyn RemoteCalendar>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            events,
            logs,
            credentials,
            remote,
            policy: SyncPolicy::default(),
            flights: SingleFlight::new(),
            status_tx,
        }
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = SyncPolicy {
            failure_threshold: policy.failure_threshold.max(1),
            max_concurrency: policy.max_concurrency.clamp(1, MAX_CONCURRENCY),
        };
        self
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Receive a notification for every status transition a run performs.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatusChanged> {
        self.status_tx.subscribe()
    }

    pub fn run_state(&self, user_id: &str) -> RunState {
        if self.flights.is_active(user_id) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// Ask the in-flight run for `user_id` to stop after the events it is
    /// currently processing. Returns `false` when no run is active.
    pub fn cancel(&self, user_id: &str) -> bool {
        let signalled = self.flights.cancel(user_id);
        if signalled {
            info!(user_id, "sync cancellation requested");
        }
        signalled
    }

    /// Sync history for `user_id`, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SyncLogEntry>> {
        self.logs.list_for_user(user_id, from, to).await
    }

    pub async fn last_run(&self, user_id: &str) -> Result<Option<SyncLogEntry>> {
        self.logs.latest_for_user(user_id).await
    }

    /// Execute one sync run.
    ///
    /// # Errors
    /// - `InvalidInput` when the range is inverted
    /// - `PermissionDenied` when the requester is not the target user
    /// - `AlreadyInProgress` when the user already has a run in flight
    /// - storage errors while opening the sync log
    ///
    /// Every failure after the log entry exists is reported in the returned
    /// summary instead.
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, direction = %request.direction, sync_type = %request.sync_type)
    )]
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncSummary> {
        request.range.validate()?;
        if request.requested_by != request.user_id {
            return Err(CalSyncError::PermissionDenied(format!(
                "{} may not sync calendar of {}",
                request.requested_by, request.user_id
            )));
        }

        let guard = self
            .flights
            .try_acquire(&request.user_id)
            .ok_or_else(|| CalSyncError::AlreadyInProgress(request.user_id.clone()))?;

        let mut log = SyncLogEntry::start(&request.user_id, request.sync_type, request.direction);
        self.logs.insert(&log).await?;
        info!(log_id = %log.id, "sync run started");

        let credentials = match self.obtain_credentials(&request.user_id).await {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(error = %err, "credentials unavailable, aborting run");
                let mut tally = Tally::default();
                tally.abort(err);
                return Ok(self.finalize(&mut log, tally, false).await);
            }
        };

        let run = RunContext {
            user_id: request.user_id.clone(),
            direction: request.direction,
            credentials: RwLock::new(credentials),
            stop: guard.cancellation().child_token(),
            cancelled: guard.cancellation().clone(),
        };

        let mut tally = Tally::default();
        let mut absent = HashSet::new();

        if request.direction.includes_pull() {
            absent = self.pull(&run, &request.range, &mut tally).await;
        }

        if request.direction.includes_push() && !run.halted(&tally) {
            self.push(&run, &request.range, &absent, &mut tally).await;
        }

        // Local-only cleanup, so it runs on aborted and cancelled runs too.
        self.purge_absent(absent, &mut tally, &run.stop).await;

        let summary = self.finalize(&mut log, tally, run.cancelled.is_cancelled()).await;
        drop(guard);
        Ok(summary)
    }

    async fn obtain_credentials(&self, user_id: &str) -> Result<Credentials> {
        let credentials = self.credentials.get(user_id).await.map_err(|err| match err {
            CalSyncError::NotFound(message) => CalSyncError::ReconnectRequired(message),
            other => other,
        })?;
        self.credentials.refresh_if_needed(credentials).await
    }

    /// Pull phase. Returns the ids soft-deleted because the remote no longer
    /// lists them; they are purged after the push phase.
    async fn pull(&self, run: &RunContext, range: &DateRange, tally: &mut Tally) -> HashSet<String> {
        let remote = &self.remote;
        let remote_events = match run
            .call_remote(&self.credentials, |token| async move {
                remote.list_events(&token, range).await
            })
            .await
        {
            Ok(events) => events,
            Err(err) => {
                error!(user_id = %run.user_id, error = %err, "listing remote events failed");
                tally.fail_or_abort("pull", "list", err, &run.stop);
                return HashSet::new();
            }
        };

        let local = match self.load_local(&run.user_id, range, &remote_events).await {
            Ok(local) => local,
            Err(err) => {
                tally.fail_or_abort("pull", "load", err, &run.stop);
                return HashSet::new();
            }
        };

        let decisions = plan_pull(&run.user_id, range, &remote_events, &local);
        debug!(
            user_id = %run.user_id,
            remote = remote_events.len(),
            local = local.len(),
            decisions = decisions.len(),
            "pull planned"
        );

        let mut absent = HashSet::new();
        let mut outcomes = stream::iter(decisions)
            .map(|decision| self.apply_pull(run, decision))
            .buffer_unordered(self.policy.max_concurrency);

        while let Some(outcome) = outcomes.next().await {
            if let Outcome::MarkedAbsent(id) = &outcome {
                absent.insert(id.clone());
            }
            tally.record(outcome, &run.stop);
        }

        absent
    }

    async fn load_local(
        &self,
        user_id: &str,
        range: &DateRange,
        remote_events: &[calsync_domain::RemoteEvent],
    ) -> Result<Vec<CalendarEvent>> {
        let mut local = self.events.list_in_range(user_id, range).await?;
        let known: HashSet<&str> = local.iter().filter_map(|e| e.remote_id.as_deref()).collect();
        let outside: Vec<String> = remote_events
            .iter()
            .map(|e| e.remote_id.clone())
            .filter(|id| !known.contains(id.as_str()))
            .collect();

        if !outside.is_empty() {
            let matched = self.events.find_by_remote_ids(user_id, &outside).await?;
            local.extend(matched);
        }
        Ok(local)
    }

    async fn apply_pull(&self, run: &RunContext, decision: PullDecision) -> Outcome {
        if run.stop.is_cancelled() {
            return Outcome::Skipped;
        }

        let now = Utc::now();
        match decision {
            PullDecision::CreateLocal(pulled) => {
                let event = pulled.to_local(&run.user_id, now);
                match self.events.insert(&event).await {
                    Ok(()) => {
                        self.notify(&event);
                        Outcome::Created
                    }
                    Err(err) => Outcome::failed("create local", &pulled.remote_id, err),
                }
            }
            PullDecision::UpdateLocal { mut local, remote } => {
                remote.apply_to(&mut local);
                local.mark_synced(remote.remote_id.clone(), now);
                match self.events.update(&local).await {
                    Ok(()) => {
                        self.notify(&local);
                        Outcome::Updated
                    }
                    Err(err) => Outcome::failed("update local", &local.id, err),
                }
            }
            PullDecision::NoOp { mut local } => {
                let was_synced = local.sync_status == SyncStatus::Synced;
                local.sync_status = SyncStatus::Synced;
                local.last_synced_at = Some(now);
                match self.events.update(&local).await {
                    Ok(()) => {
                        if !was_synced {
                            self.notify(&local);
                        }
                        Outcome::Unchanged
                    }
                    Err(err) => Outcome::failed("touch local", &local.id, err),
                }
            }
            PullDecision::PendingDelete { .. } => Outcome::Unchanged,
            PullDecision::RemoteAbsent { mut local } => {
                if run.direction == SyncDirection::Bidirectional {
                    local.sync_status = SyncStatus::Deleted;
                    match self.events.update(&local).await {
                        Ok(()) => {
                            self.notify(&local);
                            Outcome::MarkedAbsent(local.id)
                        }
                        Err(err) => Outcome::failed("soft-delete local", &local.id, err),
                    }
                } else {
                    match self.events.delete(&local.id).await {
                        Ok(()) => {
                            local.sync_status = SyncStatus::Deleted;
                            self.notify(&local);
                            Outcome::Deleted
                        }
                        Err(err) => Outcome::failed("delete local", &local.id, err),
                    }
                }
            }
            PullDecision::Invalid { remote_id, errors } => {
                Outcome::failed("validate remote", &remote_id, errors.into())
            }
        }
    }

    async fn push(
        &self,
        run: &RunContext,
        range: &DateRange,
        absent: &HashSet<String>,
        tally: &mut Tally,
    ) {
        let pending = match self.events.list_pending_push(&run.user_id, range).await {
            Ok(pending) => pending,
            Err(err) => {
                tally.fail_or_abort("push", "load", err, &run.stop);
                return;
            }
        };

        let decisions = plan_push(pending, absent);
        debug!(user_id = %run.user_id, decisions = decisions.len(), "push planned");

        let mut outcomes = stream::iter(decisions)
            .map(|decision| self.apply_push(run, decision))
            .buffer_unordered(self.policy.max_concurrency);

        while let Some(outcome) = outcomes.next().await {
            tally.record(outcome, &run.stop);
        }
    }

    async fn apply_push(&self, run: &RunContext, decision: PushDecision) -> Outcome {
        if run.stop.is_cancelled() {
            return Outcome::Skipped;
        }

        match decision {
            PushDecision::CreateRemote(event) => self.push_create(run, event).await,
            PushDecision::UpdateRemote(event) => self.push_update(run, event).await,
            PushDecision::DeleteRemote(event) => {
                let Some(remote_id) = event.remote_id.clone() else {
                    return Outcome::Skipped;
                };
                let (remote, target) = (&self.remote, remote_id.as_str());
                let result = run
                    .call_remote(&self.credentials, |token| async move {
                        remote.delete_event(&token, target).await
                    })
                    .await;

                match result {
                    Ok(outcome) => {
                        debug!(event_id = %event.id, ?outcome, "remote delete confirmed");
                        match self.events.delete(&event.id).await {
                            Ok(()) => Outcome::Deleted,
                            Err(err) => Outcome::failed("delete local", &event.id, err),
                        }
                    }
                    Err(err) => Outcome::failed("delete remote", &event.id, err),
                }
            }
            PushDecision::PurgeLocal(event) => match self.events.delete(&event.id).await {
                Ok(()) => Outcome::Deleted,
                Err(err) => Outcome::failed("delete local", &event.id, err),
            },
        }
    }

    async fn push_create(&self, run: &RunContext, mut event: CalendarEvent) -> Outcome {
        if let Err(errors) = validate_event(&event) {
            return self.mark_failed(event, "validate local", errors.into()).await;
        }

        let (remote, draft) = (&self.remote, &event);
        let result = run
            .call_remote(&self.credentials, |token| async move {
                remote.create_event(&token, draft).await
            })
            .await;

        match result {
            Ok(remote_id) => {
                event.mark_synced(remote_id, Utc::now());
                match self.events.update(&event).await {
                    Ok(()) => {
                        self.notify(&event);
                        Outcome::Created
                    }
                    Err(err) => Outcome::failed("write back remote id", &event.id, err),
                }
            }
            Err(err) => self.mark_failed(event, "create remote", err).await,
        }
    }

    async fn push_update(&self, run: &RunContext, mut event: CalendarEvent) -> Outcome {
        if let Err(errors) = validate_event(&event) {
            return self.mark_failed(event, "validate local", errors.into()).await;
        }
        let Some(remote_id) = event.remote_id.clone() else {
            return Outcome::Skipped;
        };

        let (remote, draft, target) = (&self.remote, &event, remote_id.as_str());
        let result = run
            .call_remote(&self.credentials, |token| async move {
                remote.update_event(&token, target, draft).await
            })
            .await;

        match result {
            Ok(()) => {
                event.mark_synced(remote_id, Utc::now());
                match self.events.update(&event).await {
                    Ok(()) => {
                        self.notify(&event);
                        Outcome::Updated
                    }
                    Err(err) => Outcome::failed("mark synced", &event.id, err),
                }
            }
            Err(err) => self.mark_failed(event, "update remote", err).await,
        }
    }

    /// Record a push failure on the row so the next push retries it.
    async fn mark_failed(&self, mut event: CalendarEvent, action: &str, err: CalSyncError) -> Outcome {
        if !err.requires_reconnect() && event.sync_status != SyncStatus::SyncFailed {
            event.sync_status = SyncStatus::SyncFailed;
            match self.events.update(&event).await {
                Ok(()) => self.notify(&event),
                Err(store_err) => {
                    warn!(event_id = %event.id, error = %store_err, "could not mark event sync_failed");
                }
            }
        }
        Outcome::failed(action, &event.id, err)
    }

    /// Hard-delete rows the pull soft-deleted. Left behind, they would turn
    /// into remote deletes on the next push.
    async fn purge_absent(&self, absent: HashSet<String>, tally: &mut Tally, stop: &CancellationToken) {
        for id in absent {
            let outcome = match self.events.delete(&id).await {
                Ok(()) => Outcome::Deleted,
                Err(err) => Outcome::failed("purge local", &id, err),
            };
            tally.record(outcome, stop);
        }
    }

    async fn finalize(&self, log: &mut SyncLogEntry, tally: Tally, cancelled: bool) -> SyncSummary {
        let reconnect_required = tally.aborted_by.as_ref().is_some_and(CalSyncError::requires_reconnect);
        let status = if tally.aborted_by.is_some() {
            RunStatus::Failed
        } else if cancelled {
            RunStatus::Partial
        } else {
            RunStatus::from_error_count(tally.errors.len(), self.policy.failure_threshold)
        };

        log.finalize(status, tally.counts, tally.errors);
        if let Err(err) = self.logs.finalize(log).await {
            error!(log_id = %log.id, error = %err, "failed to finalize sync log");
        }

        info!(
            log_id = %log.id,
            status = %status,
            created = log.events_created,
            updated = log.events_updated,
            deleted = log.events_deleted,
            errors = log.errors.len(),
            cancelled,
            "sync run finished"
        );

        SyncSummary {
            log_id: log.id.clone(),
            status,
            created: log.events_created,
            updated: log.events_updated,
            deleted: log.events_deleted,
            errors: log.errors.clone(),
            reconnect_required,
            cancelled,
        }
    }

    fn notify(&self, event: &CalendarEvent) {
        // No subscribers is fine.
        let _ = self.status_tx.send(SyncStatusChanged {
            event_id: event.id.clone(),
            user_id: event.user_id.clone(),
            status: event.sync_status,
        });
    }
}

/// State shared by every event task of one run
struct RunContext {
    user_id: String,
    direction: SyncDirection,
    credentials: RwLock<Credentials>,
    /// Stops remaining event tasks on abort or caller cancellation.
    stop: CancellationToken,
    /// Caller cancellation only.
    cancelled: CancellationToken,
}

impl RunContext {
    fn halted(&self, tally: &Tally) -> bool {
        tally.aborted_by.is_some() || self.stop.is_cancelled()
    }

    /// Invoke a remote operation. A 401 triggers exactly one credential
    /// refresh and one retry of the same call.
    async fn call_remote<T, F, Fut>(&self, manager: &CredentialManager, op: F) -> Result<T>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        let current = self.credentials.read().await.clone();
        match op(current.access_token().clone()).await {
            Err(RemoteError::Auth) => {
                debug!(user_id = %self.user_id, "access token rejected, refreshing once");
                let renewed = manager.force_refresh(&current).await?;
                let token = renewed.access_token().clone();
                *self.credentials.write().await = renewed;
                op(token).await.map_err(CalSyncError::from)
            }
            other => other.map_err(CalSyncError::from),
        }
    }
}

/// Result of processing a single event
#[derive(Debug)]
enum Outcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
    MarkedAbsent(String),
    Skipped,
    Failed(CalSyncError, String),
}

impl Outcome {
    fn failed(action: &str, subject: &str, err: CalSyncError) -> Self {
        let message = format!("{action} {subject}: {err}");
        Self::Failed(err, message)
    }
}

#[derive(Debug, Default)]
struct Tally {
    counts: SyncCounts,
    errors: Vec<String>,
    aborted_by: Option<CalSyncError>,
}

impl Tally {
    fn record(&mut self, outcome: Outcome, stop: &CancellationToken) {
        match outcome {
            Outcome::Created => self.counts.created += 1,
            Outcome::Updated => self.counts.updated += 1,
            Outcome::Deleted => self.counts.deleted += 1,
            Outcome::Unchanged | Outcome::MarkedAbsent(_) | Outcome::Skipped => {}
            Outcome::Failed(err, message) => {
                if err.requires_reconnect() {
                    stop.cancel();
                    self.errors.push(message);
                    self.aborted_by.get_or_insert(err);
                } else {
                    self.errors.push(message);
                }
            }
        }
    }

    fn fail_or_abort(&mut self, phase: &str, action: &str, err: CalSyncError, stop: &CancellationToken) {
        self.record(Outcome::failed(phase, action, err), stop);
    }

    fn abort(&mut self, err: CalSyncError) {
        self.errors.push(err.to_string());
        self.aborted_by = Some(err);
    }
}
