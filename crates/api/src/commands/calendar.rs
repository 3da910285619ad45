//! Calendar sync commands

use calsync_core::calendar::validator::validate_user_id;
use calsync_core::{ScheduleEventRequest, SyncRequest, SyncSummary, TaskSchedule};
use calsync_domain::{
    CalSyncError, Credentials, DateRange, Result, SyncDirection, SyncLogEntry, SyncStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::command_helpers::execute_command;
use crate::AppContext;

/// Token pair handed over after the user completed the OAuth consent flow
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: i64,
}

impl std::fmt::Debug for CalendarTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarTokens")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish_non_exhaustive()
    }
}

/// Run one manual sync for `user_id` over `[start, end)`.
pub async fn trigger_sync(
    ctx: &AppContext,
    user_id: &str,
    requested_by: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    direction: SyncDirection,
) -> Result<SyncSummary> {
    execute_command("calendar::trigger_sync", || async move {
        let range = DateRange::new(start, end)?;
        let request = SyncRequest::manual(user_id, range, direction).requested_by(requested_by);
        let summary = ctx.orchestrator.sync(request).await?;
        info!(
            user_id,
            status = %summary.status,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            errors = summary.errors.len(),
            "manual sync finished"
        );
        Ok(summary)
    })
    .await
}

/// Ask the user's in-flight run to stop. Returns `false` when none is active.
pub async fn cancel_sync(ctx: &AppContext, user_id: &str) -> Result<bool> {
    execute_command("calendar::cancel_sync", || async move { Ok(ctx.orchestrator.cancel(user_id)) })
        .await
}

pub async fn schedule_event(
    ctx: &AppContext,
    user_id: &str,
    request: ScheduleEventRequest,
) -> Result<String> {
    execute_command("calendar::schedule_event", || async move {
        ctx.event_scheduler.schedule_event(user_id, request).await
    })
    .await
}

pub async fn schedule_task(ctx: &AppContext, user_id: &str, task: TaskSchedule) -> Result<String> {
    execute_command("calendar::schedule_task", || async move {
        ctx.event_scheduler.schedule_task(user_id, task).await
    })
    .await
}

pub async fn get_event_sync_status(
    ctx: &AppContext,
    user_id: &str,
    event_id: &str,
) -> Result<SyncStatus> {
    execute_command("calendar::get_event_sync_status", || async move {
        ctx.event_scheduler.event_status(user_id, event_id).await
    })
    .await
}

/// Sync runs started within `[from, to]`, newest first.
pub async fn get_sync_history(
    ctx: &AppContext,
    user_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<SyncLogEntry>> {
    execute_command("calendar::get_sync_history", || async move {
        if from > to {
            return Err(CalSyncError::InvalidInput("history window start is after its end".into()));
        }
        ctx.orchestrator.history(user_id, from, to).await
    })
    .await
}

/// Store the tokens from a completed OAuth consent flow.
pub async fn connect_calendar(ctx: &AppContext, user_id: &str, tokens: CalendarTokens) -> Result<()> {
    execute_command("calendar::connect_calendar", || async move {
        validate_user_id(user_id).map_err(|err| CalSyncError::Validation(err.to_string()))?;
        if tokens.access_token.trim().is_empty() || tokens.refresh_token.trim().is_empty() {
            return Err(CalSyncError::InvalidInput("access and refresh tokens are required".into()));
        }
        if tokens.expires_in_secs <= 0 {
            return Err(CalSyncError::InvalidInput("expires_in_secs must be positive".into()));
        }
        let expires_at = Credentials::expiry_after(Utc::now(), tokens.expires_in_secs)
            .ok_or_else(|| CalSyncError::InvalidInput("expires_in_secs is out of range".into()))?;

        let credentials =
            Credentials::new(user_id, tokens.access_token, tokens.refresh_token, expires_at);
        ctx.credentials.connect(credentials).await
    })
    .await
}
