//! Cron-driven automatic calendar sync.
//!
//! Every tick runs a bidirectional `auto` sync for each configured user over
//! a window around the current time. Join handles are tracked, cancellation
//! is explicit, and every asynchronous lifecycle operation is wrapped in a
//! timeout. A run that outlives `job_timeout` is cancelled and awaited so its
//! log entry is finalized.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use calsync_core::SyncOrchestrator;
//! use calsync_infra::scheduling::{CalendarScheduler, CalendarSchedulerConfig, SchedulerResult};
//!
//! # async fn example(orchestrator: Arc<SyncOrchestrator>) -> SchedulerResult<()> {
//! let mut scheduler = CalendarScheduler::new(
//!     CalendarSchedulerConfig {
//!         cron_expression: "0 */15 * * * *".into(),
//!         user_ids: vec!["0b6c4e0e-3f61-4c0a-9d55-5f4f0a6f2a11".into()],
//!         ..Default::default()
//!     },
//!     orchestrator,
//! );
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use calsync_core::{SyncOrchestrator, SyncRequest};
use calsync_domain::constants::{
    DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_LOOKAHEAD_DAYS, DEFAULT_LOOKBACK_DAYS, DEFAULT_SYNC_CRON,
};
use calsync_domain::{CalSyncError, DateRange, RunStatus, SyncConfig, SyncDirection};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the calendar scheduler.
#[derive(Debug, Clone)]
pub struct CalendarSchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    pub user_ids: Vec<String>,
    pub lookback_days: i64,
    pub lookahead_days: i64,
    /// Timeout applied to one user's sync run.
    pub job_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for CalendarSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: DEFAULT_SYNC_CRON.into(),
            user_ids: Vec::new(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SyncConfig> for CalendarSchedulerConfig {
    fn from(sync: &SyncConfig) -> Self {
        Self {
            cron_expression: sync.cron_expression.clone(),
            user_ids: sync.user_ids.clone(),
            lookback_days: sync.lookback_days,
            lookahead_days: sync.lookahead_days,
            job_timeout: Duration::from_secs(sync.job_timeout_secs),
            ..Self::default()
        }
    }
}

/// Outcome of one tick across all configured users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatchReport {
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    /// Users skipped because a run was already in flight.
    pub skipped: usize,
    pub timed_out: usize,
}

impl SyncBatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.partial + self.failed + self.skipped + self.timed_out
    }
}

/// Automatic sync scheduler with explicit lifecycle management.
pub struct CalendarScheduler {
    scheduler: Option<JobScheduler>,
    config: CalendarSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    orchestrator: Arc<SyncOrchestrator>,
}

impl CalendarScheduler {
    pub fn new(config: CalendarSchedulerConfig, orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            orchestrator,
        }
    }

    pub fn config(&self) -> &CalendarSchedulerConfig {
        &self.config
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?
            .map_err(|source| SchedulerError::StartFailed { source })?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        self.monitor_handle = Some(tokio::spawn(Self::monitor_task(cancel)));

        info!(users = self.config.user_ids.len(), "Calendar scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation.cancel();

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?
            .map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("Calendar scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Run one tick immediately, outside the cron schedule.
    pub async fn run_now(&self) -> SyncBatchReport {
        Self::sync_users(self.orchestrator.clone(), self.config.clone()).await
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;
        let orchestrator = self.orchestrator.clone();
        let config = self.config.clone();

        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let orchestrator = orchestrator.clone();
            let config = config.clone();

            Box::pin(async move {
                let started = Instant::now();
                let report = Self::sync_users(orchestrator, config).await;
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    succeeded = report.succeeded,
                    partial = report.partial,
                    failed = report.failed,
                    skipped = report.skipped,
                    timed_out = report.timed_out,
                    "Automatic calendar sync finished"
                );
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, %job_id, "Registered calendar sync job");
        Ok(scheduler)
    }

    async fn sync_users(
        orchestrator: Arc<SyncOrchestrator>,
        config: CalendarSchedulerConfig,
    ) -> SyncBatchReport {
        let mut report = SyncBatchReport::default();
        if config.user_ids.is_empty() {
            debug!("No users configured for automatic calendar sync");
            return report;
        }

        let range = DateRange::around(Utc::now(), config.lookback_days, config.lookahead_days);

        for user_id in &config.user_ids {
            let request = SyncRequest::automatic(user_id, range, SyncDirection::Bidirectional);
            let mut run = Box::pin(orchestrator.sync(request));
            match tokio::time::timeout(config.job_timeout, &mut run).await {
                Ok(Ok(summary)) => match summary.status {
                    RunStatus::Success => report.succeeded += 1,
                    RunStatus::Partial => report.partial += 1,
                    _ => {
                        report.failed += 1;
                        if summary.reconnect_required {
                            warn!(user_id = %user_id, "Calendar needs to be reconnected");
                        }
                    }
                },
                Ok(Err(CalSyncError::AlreadyInProgress(_))) => {
                    debug!(user_id = %user_id, "Sync already in progress, skipping");
                    report.skipped += 1;
                }
                Ok(Err(err)) => {
                    warn!(user_id = %user_id, error = %err, "Automatic calendar sync failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(
                        user_id = %user_id,
                        timeout_ms = config.job_timeout.as_millis(),
                        "Automatic calendar sync timed out, cancelling"
                    );
                    // Cancelled runs stop after their in-flight calls and close their log entry.
                    orchestrator.cancel(user_id);
                    match run.await {
                        Ok(summary) => {
                            debug!(user_id = %user_id, status = %summary.status, "Timed out sync wound down");
                        }
                        Err(err) => {
                            warn!(user_id = %user_id, error = %err, "Timed out sync failed while winding down");
                        }
                    }
                    report.timed_out += 1;
                }
            }
        }

        report
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Calendar scheduler monitor cancelled");
    }
}

impl Drop for CalendarScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("CalendarScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
