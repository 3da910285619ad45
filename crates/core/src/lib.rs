//! # CalSync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for storage, credentials and the remote
//!   calendar
//! - The event validator and the pull/push diff engine
//! - The credential manager, sync orchestrator and collaborator-facing event
//!   scheduler
//!
//! ## Architecture Principles
//! - Only depends on `calsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod calendar;

pub use calendar::credentials::CredentialManager;
pub use calendar::diff::{PullDecision, PushDecision};
pub use calendar::orchestrator::{RunState, SyncOrchestrator, SyncPolicy, SyncRequest, SyncSummary};
pub use calendar::ports::{
    CalendarEventRepository, CredentialStore, DeleteOutcome, RefreshError, RefreshedToken,
    RemoteCalendar, RemoteError, SyncLogRepository, TokenRefresher,
};
pub use calendar::scheduling::{EventScheduler, ScheduleEventRequest, TaskPriority, TaskSchedule};
