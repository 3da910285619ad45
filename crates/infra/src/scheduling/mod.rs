//! Scheduling infrastructure for automatic calendar sync
//!
//! The scheduler follows the same runtime rules as every long-lived task in
//! this crate:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on all async operations

pub mod calendar_scheduler;
pub mod error;

pub use calendar_scheduler::{CalendarScheduler, CalendarSchedulerConfig, SyncBatchReport};
pub use error::{SchedulerError, SchedulerResult};
