//! # CalSync Infrastructure
//!
//! Infrastructure implementations of the core calendar ports.
//!
//! This crate contains:
//! - SQLite repositories for events, sync logs and credentials
//! - The HTTP client with bounded retry
//! - The Google Calendar adapter and OAuth refresh client
//! - Configuration loading
//! - The cron-driven automatic sync scheduler
//!
//! ## Architecture
//! - Implements traits defined in `calsync-core`
//! - Depends on `calsync-domain` and `calsync-core`
//! - Contains all "impure" code (I/O, network, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
pub use http::*;
pub use integrations::calendar::{GoogleCalendarClient, GoogleTokenRefresher};
pub use scheduling::{CalendarScheduler, CalendarSchedulerConfig, SchedulerError};
