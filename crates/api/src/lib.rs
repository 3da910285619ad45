//! # CalSync API
//!
//! Application layer - commands and the daemon entry point.
//!
//! This crate contains:
//! - Commands consumed by UI and tooling (sync control, event scheduling,
//!   sync history, calendar connection)
//! - Application context (dependency injection)
//! - Logging bootstrap
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod commands;
pub mod context;
pub mod utils;

// Re-export for convenience
pub use commands::*;
pub use context::*;
