//! Calendar synchronization
//!
//! Reconciles locally stored events with a remote calendar. A run pulls the
//! remote window into the local store, then pushes pending local changes back,
//! and records the outcome in the sync log.

pub mod credentials;
pub mod diff;
pub mod orchestrator;
pub mod ports;
pub mod scheduling;
pub mod single_flight;
pub mod validator;
