//! Commands - UI and tooling bridge to the sync engine

mod calendar;

pub use calendar::*;
