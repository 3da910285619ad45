//! Domain types and models

pub mod credentials;
pub mod event;
pub mod range;
pub mod remote;
pub mod sync_log;

pub use credentials::{AccessToken, Credentials};
pub use event::{CalendarEvent, DomainLink, DomainLinks, EventFields, SyncStatus, SyncStatusChanged};
pub use range::DateRange;
pub use remote::{RemoteEvent, RemoteEventTime};
pub use sync_log::{RunStatus, SyncCounts, SyncDirection, SyncLogEntry, SyncType};
