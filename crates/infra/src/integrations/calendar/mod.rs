//! Google Calendar integration
//!
//! Provides the REST adapter behind the `RemoteCalendar` port and the OAuth
//! refresh client behind the `TokenRefresher` port.

pub mod google;
pub mod oauth;

pub use google::GoogleCalendarClient;
pub use oauth::GoogleTokenRefresher;
