//! OAuth credentials held per user.
//!
//! Token material is only reachable through accessors and never shows up in
//! `Debug` output.

use chrono::{DateTime, Duration, Utc};

/// Bearer token handed to the remote adapter for a single call.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Access/refresh token pair with its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user_id: String,
    access_token: AccessToken,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: AccessToken::new(access_token),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Expiry instant for a token issued at `now` that lives `expires_in_secs`.
    ///
    /// `None` when the lifetime is not positive or overflows the calendar.
    pub fn expiry_after(now: DateTime<Utc>, expires_in_secs: i64) -> Option<DateTime<Utc>> {
        if expires_in_secs <= 0 {
            return None;
        }
        Duration::try_seconds(expires_in_secs).and_then(|lifetime| now.checked_add_signed(lifetime))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True when the token expires within `window` of `now` (or already has).
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + window
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("access_token", &self.access_token)
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
