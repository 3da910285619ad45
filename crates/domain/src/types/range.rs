use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{CalSyncError, Result};

/// Time window a sync run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Window of `lookback` days before and `lookahead` days after `now`.
    pub fn around(now: DateTime<Utc>, lookback_days: i64, lookahead_days: i64) -> Self {
        Self {
            start: now - Duration::days(lookback_days.max(0)),
            end: now + Duration::days(lookahead_days.max(0)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(CalSyncError::InvalidInput(format!(
                "range start {} is after end {}",
                self.start.to_rfc3339(),
                self.end.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Half-open membership test, `[start, end)`, matching how the remote
    /// service bounds `timeMin`/`timeMax`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}
