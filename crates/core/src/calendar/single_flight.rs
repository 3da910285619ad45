//! Per-user single-flight registry for sync runs.
//!
//! At most one run per user is active. The returned [`FlightGuard`] releases
//! the slot on drop, so every exit path of a run (success, abort, panic,
//! cancellation) frees it.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Registry of in-flight runs keyed by user id
#[derive(Debug, Default, Clone)]
pub struct SingleFlight {
    active: Arc<DashMap<String, CancellationToken>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `user_id`, or `None` if a run already holds it.
    pub fn try_acquire(&self, user_id: &str) -> Option<FlightGuard> {
        match self.active.entry(user_id.to_owned()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                Some(FlightGuard {
                    active: Arc::clone(&self.active),
                    user_id: user_id.to_owned(),
                    token,
                })
            }
        }
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.active.contains_key(user_id)
    }

    /// Signal cancellation to the run holding `user_id`'s slot.
    pub fn cancel(&self, user_id: &str) -> bool {
        match self.active.get(user_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Held for the duration of one run
#[derive(Debug)]
pub struct FlightGuard {
    active: Arc<DashMap<String, CancellationToken>>,
    user_id: String,
    token: CancellationToken,
}

impl FlightGuard {
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.active.remove(&self.user_id);
    }
}
