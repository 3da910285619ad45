//! Diff & reconciliation engine
//!
//! Pure planning functions. The orchestrator turns each decision into store
//! writes or remote calls; nothing here performs I/O.

use std::collections::{HashMap, HashSet};

use calsync_domain::{CalendarEvent, DateRange, RemoteEvent, SyncStatus};

use super::validator::{validate_remote, PulledEvent, ValidationErrors};

/// Pull-side decision for one remote event or one orphaned local row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullDecision {
    /// No local row carries this remote id.
    CreateLocal(PulledEvent),
    /// Local row differs in at least one compared field.
    UpdateLocal { local: CalendarEvent, remote: PulledEvent },
    /// Fields match; only `last_synced_at` is refreshed.
    NoOp { local: CalendarEvent },
    /// Local row is waiting for a remote delete; the pull leaves it alone.
    PendingDelete { local: CalendarEvent },
    /// Local row points at a remote id the remote no longer lists.
    RemoteAbsent { local: CalendarEvent },
    /// Remote event failed validation and is skipped.
    Invalid { remote_id: String, errors: ValidationErrors },
}

/// Push-side decision for one pending local row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDecision {
    CreateRemote(CalendarEvent),
    UpdateRemote(CalendarEvent),
    /// Remove remotely, then hard-delete locally once confirmed.
    DeleteRemote(CalendarEvent),
    /// Soft-deleted row that never reached the remote; nothing to call.
    PurgeLocal(CalendarEvent),
}

impl PushDecision {
    pub fn event(&self) -> &CalendarEvent {
        match self {
            Self::CreateRemote(event)
            | Self::UpdateRemote(event)
            | Self::DeleteRemote(event)
            | Self::PurgeLocal(event) => event,
        }
    }
}

/// Plan the pull phase.
///
/// `local` holds the user's rows in `range` plus any rows outside it that are
/// linked to one of the listed remote ids. Only rows starting inside `range`
/// can be judged absent, since the remote only lists that window.
pub fn plan_pull(
    user_id: &str,
    range: &DateRange,
    remote: &[RemoteEvent],
    local: &[CalendarEvent],
) -> Vec<PullDecision> {
    let by_remote_id: HashMap<&str, &CalendarEvent> = local
        .iter()
        .filter_map(|event| event.remote_id.as_deref().map(|remote_id| (remote_id, event)))
        .collect();

    let mut seen: HashSet<&str> = HashSet::with_capacity(remote.len());
    let mut decisions = Vec::with_capacity(remote.len());

    for remote_event in remote {
        if !seen.insert(remote_event.remote_id.as_str()) {
            continue;
        }

        let pulled = match validate_remote(user_id, remote_event) {
            Ok(pulled) => pulled,
            Err(errors) => {
                decisions.push(PullDecision::Invalid {
                    remote_id: remote_event.remote_id.clone(),
                    errors,
                });
                continue;
            }
        };

        let decision = match by_remote_id.get(remote_event.remote_id.as_str()) {
            None => PullDecision::CreateLocal(pulled),
            Some(local) if local.sync_status == SyncStatus::Deleted => {
                PullDecision::PendingDelete { local: (*local).clone() }
            }
            Some(local) if local.fields() == pulled.fields() => {
                PullDecision::NoOp { local: (*local).clone() }
            }
            Some(local) => PullDecision::UpdateLocal { local: (*local).clone(), remote: pulled },
        };
        decisions.push(decision);
    }

    for event in local {
        let Some(remote_id) = event.remote_id.as_deref() else {
            continue;
        };
        if event.sync_status != SyncStatus::Local
            && range.contains(event.start_time)
            && !seen.contains(remote_id)
        {
            decisions.push(PullDecision::RemoteAbsent { local: event.clone() });
        }
    }

    decisions
}

/// Plan the push phase over rows returned by `list_pending_push`.
///
/// Rows in `skip` were already resolved by the pull phase of the same run.
pub fn plan_push(pending: Vec<CalendarEvent>, skip: &HashSet<String>) -> Vec<PushDecision> {
    pending
        .into_iter()
        .filter(|event| !skip.contains(&event.id))
        .filter_map(|event| match (event.sync_status, event.remote_id.is_some()) {
            (status, false) if status.needs_push() => Some(PushDecision::CreateRemote(event)),
            (status, true) if status.needs_push() => Some(PushDecision::UpdateRemote(event)),
            (SyncStatus::Deleted, true) => Some(PushDecision::DeleteRemote(event)),
            (SyncStatus::Deleted, false) => Some(PushDecision::PurgeLocal(event)),
            _ => None,
        })
        .collect()
}
