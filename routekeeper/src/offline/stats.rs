//! Sync reports, events and queue statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::action::PendingAction;

/// Why a sync pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub skipped: Option<SkipReason>,
    pub synced: usize,
    /// Failed this pass but still queued.
    pub failed: usize,
    /// Evicted after reaching their retry limit.
    pub permanently_failed: Vec<PendingAction>,
    /// Evicted because the remote state no longer accepts them.
    pub conflicted: Vec<PendingAction>,
    /// Held back behind an earlier failed status update for the same delivery.
    pub deferred: usize,
    /// No handler registered for the action type.
    pub unhandled: usize,
    /// Left in the queue after the pass.
    pub remaining: usize,
}

impl SyncReport {
    pub fn skipped(reason: SkipReason, remaining: usize) -> Self {
        Self {
            skipped: Some(reason),
            remaining,
            ..Default::default()
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Completed {
        synced: usize,
        failed: usize,
        remaining: usize,
    },
    PermanentlyFailed(PendingAction),
    /// Evicted on a remote conflict; the delivery needs a refresh.
    Conflict(PendingAction),
    /// The pass could not persist its results.
    Failed {
        reason: String,
        corrupted_key: Option<String>,
    },
}

/// Snapshot of offline state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfflineStats {
    pub pending_actions: usize,
    pub location_history: usize,
    pub status_history: usize,
    pub has_delivery_data: bool,
    pub is_online: bool,
    pub offline_mode: bool,
    pub syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
}
