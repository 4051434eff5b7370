//! Engine state and cumulative statistics.

use std::time::Instant;

/// What the engine is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Sending dirty records.
    Pushing,
    /// Sending tombstoned ids.
    Propagating,
    /// Fetching remote changes.
    Pulling,
    /// Writing resolved changes locally.
    Applying,
    /// The last cycle succeeded for every table.
    Synced,
    /// The last cycle had at least one failed table.
    Error,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pushing | SyncState::Propagating | SyncState::Pulling | SyncState::Applying
        )
    }
}

/// Statistics accumulated over the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles completed (with or without failed tables).
    pub cycles_completed: u64,
    /// Table cycles that succeeded.
    pub tables_succeeded: u64,
    /// Table cycles that failed.
    pub tables_failed: u64,
    /// Records pushed.
    pub records_pushed: u64,
    /// Changes pulled.
    pub changes_pulled: u64,
    /// Tombstones propagated.
    pub tombstones_propagated: u64,
    /// Pulled records that lost to the local copy.
    pub conflicts_kept_local: u64,
    /// Calls that joined an in-flight cycle instead of starting one.
    pub coalesced_calls: u64,
    /// End of the last cycle.
    pub last_sync_time: Option<Instant>,
    /// First error of the last cycle, if any.
    pub last_error: Option<String>,
}
