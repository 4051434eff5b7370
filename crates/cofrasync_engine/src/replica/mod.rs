//! Local replica ports and implementations.
//!
//! A replica is the client-resident durable store. The engine talks to it
//! through three traits:
//!
//! - [`LocalStore`]: records per table
//! - [`SyncLedger`]: cursors and tombstones, owned by the engine
//! - [`Replica`]: the two operations that must be atomic across both

mod journal;
mod memory;
mod state;

pub use journal::{CompactionStats, JournalReplica, RecoveryInfo};
pub use memory::MemoryReplica;
pub use state::{JournalEntry, ReplicaState, TableSummary};

use crate::error::StoreResult;
use cofrasync_protocol::{Record, RecordId, SyncCursor, TableName, Timestamp, Tombstone};

/// Record storage for one client.
pub trait LocalStore: Send + Sync {
    /// Records of `table`, all of them or only those with `updated_at`
    /// after `since`, in ascending `updated_at` order.
    fn read_all(&self, table: &TableName, since: Option<Timestamp>) -> StoreResult<Vec<Record>>;

    /// One record.
    fn get(&self, table: &TableName, id: RecordId) -> StoreResult<Option<Record>>;

    /// Inserts or overwrites `records` as one atomic batch.
    fn upsert_many(&self, table: &TableName, records: &[Record]) -> StoreResult<()>;

    /// Removes `ids` as one atomic batch. Missing ids are ignored. Does not
    /// create tombstones; see [`Replica::delete_tracked`].
    fn delete_many(&self, table: &TableName, ids: &[RecordId]) -> StoreResult<()>;
}

/// Cursor store and tombstone log.
pub trait SyncLedger: Send + Sync {
    /// Cursor of `table`; initial if the table never synced.
    fn cursor(&self, table: &TableName) -> StoreResult<SyncCursor>;

    /// Persists `cursor`.
    fn set_cursor(&self, cursor: &SyncCursor) -> StoreResult<()>;

    /// Resets every cursor so the next cycle pulls everything.
    fn clear_cursors(&self) -> StoreResult<()>;

    /// Records a pending deletion.
    fn add_tombstone(&self, tombstone: Tombstone) -> StoreResult<()>;

    /// Pending deletions of `table`, oldest first.
    fn tombstones(&self, table: &TableName) -> StoreResult<Vec<Tombstone>>;

    /// Forgets the tombstones of `ids`. Others stay.
    fn purge_tombstones(&self, table: &TableName, ids: &[RecordId]) -> StoreResult<()>;
}

/// Changes pulled from the remote, staged for one atomic apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteBatch {
    /// Remote copies to resolve against local state.
    pub upserts: Vec<Record>,
    /// Ids deleted remotely.
    pub deletions: Vec<RecordId>,
}

impl RemoteBatch {
    /// Whether there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }
}

/// Per-resolution counts of an applied [`RemoteBatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// New records written.
    pub inserted: usize,
    /// Local records overwritten by remote copies.
    pub replaced: usize,
    /// Remote copies that lost to the local record.
    pub kept_local: usize,
    /// Remote copies identical to local.
    pub unchanged: usize,
    /// Remote copies dropped because of a local tombstone.
    pub discarded: usize,
    /// Local records removed by remote deletions.
    pub removed: usize,
}

/// A local store with the ledger the engine needs.
pub trait Replica: LocalStore + SyncLedger {
    /// Deletes `ids` and records a tombstone for each deleted record, in
    /// one atomic step. Returns how many records were deleted; ids that are
    /// not present are ignored.
    fn delete_tracked(
        &self,
        table: &TableName,
        ids: &[RecordId],
        deleted_at: Timestamp,
    ) -> StoreResult<usize>;

    /// Resolves `batch` against the current local state and writes the
    /// winners, atomically. Resolution happens under the replica's lock, so
    /// writes and deletions that raced with the pull are respected.
    fn apply_remote(&self, table: &TableName, batch: RemoteBatch) -> StoreResult<ApplyOutcome>;
}
