//! Volatile replica.

use super::state::{JournalEntry, ReplicaState, TableSummary};
use super::{ApplyOutcome, LocalStore, RemoteBatch, Replica, SyncLedger};
use crate::error::StoreResult;
use cofrasync_protocol::{Record, RecordId, SyncCursor, TableName, Timestamp, Tombstone};
use parking_lot::RwLock;

/// A replica kept entirely in memory.
///
/// Same semantics as [`JournalReplica`](super::JournalReplica) without the
/// durability. Useful for tests and for clients that rebuild from the
/// remote on every start.
#[derive(Debug, Default)]
pub struct MemoryReplica {
    state: RwLock<ReplicaState>,
}

impl MemoryReplica {
    /// An empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-table counts.
    pub fn summary(&self) -> Vec<TableSummary> {
        self.state.read().summary()
    }

    /// A copy of the whole state.
    pub fn snapshot(&self) -> ReplicaState {
        self.state.read().clone()
    }

    fn commit(&self, entry: JournalEntry) {
        self.state.write().apply(entry);
    }
}

impl LocalStore for MemoryReplica {
    fn read_all(&self, table: &TableName, since: Option<Timestamp>) -> StoreResult<Vec<Record>> {
        Ok(self.state.read().read_all(table, since))
    }

    fn get(&self, table: &TableName, id: RecordId) -> StoreResult<Option<Record>> {
        Ok(self.state.read().get(table, id))
    }

    fn upsert_many(&self, table: &TableName, records: &[Record]) -> StoreResult<()> {
        self.commit(JournalEntry::Upsert {
            table: table.clone(),
            records: records.to_vec(),
        });
        Ok(())
    }

    fn delete_many(&self, table: &TableName, ids: &[RecordId]) -> StoreResult<()> {
        self.commit(JournalEntry::Delete {
            table: table.clone(),
            ids: ids.to_vec(),
        });
        Ok(())
    }
}

impl SyncLedger for MemoryReplica {
    fn cursor(&self, table: &TableName) -> StoreResult<SyncCursor> {
        Ok(self.state.read().cursor(table))
    }

    fn set_cursor(&self, cursor: &SyncCursor) -> StoreResult<()> {
        self.commit(JournalEntry::Cursor {
            table: cursor.table.clone(),
            at: cursor.last_synced_at,
            pulled_through: cursor.pulled_through,
        });
        Ok(())
    }

    fn clear_cursors(&self) -> StoreResult<()> {
        self.commit(JournalEntry::ResetCursors);
        Ok(())
    }

    fn add_tombstone(&self, tombstone: Tombstone) -> StoreResult<()> {
        self.commit(JournalEntry::Tombstones {
            table: tombstone.table.clone(),
            tombstones: vec![tombstone],
        });
        Ok(())
    }

    fn tombstones(&self, table: &TableName) -> StoreResult<Vec<Tombstone>> {
        Ok(self.state.read().tombstones(table))
    }

    fn purge_tombstones(&self, table: &TableName, ids: &[RecordId]) -> StoreResult<()> {
        self.commit(JournalEntry::PurgeTombstones {
            table: table.clone(),
            ids: ids.to_vec(),
        });
        Ok(())
    }
}

impl Replica for MemoryReplica {
    fn delete_tracked(
        &self,
        table: &TableName,
        ids: &[RecordId],
        deleted_at: Timestamp,
    ) -> StoreResult<usize> {
        let mut state = self.state.write();
        let Some(entry) = state.plan_delete_tracked(table, ids, deleted_at) else {
            return Ok(0);
        };
        let deleted = match &entry {
            JournalEntry::DeleteTracked { tombstones, .. } => tombstones.len(),
            _ => 0,
        };
        state.apply(entry);
        Ok(deleted)
    }

    fn apply_remote(&self, table: &TableName, batch: RemoteBatch) -> StoreResult<ApplyOutcome> {
        let mut state = self.state.write();
        let (entry, outcome) = state.plan_remote(table, batch);
        state.apply(entry);
        Ok(outcome)
    }
}
