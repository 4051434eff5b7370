//! In-memory replica model and the journal entries that mutate it.

use super::{ApplyOutcome, RemoteBatch};
use cofrasync_protocol::{
    resolve, Record, RecordId, Resolution, SyncCursor, TableName, Timestamp, Tombstone,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One atomic replica mutation.
///
/// Durable replicas write each entry as a single journal frame, so an
/// entry is either fully replayed after a crash or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// Insert or overwrite records.
    Upsert {
        /// Table.
        table: TableName,
        /// Records.
        records: Vec<Record>,
    },
    /// Remove records without tombstones.
    Delete {
        /// Table.
        table: TableName,
        /// Ids.
        ids: Vec<RecordId>,
    },
    /// Remove records and record their tombstones.
    DeleteTracked {
        /// Table.
        table: TableName,
        /// One tombstone per removed record.
        tombstones: Vec<Tombstone>,
    },
    /// Add tombstones.
    Tombstones {
        /// Table.
        table: TableName,
        /// Tombstones.
        tombstones: Vec<Tombstone>,
    },
    /// Drop tombstones.
    PurgeTombstones {
        /// Table.
        table: TableName,
        /// Ids whose tombstones go away.
        ids: Vec<RecordId>,
    },
    /// Resolved result of a pull.
    Remote {
        /// Table.
        table: TableName,
        /// Remote copies that won.
        writes: Vec<Record>,
        /// Remote deletions.
        removals: Vec<RecordId>,
    },
    /// Set one cursor.
    Cursor {
        /// Table.
        table: TableName,
        /// Local boundary of the cycle.
        at: Option<Timestamp>,
        /// Remote watermark.
        pulled_through: Option<Timestamp>,
    },
    /// Reset all cursors.
    ResetCursors,
}

impl JournalEntry {
    /// One-line description for dumps.
    pub fn describe(&self) -> String {
        match self {
            JournalEntry::Upsert { table, records } => {
                format!("upsert {table}: {} record(s)", records.len())
            }
            JournalEntry::Delete { table, ids } => format!("delete {table}: {} id(s)", ids.len()),
            JournalEntry::DeleteTracked { table, tombstones } => {
                format!("delete+tombstone {table}: {} id(s)", tombstones.len())
            }
            JournalEntry::Tombstones { table, tombstones } => {
                format!("tombstone {table}: {} id(s)", tombstones.len())
            }
            JournalEntry::PurgeTombstones { table, ids } => {
                format!("purge tombstones {table}: {} id(s)", ids.len())
            }
            JournalEntry::Remote {
                table,
                writes,
                removals,
            } => format!(
                "apply remote {table}: {} write(s), {} removal(s)",
                writes.len(),
                removals.len()
            ),
            JournalEntry::Cursor {
                table,
                at,
                pulled_through,
            } => {
                let at = at.map_or_else(|| "initial".to_string(), |at| at.to_string());
                match pulled_through {
                    Some(stamp) => format!("cursor {table} -> {at}, pulled through {stamp}"),
                    None => format!("cursor {table} -> {at}"),
                }
            }
            JournalEntry::ResetCursors => "reset all cursors".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TableState {
    records: BTreeMap<RecordId, Record>,
    tombstones: BTreeMap<RecordId, Tombstone>,
    synced_at: Option<Timestamp>,
    pulled_through: Option<Timestamp>,
}

/// Counts for one table of a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Table.
    pub table: TableName,
    /// Live records.
    pub records: usize,
    /// Pending tombstones.
    pub tombstones: usize,
    /// Local boundary of the last successful cycle.
    pub cursor: Option<Timestamp>,
    /// Highest remote change stamp applied.
    pub pulled_through: Option<Timestamp>,
}

/// Tables, records, tombstones and cursors of a replica.
///
/// Mutations go through [`ReplicaState::apply`] only, which is what lets a
/// durable replica rebuild the same state by replaying its journal.
#[derive(Debug, Clone, Default)]
pub struct ReplicaState {
    tables: BTreeMap<TableName, TableState>,
}

impl ReplicaState {
    /// Records of `table` written at or after `since`, oldest first.
    pub fn read_all(&self, table: &TableName, since: Option<Timestamp>) -> Vec<Record> {
        let Some(state) = self.tables.get(table) else {
            return Vec::new();
        };
        let mut records: Vec<Record> = state
            .records
            .values()
            .filter(|r| r.changed_since(since))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        records
    }

    /// One record.
    pub fn get(&self, table: &TableName, id: RecordId) -> Option<Record> {
        self.tables.get(table)?.records.get(&id).cloned()
    }

    /// Cursor of `table`.
    pub fn cursor(&self, table: &TableName) -> SyncCursor {
        let state = self.tables.get(table);
        SyncCursor {
            table: table.clone(),
            last_synced_at: state.and_then(|t| t.synced_at),
            pulled_through: state.and_then(|t| t.pulled_through),
        }
    }

    /// Pending tombstones of `table`, oldest first.
    pub fn tombstones(&self, table: &TableName) -> Vec<Tombstone> {
        let Some(state) = self.tables.get(table) else {
            return Vec::new();
        };
        let mut tombstones: Vec<Tombstone> = state.tombstones.values().cloned().collect();
        tombstones.sort_by(|a, b| a.deleted_at.cmp(&b.deleted_at).then(a.id.cmp(&b.id)));
        tombstones
    }

    /// Per-table counts, by table name.
    pub fn summary(&self) -> Vec<TableSummary> {
        self.tables
            .iter()
            .map(|(table, state)| TableSummary {
                table: table.clone(),
                records: state.records.len(),
                tombstones: state.tombstones.len(),
                cursor: state.synced_at,
                pulled_through: state.pulled_through,
            })
            .collect()
    }

    /// Builds the tracked deletion of the `ids` present in `table`.
    pub(crate) fn plan_delete_tracked(
        &self,
        table: &TableName,
        ids: &[RecordId],
        deleted_at: Timestamp,
    ) -> Option<JournalEntry> {
        let state = self.tables.get(table)?;
        let mut seen = BTreeSet::new();
        let tombstones: Vec<Tombstone> = ids
            .iter()
            .filter(|id| state.records.contains_key(id) && seen.insert(**id))
            .map(|id| Tombstone {
                table: table.clone(),
                id: *id,
                deleted_at,
            })
            .collect();
        (!tombstones.is_empty()).then(|| JournalEntry::DeleteTracked {
            table: table.clone(),
            tombstones,
        })
    }

    /// Resolves `batch` against the current state.
    pub(crate) fn plan_remote(
        &self,
        table: &TableName,
        batch: RemoteBatch,
    ) -> (JournalEntry, ApplyOutcome) {
        let state = self.tables.get(table);
        let mut outcome = ApplyOutcome::default();
        let mut writes: BTreeMap<RecordId, Record> = BTreeMap::new();

        for remote in batch.upserts {
            let local = writes
                .get(&remote.id)
                .or_else(|| state.and_then(|s| s.records.get(&remote.id)));
            let tombstoned = state.is_some_and(|s| s.tombstones.contains_key(&remote.id));
            match resolve(local, tombstoned, &remote) {
                Resolution::Insert => outcome.inserted += 1,
                Resolution::Replace => outcome.replaced += 1,
                Resolution::KeepLocal => {
                    outcome.kept_local += 1;
                    continue;
                }
                Resolution::Unchanged => {
                    outcome.unchanged += 1;
                    continue;
                }
                Resolution::DiscardTombstoned => {
                    outcome.discarded += 1;
                    continue;
                }
            }
            writes.insert(remote.id, remote);
        }

        let mut removals = Vec::new();
        for id in batch.deletions {
            let present = writes.remove(&id).is_some()
                || state.is_some_and(|s| s.records.contains_key(&id));
            if present {
                outcome.removed += 1;
            }
            removals.push(id);
        }

        let entry = JournalEntry::Remote {
            table: table.clone(),
            writes: writes.into_values().collect(),
            removals,
        };
        (entry, outcome)
    }

    /// Whether applying `entry` would change nothing.
    pub(crate) fn is_noop(entry: &JournalEntry) -> bool {
        match entry {
            JournalEntry::Upsert { records, .. } => records.is_empty(),
            JournalEntry::Delete { ids, .. } | JournalEntry::PurgeTombstones { ids, .. } => {
                ids.is_empty()
            }
            JournalEntry::DeleteTracked { tombstones, .. }
            | JournalEntry::Tombstones { tombstones, .. } => tombstones.is_empty(),
            JournalEntry::Remote {
                writes, removals, ..
            } => writes.is_empty() && removals.is_empty(),
            JournalEntry::Cursor { .. } | JournalEntry::ResetCursors => false,
        }
    }

    /// Applies one mutation.
    pub fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Upsert { table, records } => {
                let state = self.tables.entry(table).or_default();
                for record in records {
                    state.records.insert(record.id, record);
                }
            }
            JournalEntry::Delete { table, ids } => {
                if let Some(state) = self.tables.get_mut(&table) {
                    for id in ids {
                        state.records.remove(&id);
                    }
                }
            }
            JournalEntry::DeleteTracked { table, tombstones } => {
                let state = self.tables.entry(table).or_default();
                for tombstone in tombstones {
                    state.records.remove(&tombstone.id);
                    state.tombstones.insert(tombstone.id, tombstone);
                }
            }
            JournalEntry::Tombstones { table, tombstones } => {
                let state = self.tables.entry(table).or_default();
                for tombstone in tombstones {
                    state.tombstones.insert(tombstone.id, tombstone);
                }
            }
            JournalEntry::PurgeTombstones { table, ids } => {
                if let Some(state) = self.tables.get_mut(&table) {
                    for id in ids {
                        state.tombstones.remove(&id);
                    }
                }
            }
            JournalEntry::Remote {
                table,
                writes,
                removals,
            } => {
                let state = self.tables.entry(table).or_default();
                for record in writes {
                    state.records.insert(record.id, record);
                }
                for id in removals {
                    state.records.remove(&id);
                }
            }
            JournalEntry::Cursor {
                table,
                at,
                pulled_through,
            } => {
                let state = self.tables.entry(table).or_default();
                state.synced_at = at;
                state.pulled_through = pulled_through;
            }
            JournalEntry::ResetCursors => {
                for state in self.tables.values_mut() {
                    state.synced_at = None;
                    state.pulled_through = None;
                }
            }
        }
    }

    /// Entries that rebuild this state from empty.
    pub fn snapshot_entries(&self) -> Vec<JournalEntry> {
        let mut entries = Vec::new();
        for (table, state) in &self.tables {
            if !state.records.is_empty() {
                entries.push(JournalEntry::Upsert {
                    table: table.clone(),
                    records: state.records.values().cloned().collect(),
                });
            }
            if !state.tombstones.is_empty() {
                entries.push(JournalEntry::Tombstones {
                    table: table.clone(),
                    tombstones: state.tombstones.values().cloned().collect(),
                });
            }
            if state.synced_at.is_some() || state.pulled_through.is_some() {
                entries.push(JournalEntry::Cursor {
                    table: table.clone(),
                    at: state.synced_at,
                    pulled_through: state.pulled_through,
                });
            }
        }
        entries
    }
}
