//! Authoritative record store with a per-table change feed.

use cofrasync_protocol::{
    supersedes, Change, Clock, PushAck, Record, RecordId, RemoteChange, SystemClock, TableName,
    Timestamp, Tombstone,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The remote side of every table.
///
/// Each id keeps only its latest state, live or deleted, together with the
/// stamp at which that state was written. Stamps come from the store's own
/// clock and are strictly increasing per table, so a pull `since` any
/// previously returned stamp misses nothing. A client's `updated_at` never
/// feeds a stamp: a device with a fast clock cannot move the feed ahead.
///
/// Deleted ids stay deleted: later upserts to them are ignored.
pub struct RemoteStore {
    clock: Arc<dyn Clock>,
    tables: RwLock<HashMap<TableName, TableFeed>>,
}

#[derive(Debug, Default)]
struct TableFeed {
    entries: HashMap<RecordId, RemoteChange>,
    last_stamp: Timestamp,
}

impl TableFeed {
    fn stamp(&mut self, now: Timestamp) -> Timestamp {
        let stamp = now.max(self.last_stamp.next());
        self.last_stamp = stamp;
        stamp
    }
}

impl RemoteStore {
    /// An empty store stamping with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty store stamping with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Stores every record that supersedes the stored copy.
    ///
    /// Identical re-pushes change nothing. Pushed records that lose come
    /// back in [`PushAck::superseded`] as the stored winner.
    pub fn upsert(&self, table: &TableName, records: Vec<Record>) -> PushAck {
        let now = self.clock.now();
        let mut tables = self.tables.write();
        let feed = tables.entry(table.clone()).or_default();
        let mut ack = PushAck::default();
        let mut ignored = 0usize;

        for record in records {
            match feed.entries.get(&record.id).map(|entry| &entry.change) {
                Some(Change::Delete(_)) => {
                    ignored += 1;
                    continue;
                }
                Some(Change::Upsert(stored)) if stored == &record => continue,
                Some(Change::Upsert(stored)) if !supersedes(&record, stored) => {
                    ack.superseded.push(stored.clone());
                    continue;
                }
                _ => {}
            }
            let stamp = feed.stamp(now);
            feed.entries
                .insert(record.id, RemoteChange::upsert(record, stamp));
            ack.applied += 1;
        }

        debug!(
            table = %table,
            applied = ack.applied,
            superseded = ack.superseded.len(),
            ignored,
            "remote upsert"
        );
        ack
    }

    /// Deletes `ids`. Returns how many were live; absent or already deleted
    /// ids are skipped.
    pub fn delete(&self, table: &TableName, ids: &[RecordId]) -> usize {
        let now = self.clock.now();
        let mut tables = self.tables.write();
        let feed = tables.entry(table.clone()).or_default();
        let mut deleted = 0;

        for id in ids {
            let live = matches!(
                feed.entries.get(id).map(|entry| &entry.change),
                Some(Change::Upsert(_))
            );
            if !live {
                continue;
            }
            let stamp = feed.stamp(now);
            let tombstone = Tombstone {
                table: table.clone(),
                id: *id,
                deleted_at: now,
            };
            feed.entries.insert(*id, RemoteChange::delete(tombstone, stamp));
            deleted += 1;
        }

        debug!(table = %table, requested = ids.len(), deleted, "remote delete");
        deleted
    }

    /// Changes stamped after `since`, ascending, at most `limit`.
    pub fn changes_since(
        &self,
        table: &TableName,
        since: Option<Timestamp>,
        limit: usize,
    ) -> Vec<RemoteChange> {
        let tables = self.tables.read();
        let Some(feed) = tables.get(table) else {
            return Vec::new();
        };
        let mut changes: Vec<RemoteChange> = feed
            .entries
            .values()
            .filter(|entry| since.map_or(true, |since| entry.changed_at > since))
            .cloned()
            .collect();
        changes.sort_by_key(|entry| entry.changed_at);
        changes.truncate(limit);
        changes
    }

    /// The live copy of a record.
    pub fn get(&self, table: &TableName, id: RecordId) -> Option<Record> {
        self.tables
            .read()
            .get(table)
            .and_then(|feed| feed.entries.get(&id))
            .and_then(|entry| match &entry.change {
                Change::Upsert(record) => Some(record.clone()),
                Change::Delete(_) => None,
            })
    }

    /// Whether `id` was deleted remotely.
    pub fn is_deleted(&self, table: &TableName, id: RecordId) -> bool {
        self.tables
            .read()
            .get(table)
            .and_then(|feed| feed.entries.get(&id))
            .is_some_and(|entry| matches!(entry.change, Change::Delete(_)))
    }

    /// Live records of `table`, ordered by id.
    pub fn records(&self, table: &TableName) -> Vec<Record> {
        let tables = self.tables.read();
        let mut records: Vec<Record> = tables
            .get(table)
            .map(|feed| {
                feed.entries
                    .values()
                    .filter_map(|entry| match &entry.change {
                        Change::Upsert(record) => Some(record.clone()),
                        Change::Delete(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|record| record.id);
        records
    }

    /// Highest stamp written to `table`.
    pub fn last_stamp(&self, table: &TableName) -> Option<Timestamp> {
        self.tables
            .read()
            .get(table)
            .map(|feed| feed.last_stamp)
            .filter(|stamp| *stamp > Timestamp::ZERO)
    }
}

impl Default for RemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("tables", &self.tables.read().len())
            .finish_non_exhaustive()
    }
}
