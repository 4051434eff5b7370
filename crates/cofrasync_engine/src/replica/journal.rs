//! Durable replica backed by the storage journal.

use super::state::{JournalEntry, ReplicaState, TableSummary};
use super::{ApplyOutcome, LocalStore, RemoteBatch, Replica, SyncLedger};
use crate::error::{StoreError, StoreResult};
use cofrasync_protocol::{
    from_cbor, to_cbor, Record, RecordId, SyncCursor, TableName, Timestamp, Tombstone,
};
use cofrasync_storage::{FileBackend, Journal, JournalOptions, ReplicaDir, StorageBackend};
use parking_lot::RwLock;
use std::path::Path;
use tracing::{debug, info, warn};

/// What opening the replica found in its journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryInfo {
    /// Frames replayed.
    pub frames: usize,
    /// Bytes of an interrupted write that were cut off.
    pub torn_bytes: u64,
}

/// Journal sizes around a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Bytes before.
    pub before: u64,
    /// Bytes after.
    pub after: u64,
}

struct Inner {
    state: ReplicaState,
    journal: Journal,
}

/// A replica whose every mutation is one CRC-checked journal frame.
///
/// A tracked deletion and its tombstone, or a whole resolved pull, are
/// single frames, so a crash can never leave half of one behind. Opening
/// the replica replays the journal and cuts off a torn final frame.
pub struct JournalReplica {
    inner: RwLock<Inner>,
    dir: Option<ReplicaDir>,
    options: JournalOptions,
    recovery: RecoveryInfo,
}

impl JournalReplica {
    /// Opens the replica in directory `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Fails if the directory is locked by another process, the journal
    /// cannot be read, or a complete frame is corrupted.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with(path, JournalOptions::default())
    }

    /// Like [`JournalReplica::open`] with explicit journal options.
    ///
    /// # Errors
    ///
    /// See [`JournalReplica::open`].
    pub fn open_with(path: &Path, options: JournalOptions) -> StoreResult<Self> {
        let dir = ReplicaDir::open(path, true)?;
        dir.discard_stale_compaction()?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let (inner, recovery) = Self::replay(Box::new(backend), options)?;
        info!(
            path = %path.display(),
            frames = recovery.frames,
            torn_bytes = recovery.torn_bytes,
            "opened replica"
        );
        Ok(Self {
            inner: RwLock::new(inner),
            dir: Some(dir),
            options,
            recovery,
        })
    }

    /// A replica over an arbitrary backend, replaying whatever it holds.
    ///
    /// # Errors
    ///
    /// Fails if a complete frame is corrupted.
    pub fn with_backend(
        backend: Box<dyn StorageBackend>,
        options: JournalOptions,
    ) -> StoreResult<Self> {
        let (inner, recovery) = Self::replay(backend, options)?;
        Ok(Self {
            inner: RwLock::new(inner),
            dir: None,
            options,
            recovery,
        })
    }

    fn replay(
        backend: Box<dyn StorageBackend>,
        options: JournalOptions,
    ) -> StoreResult<(Inner, RecoveryInfo)> {
        let journal = Journal::new(backend, options);
        let scan = journal.recover()?;
        let mut state = ReplicaState::default();
        for frame in &scan.frames {
            let entry: JournalEntry = from_cbor(&frame.payload).map_err(|e| {
                StoreError::Corrupted(format!("journal frame at offset {}: {e}", frame.offset))
            })?;
            state.apply(entry);
        }
        if scan.torn_bytes > 0 {
            warn!(torn_bytes = scan.torn_bytes, "replica recovered from interrupted write");
        }
        let recovery = RecoveryInfo {
            frames: scan.frames.len(),
            torn_bytes: scan.torn_bytes,
        };
        Ok((Inner { state, journal }, recovery))
    }

    /// What opening found.
    pub fn recovery(&self) -> RecoveryInfo {
        self.recovery
    }

    /// Directory of a file-backed replica.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(ReplicaDir::path)
    }

    /// Per-table counts.
    pub fn summary(&self) -> Vec<TableSummary> {
        self.inner.read().state.summary()
    }

    /// Current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn journal_size(&self) -> StoreResult<u64> {
        Ok(self.inner.read().journal.size()?)
    }

    /// Rewrites the journal as a snapshot of the current state.
    ///
    /// File-backed replicas write the snapshot next to the journal and
    /// rename it into place, so a crash leaves either the old or the new
    /// journal.
    ///
    /// # Errors
    ///
    /// Propagates storage and encoding errors; the old journal stays in
    /// place on failure.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        let mut inner = self.inner.write();
        let payloads = inner
            .state
            .snapshot_entries()
            .iter()
            .map(|entry| to_cbor(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let before = inner.journal.size()?;

        match &self.dir {
            Some(dir) => {
                dir.discard_stale_compaction()?;
                let mut side = Journal::new(
                    Box::new(FileBackend::open(&dir.compaction_path())?),
                    JournalOptions::default().with_sync_on_write(false),
                );
                for payload in &payloads {
                    side.append(payload)?;
                }
                side.sync()?;
                // The open handle follows the file through the rename.
                dir.install_compacted()?;
                side.set_options(self.options);
                inner.journal = side;
            }
            None => inner.journal.rewrite(&payloads)?,
        }

        let after = inner.journal.size()?;
        info!(before, after, entries = payloads.len(), "compacted replica journal");
        Ok(CompactionStats { before, after })
    }

    fn commit(inner: &mut Inner, entry: JournalEntry) -> StoreResult<()> {
        if ReplicaState::is_noop(&entry) {
            return Ok(());
        }
        let payload = to_cbor(&entry)?;
        inner.journal.append(&payload)?;
        debug!(entry = %entry.describe(), "journal append");
        inner.state.apply(entry);
        Ok(())
    }

    fn commit_one(&self, entry: JournalEntry) -> StoreResult<()> {
        Self::commit(&mut self.inner.write(), entry)
    }
}

impl std::fmt::Debug for JournalReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReplica")
            .field("path", &self.path())
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl LocalStore for JournalReplica {
    fn read_all(&self, table: &TableName, since: Option<Timestamp>) -> StoreResult<Vec<Record>> {
        Ok(self.inner.read().state.read_all(table, since))
    }

    fn get(&self, table: &TableName, id: RecordId) -> StoreResult<Option<Record>> {
        Ok(self.inner.read().state.get(table, id))
    }

    fn upsert_many(&self, table: &TableName, records: &[Record]) -> StoreResult<()> {
        self.commit_one(JournalEntry::Upsert {
            table: table.clone(),
            records: records.to_vec(),
        })
    }

    fn delete_many(&self, table: &TableName, ids: &[RecordId]) -> StoreResult<()> {
        self.commit_one(JournalEntry::Delete {
            table: table.clone(),
            ids: ids.to_vec(),
        })
    }
}

impl SyncLedger for JournalReplica {
    fn cursor(&self, table: &TableName) -> StoreResult<SyncCursor> {
        Ok(self.inner.read().state.cursor(table))
    }

    fn set_cursor(&self, cursor: &SyncCursor) -> StoreResult<()> {
        self.commit_one(JournalEntry::Cursor {
            table: cursor.table.clone(),
            at: cursor.last_synced_at,
            pulled_through: cursor.pulled_through,
        })
    }

    fn clear_cursors(&self) -> StoreResult<()> {
        self.commit_one(JournalEntry::ResetCursors)
    }

    fn add_tombstone(&self, tombstone: Tombstone) -> StoreResult<()> {
        self.commit_one(JournalEntry::Tombstones {
            table: tombstone.table.clone(),
            tombstones: vec![tombstone],
        })
    }

    fn tombstones(&self, table: &TableName) -> StoreResult<Vec<Tombstone>> {
        Ok(self.inner.read().state.tombstones(table))
    }

    fn purge_tombstones(&self, table: &TableName, ids: &[RecordId]) -> StoreResult<()> {
        self.commit_one(JournalEntry::PurgeTombstones {
            table: table.clone(),
            ids: ids.to_vec(),
        })
    }
}

impl Replica for JournalReplica {
    fn delete_tracked(
        &self,
        table: &TableName,
        ids: &[RecordId],
        deleted_at: Timestamp,
    ) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        let Some(entry) = inner.state.plan_delete_tracked(table, ids, deleted_at) else {
            return Ok(0);
        };
        let deleted = match &entry {
            JournalEntry::DeleteTracked { tombstones, .. } => tombstones.len(),
            _ => 0,
        };
        Self::commit(&mut inner, entry)?;
        Ok(deleted)
    }

    fn apply_remote(&self, table: &TableName, batch: RemoteBatch) -> StoreResult<ApplyOutcome> {
        let mut inner = self.inner.write();
        let (entry, outcome) = inner.state.plan_remote(table, batch);
        Self::commit(&mut inner, entry)?;
        Ok(outcome)
    }
}
