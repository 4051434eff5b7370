//! CLI command implementations.

pub mod compact;
pub mod dump_journal;
pub mod inspect;
pub mod resync;
pub mod verify;

use cofrasync_engine::replica::JournalEntry;
use cofrasync_engine::StoreError;
use cofrasync_protocol::from_cbor;
use cofrasync_storage::{FileBackend, Journal, JournalOptions, JournalScan, ReplicaDir, StorageError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("replica path required for {0} (use --path)")]
    MissingPath(&'static str),

    /// No replica at the given path.
    #[error("no replica found at {}", .0.display())]
    NotFound(PathBuf),

    /// Storage failure, including a locked directory.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Replica failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// JSON output failed.
    #[error("json output: {0}")]
    Json(#[from] serde_json::Error),

    /// `verify` found problems.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

/// A locked replica directory with its journal opened for reading.
pub struct JournalFile {
    _dir: ReplicaDir,
    journal: Journal,
}

impl JournalFile {
    /// Locks the replica at `path` and opens its journal without replaying
    /// or repairing it.
    pub fn open(path: &Path) -> Result<Self, CliError> {
        if !path.is_dir() {
            return Err(CliError::NotFound(path.to_path_buf()));
        }
        let dir = ReplicaDir::open(path, false)?;
        let journal_path = dir.journal_path();
        if !journal_path.exists() {
            return Err(CliError::NotFound(journal_path));
        }
        let journal = Journal::new(
            Box::new(FileBackend::open(&journal_path)?),
            JournalOptions::default(),
        );
        Ok(Self { _dir: dir, journal })
    }

    /// Journal size in bytes.
    pub fn size(&self) -> Result<u64, CliError> {
        Ok(self.journal.size()?)
    }

    /// Walks the frames.
    pub fn scan(&self) -> Result<JournalScan, CliError> {
        Ok(self.journal.scan()?)
    }
}

/// Decodes one frame payload.
pub fn decode_entry(payload: &[u8]) -> Result<JournalEntry, String> {
    from_cbor(payload).map_err(|e| e.to_string())
}

/// Formats a byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cofrasync_engine::{JournalReplica, LocalStore, Replica, SyncLedger};
    use cofrasync_protocol::{Record, SyncCursor, TableName, Timestamp};
    use tempfile::TempDir;

    /// A closed replica with two people, one deleted, and a cursor.
    pub(crate) fn sample_replica() -> TempDir {
        let dir = TempDir::new().unwrap();
        let people = TableName::new("people").unwrap();
        let replica = JournalReplica::open(dir.path()).unwrap();
        let ana = Record::create(b"ana".to_vec(), Timestamp::from_millis(10));
        let luis = Record::create(b"luis".to_vec(), Timestamp::from_millis(20));
        replica.upsert_many(&people, &[ana, luis.clone()]).unwrap();
        replica
            .set_cursor(&SyncCursor::at(people.clone(), Timestamp::from_millis(20)))
            .unwrap();
        replica
            .delete_tracked(&people, &[luis.id], Timestamp::from_millis(30))
            .unwrap();
        dir
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(JournalFile::open(&missing), Err(CliError::NotFound(_))));
    }

    #[test]
    fn journal_file_reads_frames() {
        let dir = sample_replica();
        let file = JournalFile::open(dir.path()).unwrap();
        let scan = file.scan().unwrap();
        assert_eq!(scan.frames.len(), 3);
        assert!(matches!(
            decode_entry(&scan.frames[0].payload),
            Ok(JournalEntry::Upsert { .. })
        ));
        assert_eq!(scan.valid_len, file.size().unwrap());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
