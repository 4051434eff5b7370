//! On-disk layout of a durable replica.
//!
//! ```text
//! <replica_path>/
//! ├─ LOCK                     # advisory lock, single writer
//! ├─ replica.journal          # live journal
//! └─ replica.journal.compact  # compaction output, renamed over the journal
//! ```

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "replica.journal";
const COMPACT_FILE: &str = "replica.journal.compact";

/// An exclusively locked replica directory.
///
/// Only one `ReplicaDir` can exist per directory across processes; the
/// lock is released when the value is dropped.
#[derive(Debug)]
pub struct ReplicaDir {
    path: PathBuf,
    _lock: File,
}

impl ReplicaDir {
    /// Opens (and optionally creates) the directory and takes the lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the
    /// directory, or an I/O error if it is missing and
    /// `create_if_missing` is false.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("replica directory does not exist: {}", path.display()),
                )));
            }
            fs::create_dir_all(path)?;
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the live journal.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Path compaction writes to before installing.
    #[must_use]
    pub fn compaction_path(&self) -> PathBuf {
        self.path.join(COMPACT_FILE)
    }

    /// Atomically replaces the live journal with the compaction output.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the rename fails.
    pub fn install_compacted(&self) -> StorageResult<()> {
        fs::rename(self.compaction_path(), self.journal_path())?;
        Ok(())
    }

    /// Removes a compaction file left behind by an interrupted compaction.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be removed.
    pub fn discard_stale_compaction(&self) -> StorageResult<()> {
        match fs::remove_file(self.compaction_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
