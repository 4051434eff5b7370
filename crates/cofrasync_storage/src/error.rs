//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends and the journal.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to grow the store through `truncate`.
    #[error("cannot truncate to {requested} bytes, store holds {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// A complete journal frame failed validation.
    #[error("journal corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Offset of the offending frame.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A frame payload does not fit the 32-bit length field.
    #[error("journal frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The directory is held by another process.
    #[error("storage locked: another process holds {0}")]
    Locked(String),
}

impl StorageError {
    pub(crate) fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}
