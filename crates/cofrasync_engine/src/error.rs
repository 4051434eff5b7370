//! Error types for the sync engine and local replicas.

use cofrasync_protocol::{ProtocolError, TableName};
use cofrasync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while syncing a table.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or remote failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The local replica failed.
    #[error("local store error: {0}")]
    LocalStore(#[from] StoreError),

    /// The table graph is invalid. Aborts the whole sync.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A message or payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// Sync was cancelled before the table started.
    #[error("sync cancelled")]
    Cancelled,

    /// A table this one references failed in the same cycle.
    #[error("skipped '{table}': referenced table '{dependency}' failed")]
    DependencyFailed {
        /// Skipped table.
        table: TableName,
        /// Failed table it references.
        dependency: TableName,
    },

    /// The transport was closed.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if running the cycle again can succeed without
    /// changing configuration.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::LocalStore(_) | SyncError::NotConnected | SyncError::DependencyFailed { .. } => true,
            SyncError::Configuration(_) | SyncError::Codec(_) | SyncError::Cancelled => false,
        }
    }
}

/// Invalid table registrations. Detected before any table is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A table references a table that is not registered.
    #[error("table '{table}' references unregistered table '{dependency}'")]
    UnknownDependency {
        /// Referencing table.
        table: TableName,
        /// Missing table.
        dependency: TableName,
    },

    /// The reference graph has a cycle.
    #[error("cyclic table references among: {}", join(.tables))]
    DependencyCycle {
        /// Tables that could not be ordered.
        tables: Vec<TableName>,
    },

    /// The same table was registered twice.
    #[error("table '{0}' registered twice")]
    DuplicateTable(TableName),

    /// A table name failed validation.
    #[error(transparent)]
    InvalidTableName(#[from] ProtocolError),

    /// Periodic sync requested without an interval.
    #[error("sync_interval must be set to run the scheduler")]
    MissingSyncInterval,
}

fn join(tables: &[TableName]) -> String {
    tables
        .iter()
        .map(TableName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by a local replica.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A journal entry could not be encoded or decoded.
    #[error("journal codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// The replica's persisted state is inconsistent.
    #[error("replica corrupted: {0}")]
    Corrupted(String),

    /// The replica refused the operation (e.g. injected fault, read-only).
    #[error("replica unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad request").is_retryable());
        assert!(SyncError::LocalStore(StoreError::Unavailable("disk full".into())).is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Configuration(ConfigError::MissingSyncInterval).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ConfigError::DependencyCycle {
            tables: vec![name("receipts"), name("payments")],
        };
        assert_eq!(
            err.to_string(),
            "cyclic table references among: receipts, payments"
        );

        let err = SyncError::DependencyFailed {
            table: name("payments"),
            dependency: name("receipts"),
        };
        assert!(err.to_string().contains("'receipts' failed"));
    }
}
