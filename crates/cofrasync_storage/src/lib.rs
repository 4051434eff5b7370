//! # cofrasync storage
//!
//! Durable byte storage for client replicas.
//!
//! - [`StorageBackend`]: opaque append-only byte store ([`InMemoryBackend`], [`FileBackend`])
//! - [`Journal`]: CRC-checked frames over a backend, one frame per atomic
//!   replica mutation, with torn-tail recovery
//! - [`ReplicaDir`]: locked directory holding a replica journal
//!
//! ```rust
//! use cofrasync_storage::{InMemoryBackend, Journal, JournalOptions};
//!
//! let journal = Journal::new(Box::new(InMemoryBackend::new()), JournalOptions::default());
//! journal.append(b"delete people 42 + tombstone").unwrap();
//! let scan = journal.recover().unwrap();
//! assert_eq!(scan.frames.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod crc;
mod dir;
mod error;
mod file;
mod journal;
mod memory;

pub use backend::StorageBackend;
pub use crc::crc32;
pub use dir::ReplicaDir;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use journal::{Frame, Journal, JournalOptions, JournalScan, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use memory::InMemoryBackend;
