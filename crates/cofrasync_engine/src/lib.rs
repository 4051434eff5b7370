//! # cofrasync engine
//!
//! Offline-first synchronization between a local replica and the office's
//! remote data service.
//!
//! This crate provides:
//! - the ports the engine talks through ([`RemoteTransport`],
//!   [`LocalStore`], [`SyncLedger`], [`Replica`])
//! - an in-memory replica and a durable, journal-backed one
//! - the table registry and its dependency ordering
//! - the single-flight [`SyncEngine`] and its [`SyncReport`]
//! - an HTTP transport adapter and a periodic scheduler
//!
//! ## Cycle
//!
//! Tables are processed one at a time, referenced tables first. Each table
//! pushes, propagates deletions, pulls, resolves and applies, and only then
//! commits its cursor. A failed table leaves its cursor where it was, so
//! re-running a whole cycle is always safe.
//!
//! ```rust
//! use std::sync::Arc;
//! use cofrasync_engine::{MemoryReplica, MockTransport, SyncConfig, SyncEngine, TableRegistry};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = SyncEngine::new(
//!     SyncConfig::default(),
//!     Arc::new(MockTransport::new()),
//!     Arc::new(MemoryReplica::new()),
//! )
//! .with_tables(TableRegistry::standard().unwrap().tables().to_vec())
//! .unwrap();
//!
//! let report = engine.sync().await.unwrap();
//! assert!(report.is_success());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod registry;
pub mod replica;
mod report;
mod scheduler;
mod state;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use engine::{watermark, SyncEngine};
pub use error::{ConfigError, StoreError, StoreResult, SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer, DELETE_PATH, PULL_PATH, PUSH_PATH};
pub use registry::TableRegistry;
pub use replica::{
    ApplyOutcome, JournalReplica, LocalStore, MemoryReplica, RemoteBatch, Replica, SyncLedger,
};
pub use report::{SyncReport, TableOutcome, TableStats};
pub use scheduler::SyncScheduler;
pub use state::{SyncState, SyncStats};
pub use transport::{MockTransport, RemoteTransport};
