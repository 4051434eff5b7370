//! # cofrasync testkit
//!
//! Test utilities for cofrasync.
//!
//! This crate provides:
//! - Office payload fixtures and temporary replicas
//! - Property-based generators using proptest
//! - A crashable storage backend for durability tests
//! - An in-process transport with fault injection
//! - A multi-client harness over one in-process remote
//! - Fuzz harnesses for the wire codec and the journal
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cofrasync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn two_clients_converge() {
//!     let office = Office::new();
//!     let clients = [office.client(), office.client()];
//!     clients[0].create(&table("people"), b"ana".to_vec());
//!     settle(&clients).await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod harness;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::transport::*;
}

pub use crash::CrashableBackend;
pub use fixtures::{table, ts, TempReplica};
pub use harness::{run_ops, settle, Client, ClientEngine, Office, TICK_MILLIS};
pub use transport::{InProcessTransport, Operation, ServerEndpoint};
