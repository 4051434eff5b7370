//! # cofrasync server
//!
//! Reference implementation of the remote data service the sync engine
//! talks to.
//!
//! This crate provides:
//! - an authoritative in-memory [`RemoteStore`] with a per-table change
//!   feed of upserts and deletions
//! - conditional upserts using the same conflict rule as clients
//! - request handlers for push, delete and pull
//! - a message- and byte-level [`SyncServer`] entry point
//!
//! # Protocol
//!
//! Every request carries one table. Pushes only replace stored records they
//! supersede, so re-sending a batch is harmless. Deletions are final. Pulls
//! return each changed id once, in the order its latest change was
//! stamped.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{endpoint_of, SyncServer};
pub use store::RemoteStore;
