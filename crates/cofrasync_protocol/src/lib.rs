//! # cofrasync protocol
//!
//! Shared vocabulary of the sync layer. No I/O.
//!
//! - [`Record`]: versioned envelope around an opaque payload
//! - [`Tombstone`], [`SyncCursor`]: per-table sync bookkeeping
//! - [`resolve`]: the conflict rule both sides apply
//! - [`RemoteChange`], [`PushAck`]: what the remote answers
//! - [`SyncMessage`]: CBOR wire messages
//! - [`schema`]: typed payloads of the standard tables
//!
//! ```rust
//! use cofrasync_protocol::{resolve, Record, Resolution, Timestamp};
//!
//! let local = Record::create(b"v1".to_vec(), Timestamp::from_millis(1_000));
//! let remote = local.revise(b"v2".to_vec(), Timestamp::from_millis(2_000));
//! assert_eq!(resolve(Some(&local), false, &remote), Resolution::Replace);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod codec;
mod conflict;
mod error;
mod id;
mod messages;
mod record;
pub mod schema;
mod table;
mod time;

pub use change::{Change, PushAck, RemoteChange};
pub use codec::{from_cbor, to_cbor};
pub use conflict::{resolve, supersedes, Resolution};
pub use error::{ProtocolError, ProtocolResult};
pub use id::RecordId;
pub use messages::{
    DeleteRequest, DeleteResponse, ErrorCode, ErrorResponse, PullRequest, PullResponse,
    PushRequest, RequestHeader, SyncMessage, PROTOCOL_VERSION,
};
pub use record::{Record, SyncCursor, Tombstone};
pub use table::{TableName, TableSpec};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
