//! Wire messages exchanged with the remote service.
//!
//! Each HTTP exchange carries one CBOR-encoded [`SyncMessage`] in each
//! direction. Requests name the table they act on; the remote replies with
//! the matching response variant or [`SyncMessage::Error`].

use crate::change::{PushAck, RemoteChange};
use crate::codec::{from_cbor, to_cbor};
use crate::error::ProtocolResult;
use crate::id::RecordId;
use crate::record::Record;
use crate::table::TableName;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire protocol version carried in every request.
pub const PROTOCOL_VERSION: u16 = 1;

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMessage {
    /// Upsert records.
    PushRequest(PushRequest),
    /// Result of a push.
    PushResponse(PushAck),
    /// Delete records by id.
    DeleteRequest(DeleteRequest),
    /// Result of a delete.
    DeleteResponse(DeleteResponse),
    /// Fetch changes after a cursor.
    PullRequest(PullRequest),
    /// Changes after the requested cursor.
    PullResponse(PullResponse),
    /// Request failed.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::PushRequest(_) => "push_request",
            SyncMessage::PushResponse(_) => "push_response",
            SyncMessage::DeleteRequest(_) => "delete_request",
            SyncMessage::DeleteResponse(_) => "delete_response",
            SyncMessage::PullRequest(_) => "pull_request",
            SyncMessage::PullResponse(_) => "pull_response",
            SyncMessage::Error(_) => "error",
        }
    }

    /// Encodes to CBOR.
    ///
    /// # Errors
    ///
    /// Returns an encode error if serialization fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    ///
    /// # Errors
    ///
    /// Returns a decode error for malformed bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Header shared by all requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Sending device.
    pub device_id: Uuid,
    /// Protocol version the client speaks.
    pub protocol_version: u16,
}

impl RequestHeader {
    /// A header for `device_id` at the current protocol version.
    #[must_use]
    pub fn new(device_id: Uuid) -> Self {
        Self {
            device_id,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Upsert a batch of records into one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Target table.
    pub table: TableName,
    /// Records to upsert.
    pub records: Vec<Record>,
}

/// Delete records from one table. Unknown ids are not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Target table.
    pub table: TableName,
    /// Ids to delete.
    pub ids: Vec<RecordId>,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// How many ids were live on the remote before the call.
    pub deleted: usize,
}

/// Fetch a table's changes stamped after `since`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Source table.
    pub table: TableName,
    /// Exclusive lower bound; `None` pulls everything.
    pub since: Option<Timestamp>,
}

/// Changes in ascending `changed_at` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Changes.
    pub changes: Vec<RemoteChange>,
}

/// Error categories reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or unexpected request.
    BadRequest,
    /// Client protocol version is not supported.
    UnsupportedVersion,
    /// Batch exceeds the remote's limit.
    BatchTooLarge,
    /// Remote-side failure.
    Internal,
    /// Remote temporarily unavailable.
    Unavailable,
}

/// Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorResponse {
    /// Builds an error reply.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether repeating the same request later can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::Internal | ErrorCode::Unavailable)
    }
}
