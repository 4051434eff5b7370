//! HTTP transport implementation.
//!
//! The HTTP client itself is abstracted behind [`HttpClient`] so any
//! library (or an in-process loopback) can carry the CBOR bodies.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use async_trait::async_trait;
use cofrasync_protocol::{
    DeleteRequest, PullRequest, PushAck, PushRequest, Record, RecordId, RemoteChange,
    RequestHeader, SyncMessage, TableName, Timestamp,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};
use uuid::Uuid;

/// Endpoint for pushes.
pub const PUSH_PATH: &str = "/sync/push";
/// Endpoint for deletes.
pub const DELETE_PATH: &str = "/sync/delete";
/// Endpoint for pulls.
pub const PULL_PATH: &str = "/sync/pull";

/// HTTP client abstraction.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based sync transport.
///
/// Every call posts one CBOR [`SyncMessage`] and expects the matching
/// response variant back.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    header: RequestHeader,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport sending requests as `device_id`.
    pub fn new(base_url: impl Into<String>, client: C, device_id: Uuid) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            header: RequestHeader::new(device_id),
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Whether the transport accepts calls.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Marks the transport connected again after a failure or `close`.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Stops accepting calls.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn post_message(&self, endpoint: &str, message: SyncMessage) -> SyncResult<SyncMessage> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = message.encode()?;
        let url = format!("{}{}", self.base_url, endpoint);
        trace!(url = %url, kind = message.kind(), bytes = body.len(), "posting sync message");

        let response = match self.client.post(&url, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "sync request failed");
                *self.last_error.write() = Some(e.clone());
                self.connected.store(false, Ordering::SeqCst);
                return Err(SyncError::transport_retryable(e));
            }
        };
        *self.last_error.write() = None;

        match SyncMessage::decode(&response)? {
            SyncMessage::Error(error) => Err(SyncError::Transport {
                retryable: error.is_retryable(),
                message: format!("{:?}: {}", error.code, error.message),
            }),
            reply => Ok(reply),
        }
    }
}

fn unexpected(expected: &str, got: &SyncMessage) -> SyncError {
    SyncError::transport_fatal(format!("expected {expected}, got {}", got.kind()))
}

#[async_trait]
impl<C: HttpClient> RemoteTransport for HttpTransport<C> {
    async fn push(&self, table: &TableName, records: &[Record]) -> SyncResult<PushAck> {
        let request = SyncMessage::PushRequest(PushRequest {
            header: self.header,
            table: table.clone(),
            records: records.to_vec(),
        });
        match self.post_message(PUSH_PATH, request).await? {
            SyncMessage::PushResponse(ack) => Ok(ack),
            other => Err(unexpected("push_response", &other)),
        }
    }

    async fn delete(&self, table: &TableName, ids: &[RecordId]) -> SyncResult<()> {
        let request = SyncMessage::DeleteRequest(DeleteRequest {
            header: self.header,
            table: table.clone(),
            ids: ids.to_vec(),
        });
        match self.post_message(DELETE_PATH, request).await? {
            SyncMessage::DeleteResponse(_) => Ok(()),
            other => Err(unexpected("delete_response", &other)),
        }
    }

    async fn pull(
        &self,
        table: &TableName,
        since: Option<Timestamp>,
    ) -> SyncResult<Vec<RemoteChange>> {
        let request = SyncMessage::PullRequest(PullRequest {
            header: self.header,
            table: table.clone(),
            since,
        });
        match self.post_message(PULL_PATH, request).await? {
            SyncMessage::PullResponse(response) => Ok(response.changes),
            other => Err(unexpected("pull_response", &other)),
        }
    }
}

/// Servers that can answer loopback requests in-process.
pub trait LoopbackServer {
    /// Handles a POST to `path` and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = url.find("/sync/").map_or(url, |i| &url[i..]);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
