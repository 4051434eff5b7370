//! Message-level entry point of the reference remote.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::RemoteStore;
use cofrasync_protocol::{Clock, SyncMessage};
use std::sync::Arc;
use tracing::{debug, warn};

/// The reference remote data service.
///
/// Transport-agnostic: HTTP front ends (or the in-process loopback used in
/// tests) hand it decoded [`SyncMessage`]s or raw CBOR bodies.
///
/// # Example
///
/// ```
/// use cofrasync_protocol::{PullRequest, RequestHeader, SyncMessage, TableName};
/// use cofrasync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let reply = server.handle_message(SyncMessage::PullRequest(PullRequest {
///     header: RequestHeader::new(Default::default()),
///     table: TableName::new("people").unwrap(),
///     since: None,
/// }));
/// assert!(matches!(reply, SyncMessage::PullResponse(r) if r.changes.is_empty()));
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server with an empty store on the system clock.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(RemoteStore::new()))
    }

    /// Creates a server with an empty store stamping with `clock`.
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_store(config, Arc::new(RemoteStore::with_clock(clock)))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<RemoteStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// The authoritative store.
    pub fn store(&self) -> &Arc<RemoteStore> {
        &self.context.store
    }

    /// Pauses or resumes the service. While paused every request gets a
    /// retryable `Unavailable` reply.
    pub fn set_available(&self, available: bool) {
        self.context.set_available(available);
    }

    /// Handles one request message and returns the reply, which is
    /// [`SyncMessage::Error`] when the request fails.
    pub fn handle_message(&self, message: SyncMessage) -> SyncMessage {
        let kind = message.kind();
        match self.dispatch(message) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(request = kind, error = %e, "request rejected");
                SyncMessage::Error(e.to_response())
            }
        }
    }

    /// Handles a CBOR request body posted to `path` and returns the CBOR
    /// reply body.
    ///
    /// # Errors
    ///
    /// Returns an error only if the reply cannot be encoded; request
    /// failures are encoded as error replies.
    pub fn handle_bytes(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let reply = match SyncMessage::decode(body) {
            Ok(message) if endpoint_of(&message) == Some(path) => self.handle_message(message),
            Ok(message) => SyncMessage::Error(
                ServerError::InvalidRequest(format!("{} posted to {path}", message.kind()))
                    .to_response(),
            ),
            Err(e) => SyncMessage::Error(ServerError::Codec(e).to_response()),
        };
        Ok(reply.encode()?)
    }

    fn dispatch(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        debug!(request = message.kind(), "handling request");
        match message {
            SyncMessage::PushRequest(request) => {
                self.handler.handle_push(request).map(SyncMessage::PushResponse)
            }
            SyncMessage::DeleteRequest(request) => self
                .handler
                .handle_delete(request)
                .map(SyncMessage::DeleteResponse),
            SyncMessage::PullRequest(request) => {
                self.handler.handle_pull(request).map(SyncMessage::PullResponse)
            }
            other => Err(ServerError::InvalidRequest(format!(
                "unexpected message {}",
                other.kind()
            ))),
        }
    }
}

/// Path a request message is posted to.
pub fn endpoint_of(message: &SyncMessage) -> Option<&'static str> {
    match message {
        SyncMessage::PushRequest(_) => Some("/sync/push"),
        SyncMessage::DeleteRequest(_) => Some("/sync/delete"),
        SyncMessage::PullRequest(_) => Some("/sync/pull"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofrasync_protocol::{
        DeleteRequest, ErrorCode, PullRequest, PushRequest, Record, RequestHeader, TableName,
        Timestamp,
    };
    use uuid::Uuid;

    fn people() -> TableName {
        TableName::new("people").unwrap()
    }

    fn header() -> RequestHeader {
        RequestHeader::new(Uuid::nil())
    }

    #[test]
    fn full_sync_flow() {
        let server = SyncServer::new(ServerConfig::default());
        let record = Record::create(b"ana".to_vec(), Timestamp::from_millis(1));

        let reply = server.handle_message(SyncMessage::PushRequest(PushRequest {
            header: header(),
            table: people(),
            records: vec![record.clone()],
        }));
        assert!(matches!(reply, SyncMessage::PushResponse(ref ack) if ack.applied == 1));

        let reply = server.handle_message(SyncMessage::DeleteRequest(DeleteRequest {
            header: header(),
            table: people(),
            ids: vec![record.id],
        }));
        assert!(matches!(reply, SyncMessage::DeleteResponse(ref r) if r.deleted == 1));
        assert!(server.store().is_deleted(&people(), record.id));
    }

    #[test]
    fn response_messages_are_not_requests() {
        let server = SyncServer::new(ServerConfig::default());
        let reply = server.handle_message(SyncMessage::PushResponse(Default::default()));
        assert!(matches!(reply, SyncMessage::Error(ref e) if e.code == ErrorCode::BadRequest));
    }

    #[test]
    fn bytes_round_trip_through_the_right_endpoint() {
        let server = SyncServer::new(ServerConfig::default());
        let request = SyncMessage::PullRequest(PullRequest {
            header: header(),
            table: people(),
            since: None,
        });
        let body = request.encode().unwrap();

        let reply = SyncMessage::decode(&server.handle_bytes("/sync/pull", &body).unwrap()).unwrap();
        assert!(matches!(reply, SyncMessage::PullResponse(_)));

        let reply = SyncMessage::decode(&server.handle_bytes("/sync/push", &body).unwrap()).unwrap();
        assert!(matches!(reply, SyncMessage::Error(ref e) if e.code == ErrorCode::BadRequest));

        let reply = SyncMessage::decode(&server.handle_bytes("/sync/pull", b"\xff\x00").unwrap()).unwrap();
        assert!(matches!(reply, SyncMessage::Error(_)));
    }

    #[test]
    fn paused_server_replies_retryable() {
        let server = SyncServer::new(ServerConfig::default());
        server.set_available(false);
        let reply = server.handle_message(SyncMessage::PullRequest(PullRequest {
            header: header(),
            table: people(),
            since: None,
        }));
        assert!(matches!(reply, SyncMessage::Error(ref e) if e.is_retryable()));
    }
}
