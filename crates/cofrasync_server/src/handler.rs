//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::RemoteStore;
use cofrasync_protocol::{
    DeleteRequest, DeleteResponse, PullRequest, PullResponse, PushAck, PushRequest, RequestHeader,
    PROTOCOL_VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared state of every handler.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Authoritative store.
    pub store: Arc<RemoteStore>,
    available: AtomicBool,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<RemoteStore>) -> Self {
        Self {
            config,
            store,
            available: AtomicBool::new(true),
        }
    }

    /// Makes every request fail with a retryable error while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn admit(&self, header: &RequestHeader) -> ServerResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ServerError::Unavailable("service paused".into()));
        }
        if header.protocol_version != PROTOCOL_VERSION {
            return Err(ServerError::UnsupportedVersion {
                got: header.protocol_version,
                expected: PROTOCOL_VERSION,
            });
        }
        Ok(())
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushAck> {
        self.context.admit(&request.header)?;
        let max = self.context.config.max_push_batch;
        if request.records.len() > max {
            return Err(ServerError::BatchTooLarge {
                size: request.records.len(),
                max,
            });
        }
        Ok(self.context.store.upsert(&request.table, request.records))
    }

    /// Handles a delete request.
    pub fn handle_delete(&self, request: DeleteRequest) -> ServerResult<DeleteResponse> {
        self.context.admit(&request.header)?;
        let deleted = self.context.store.delete(&request.table, &request.ids);
        Ok(DeleteResponse { deleted })
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        self.context.admit(&request.header)?;
        let changes = self.context.store.changes_since(
            &request.table,
            request.since,
            self.context.config.max_pull_batch,
        );
        Ok(PullResponse { changes })
    }
}
