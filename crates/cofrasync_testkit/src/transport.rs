//! Transports wiring engines to an in-process [`SyncServer`].

use async_trait::async_trait;
use cofrasync_engine::{LoopbackServer, RemoteTransport, SyncError, SyncResult};
use cofrasync_protocol::{
    DeleteRequest, PullRequest, PushAck, PushRequest, Record, RecordId, RemoteChange,
    RequestHeader, SyncMessage, TableName, Timestamp,
};
use cofrasync_server::SyncServer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// A transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `push`.
    Push,
    /// `delete`.
    Delete,
    /// `pull`.
    Pull,
}

/// Calls a [`SyncServer`] directly, with fault injection.
///
/// - [`fail_next`](Self::fail_next) makes the next calls of one operation
///   on one table fail with a retryable error
/// - [`set_offline`](Self::set_offline) makes every call fail with
///   `NotConnected`
/// - [`hold_pulls`](Self::hold_pulls) parks pulls until released, to
///   overlap `sync()` calls deterministically
pub struct InProcessTransport {
    server: Arc<SyncServer>,
    header: RequestHeader,
    offline: AtomicBool,
    faults: Mutex<HashMap<(Operation, TableName), usize>>,
    calls: Mutex<Vec<(Operation, TableName)>>,
    gate: watch::Sender<bool>,
    parked: AtomicUsize,
}

impl InProcessTransport {
    /// A transport for a client with a random device id.
    pub fn new(server: Arc<SyncServer>) -> Self {
        Self::with_device(server, Uuid::new_v4())
    }

    /// A transport for `device_id`.
    pub fn with_device(server: Arc<SyncServer>, device_id: Uuid) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            server,
            header: RequestHeader::new(device_id),
            offline: AtomicBool::new(false),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate,
            parked: AtomicUsize::new(0),
        }
    }

    /// The server behind this transport.
    pub fn server(&self) -> &Arc<SyncServer> {
        &self.server
    }

    /// Fails the next `times` calls of `operation` on `table`.
    pub fn fail_next(&self, operation: Operation, table: &TableName, times: usize) {
        *self
            .faults
            .lock()
            .entry((operation, table.clone()))
            .or_default() += times;
    }

    /// Takes the transport offline or back online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Parks every pull until [`release_pulls`](Self::release_pulls).
    pub fn hold_pulls(&self) {
        self.gate.send_replace(false);
    }

    /// Lets parked and future pulls through.
    pub fn release_pulls(&self) {
        self.gate.send_replace(true);
    }

    /// Pulls currently parked.
    pub fn parked_pulls(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    /// Every call so far, including failed ones.
    pub fn calls(&self) -> Vec<(Operation, TableName)> {
        self.calls.lock().clone()
    }

    /// Calls of `operation` so far.
    pub fn count(&self, operation: Operation) -> usize {
        self.calls.lock().iter().filter(|(op, _)| *op == operation).count()
    }

    fn begin(&self, operation: Operation, table: &TableName) -> SyncResult<()> {
        self.calls.lock().push((operation, table.clone()));
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        let mut faults = self.faults.lock();
        if let Some(remaining) = faults.get_mut(&(operation, table.clone())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SyncError::transport_retryable(format!(
                    "injected {operation:?} failure on {table}"
                )));
            }
        }
        Ok(())
    }

    fn exchange(&self, request: SyncMessage) -> SyncResult<SyncMessage> {
        match self.server.handle_message(request) {
            SyncMessage::Error(error) => Err(SyncError::Transport {
                retryable: error.is_retryable(),
                message: error.message,
            }),
            reply => Ok(reply),
        }
    }
}

fn unexpected(reply: &SyncMessage) -> SyncError {
    SyncError::transport_fatal(format!("unexpected reply {}", reply.kind()))
}

#[async_trait]
impl RemoteTransport for InProcessTransport {
    async fn push(&self, table: &TableName, records: &[Record]) -> SyncResult<PushAck> {
        self.begin(Operation::Push, table)?;
        match self.exchange(SyncMessage::PushRequest(PushRequest {
            header: self.header,
            table: table.clone(),
            records: records.to_vec(),
        }))? {
            SyncMessage::PushResponse(ack) => Ok(ack),
            other => Err(unexpected(&other)),
        }
    }

    async fn delete(&self, table: &TableName, ids: &[RecordId]) -> SyncResult<()> {
        self.begin(Operation::Delete, table)?;
        match self.exchange(SyncMessage::DeleteRequest(DeleteRequest {
            header: self.header,
            table: table.clone(),
            ids: ids.to_vec(),
        }))? {
            SyncMessage::DeleteResponse(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn pull(
        &self,
        table: &TableName,
        since: Option<Timestamp>,
    ) -> SyncResult<Vec<RemoteChange>> {
        self.begin(Operation::Pull, table)?;
        let mut gate = self.gate.subscribe();
        if !*gate.borrow() {
            self.parked.fetch_add(1, Ordering::SeqCst);
            let opened = gate.wait_for(|open| *open).await.map(|_| ());
            self.parked.fetch_sub(1, Ordering::SeqCst);
            opened.map_err(|_| SyncError::transport_retryable("transport dropped"))?;
        }
        match self.exchange(SyncMessage::PullRequest(PullRequest {
            header: self.header,
            table: table.clone(),
            since,
        }))? {
            SyncMessage::PullResponse(response) => Ok(response.changes),
            other => Err(unexpected(&other)),
        }
    }
}

/// Exposes a [`SyncServer`] to [`cofrasync_engine::LoopbackClient`].
#[derive(Clone)]
pub struct ServerEndpoint(pub Arc<SyncServer>);

impl LoopbackServer for ServerEndpoint {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.0.handle_bytes(path, body).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{table, ts};
    use cofrasync_server::ServerConfig;

    fn transport() -> InProcessTransport {
        InProcessTransport::new(Arc::new(SyncServer::new(ServerConfig::default())))
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let transport = transport();
        let people = table("people");
        transport.fail_next(Operation::Delete, &people, 1);

        let err = transport.delete(&people, &[RecordId::new()]).await.unwrap_err();
        assert!(err.is_retryable());
        transport.delete(&people, &[RecordId::new()]).await.unwrap();
        assert_eq!(transport.count(Operation::Delete), 2);
    }

    #[tokio::test]
    async fn push_then_pull_through_the_server() {
        let transport = transport();
        let people = table("people");
        let record = Record::create(b"ana".to_vec(), ts(10));
        let ack = transport.push(&people, &[record.clone()]).await.unwrap();
        assert_eq!(ack.applied, 1);

        let changes = transport.pull(&people, None).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].id(), record.id);
        assert!(transport.pull(&people, Some(changes[0].changed_at)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_transport_is_not_connected() {
        let transport = transport();
        transport.set_offline(true);
        let err = transport.pull(&table("people"), None).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected));
    }

    #[tokio::test]
    async fn held_pull_waits_for_release() {
        let transport = Arc::new(transport());
        transport.hold_pulls();
        let pulling = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.pull(&table("people"), None).await })
        };
        while transport.parked_pulls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!pulling.is_finished());
        transport.release_pulls();
        assert!(pulling.await.unwrap().unwrap().is_empty());
    }
}
