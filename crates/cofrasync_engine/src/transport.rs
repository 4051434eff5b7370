//! Transport port to the remote data service.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use cofrasync_protocol::{PushAck, Record, RecordId, RemoteChange, TableName, Timestamp};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// The remote service as three idempotent operations.
///
/// Implementations map their failures to [`SyncError::Transport`] with the
/// right `retryable` flag; the engine never retries on its own.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Upserts `records`. Re-sending records the remote already holds is a
    /// no-op.
    async fn push(&self, table: &TableName, records: &[Record]) -> SyncResult<PushAck>;

    /// Deletes `ids`. Ids the remote does not hold are not an error.
    async fn delete(&self, table: &TableName, ids: &[RecordId]) -> SyncResult<()>;

    /// Changes stamped after `since` (everything if `None`), ascending.
    async fn pull(&self, table: &TableName, since: Option<Timestamp>)
        -> SyncResult<Vec<RemoteChange>>;
}

/// A scripted transport for unit tests.
///
/// Pushes and deletes are recorded and acknowledged; pulls return the
/// changes set per table, filtered by `since`.
#[derive(Debug, Default)]
pub struct MockTransport {
    disconnected: AtomicBool,
    failing: Mutex<HashSet<TableName>>,
    changes: Mutex<HashMap<TableName, Vec<RemoteChange>>>,
    pushed: Mutex<Vec<(TableName, Vec<Record>)>>,
    deleted: Mutex<Vec<(TableName, Vec<RecordId>)>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the change feed of `table`.
    pub fn set_changes(&self, table: &TableName, changes: Vec<RemoteChange>) {
        self.changes.lock().insert(table.clone(), changes);
    }

    /// Makes every call for `table` fail with a retryable error.
    pub fn fail_table(&self, table: &TableName) {
        self.failing.lock().insert(table.clone());
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Push calls so far, one entry per batch.
    pub fn pushed(&self) -> Vec<(TableName, Vec<Record>)> {
        self.pushed.lock().clone()
    }

    /// Delete calls so far.
    pub fn deleted(&self) -> Vec<(TableName, Vec<RecordId>)> {
        self.deleted.lock().clone()
    }

    fn check(&self, table: &TableName) -> SyncResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        if self.failing.lock().contains(table) {
            return Err(SyncError::transport_retryable(format!("{table}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn push(&self, table: &TableName, records: &[Record]) -> SyncResult<PushAck> {
        self.check(table)?;
        self.pushed.lock().push((table.clone(), records.to_vec()));
        Ok(PushAck {
            applied: records.len(),
            superseded: Vec::new(),
        })
    }

    async fn delete(&self, table: &TableName, ids: &[RecordId]) -> SyncResult<()> {
        self.check(table)?;
        self.deleted.lock().push((table.clone(), ids.to_vec()));
        Ok(())
    }

    async fn pull(
        &self,
        table: &TableName,
        since: Option<Timestamp>,
    ) -> SyncResult<Vec<RemoteChange>> {
        self.check(table)?;
        Ok(self
            .changes
            .lock()
            .get(table)
            .map(|changes| {
                changes
                    .iter()
                    .filter(|c| since.map_or(true, |s| c.changed_at > s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableName {
        TableName::new("people").unwrap()
    }

    #[tokio::test]
    async fn mock_transport_not_connected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);
        let result = transport.pull(&people(), None).await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[tokio::test]
    async fn mock_pull_filters_by_since() {
        let transport = MockTransport::new();
        let changes: Vec<_> = (1..=3)
            .map(|i| {
                RemoteChange::upsert(
                    Record::create(Vec::new(), Timestamp::from_millis(i)),
                    Timestamp::from_millis(i),
                )
            })
            .collect();
        transport.set_changes(&people(), changes);
        let pulled = transport
            .pull(&people(), Some(Timestamp::from_millis(1)))
            .await
            .unwrap();
        assert_eq!(pulled.len(), 2);
    }

    #[tokio::test]
    async fn failing_table_is_retryable() {
        let transport = MockTransport::new();
        transport.fail_table(&people());
        let err = transport.push(&people(), &[]).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(transport.pushed().is_empty());
    }
}
