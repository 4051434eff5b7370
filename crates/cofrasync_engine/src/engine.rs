//! The synchronization engine.
//!
//! One cycle walks the registered tables in dependency order. Per table:
//!
//! 1. read the local clock as the cycle's boundary, then push records
//!    written at or after the previous boundary
//! 2. send tombstoned ids to the remote and purge them on success
//! 3. pull remote changes stamped after the remote watermark
//! 4. stage them (remote deletions beat remote upserts)
//! 5. resolve and apply them atomically in the replica
//! 6. commit the new boundary together with the highest change stamp
//!    pulled
//!
//! The boundary and the watermark come from different clocks and are never
//! compared with each other. A local write that lands while a cycle runs is
//! at or after that cycle's boundary, so the next cycle pushes it.
//!
//! Any failure stops the table before step 6, so the next cycle retries the
//! same window. Other tables carry on.

use crate::config::SyncConfig;
use crate::error::{ConfigError, SyncError, SyncResult};
use crate::registry::TableRegistry;
use crate::replica::{RemoteBatch, Replica};
use crate::report::{SyncReport, TableOutcome, TableStats};
use crate::state::{SyncState, SyncStats};
use crate::transport::RemoteTransport;
use cofrasync_protocol::{
    Change, Clock, Record, RecordId, RemoteChange, SyncCursor, SystemClock, TableName, TableSpec,
    Timestamp,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type FlightResult = Option<Result<SyncReport, ConfigError>>;

/// Clears the in-flight slot when the leading `sync()` call finishes or is
/// dropped. Followers of a dropped leader observe a closed channel.
struct FlightGuard<'a>(&'a Mutex<Option<watch::Receiver<FlightResult>>>);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Synchronizes a local replica with the remote service.
///
/// The engine owns cursor and tombstone lifecycles. It holds no global
/// state; create one per session and share it behind an `Arc`.
///
/// # Single flight
///
/// At most one cycle runs at a time. A `sync()` call made while a cycle is
/// running waits for that cycle and returns its report.
pub struct SyncEngine<T: RemoteTransport, R: Replica> {
    config: SyncConfig,
    transport: Arc<T>,
    replica: Arc<R>,
    clock: Arc<dyn Clock>,
    registry: RwLock<TableRegistry>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
    flight: Mutex<Option<watch::Receiver<FlightResult>>>,
}

impl<T: RemoteTransport, R: Replica> SyncEngine<T, R> {
    /// Creates an engine with no tables, using the system clock.
    pub fn new(config: SyncConfig, transport: Arc<T>, replica: Arc<R>) -> Self {
        Self {
            config,
            transport,
            replica,
            clock: Arc::new(SystemClock),
            registry: RwLock::new(TableRegistry::new()),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
            flight: Mutex::new(None),
        }
    }

    /// Replaces the clock used to stamp local deletions and cycle boundaries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers `specs`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTable`] if a table repeats.
    pub fn with_tables(self, specs: impl IntoIterator<Item = TableSpec>) -> Result<Self, ConfigError> {
        for spec in specs {
            self.register_table(spec)?;
        }
        Ok(self)
    }

    /// Registers a table. References are validated when a cycle starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTable`] if the table is registered.
    pub fn register_table(&self, spec: TableSpec) -> Result<(), ConfigError> {
        self.registry.write().register(spec)
    }

    /// Registered tables in registration order.
    pub fn tables(&self) -> Vec<TableSpec> {
        self.registry.read().tables().to_vec()
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The local replica.
    pub fn replica(&self) -> &Arc<R> {
        &self.replica
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Whether a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.flight.lock().is_some()
    }

    /// Asks the running cycle to stop. The table in progress finishes;
    /// remaining tables are reported as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Deletes records locally and records their tombstones atomically.
    /// Returns how many records were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LocalStore`] if the replica fails.
    pub fn record_deletion(&self, table: &TableName, ids: &[RecordId]) -> SyncResult<usize> {
        let deleted = self.replica.delete_tracked(table, ids, self.clock.now())?;
        debug!(table = %table, deleted, "recorded local deletion");
        Ok(deleted)
    }

    /// Resets every cursor so the next cycle re-pushes and re-pulls
    /// everything.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LocalStore`] if the replica fails.
    pub fn resync_from_scratch(&self) -> SyncResult<()> {
        info!("resetting all sync cursors");
        self.replica.clear_cursors()?;
        Ok(())
    }

    /// Runs one cycle over every registered table, or joins the cycle that
    /// is already running.
    ///
    /// # Errors
    ///
    /// Only [`SyncError::Configuration`] when the table graph is invalid, and
    /// [`SyncError::Cancelled`] if the joined cycle was dropped before it
    /// finished. Table failures are reported in the [`SyncReport`].
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        let leader = {
            let mut slot = self.flight.lock();
            match slot.as_ref() {
                Some(running) => Err(running.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    *slot = Some(receiver);
                    Ok(sender)
                }
            }
        };

        match leader {
            Ok(sender) => {
                let _flight = FlightGuard(&self.flight);
                let result = self.run_cycle().await;
                sender.send_replace(Some(result.clone()));
                result.map_err(SyncError::from)
            }
            Err(mut running) => {
                self.stats.write().coalesced_calls += 1;
                debug!("joining in-flight sync");
                let finished = running
                    .wait_for(Option::is_some)
                    .await
                    .map(|value| value.clone())
                    .map_err(|_| SyncError::Cancelled)?;
                match finished {
                    Some(result) => result.map_err(SyncError::from),
                    None => Err(SyncError::Cancelled),
                }
            }
        }
    }

    async fn run_cycle(&self) -> Result<SyncReport, ConfigError> {
        let order = match self.registry.read().ordered() {
            Ok(order) => order,
            Err(e) => {
                error!(error = %e, "sync aborted: invalid table configuration");
                self.set_state(SyncState::Error);
                self.stats.write().last_error = Some(e.to_string());
                return Err(e);
            }
        };

        self.cancelled.store(false, Ordering::SeqCst);
        let started = Instant::now();
        let mut report = SyncReport::default();
        info!(tables = order.len(), "sync cycle started");

        for spec in order {
            let table = spec.name;
            if self.cancelled.load(Ordering::SeqCst) {
                report.record(table, TableOutcome::Failed(Arc::new(SyncError::Cancelled)));
                continue;
            }
            if self.config.skip_dependents_on_failure {
                if let Some(dependency) = spec.depends_on.iter().find(|dep| report.failed(dep)) {
                    warn!(table = %table, dependency = %dependency, "skipping table: referenced table failed");
                    let error = SyncError::DependencyFailed {
                        table: table.clone(),
                        dependency: dependency.clone(),
                    };
                    report.record(table, TableOutcome::Failed(Arc::new(error)));
                    continue;
                }
            }

            match self.sync_table(&table).await {
                Ok(stats) => {
                    debug!(
                        table = %table,
                        pushed = stats.pushed,
                        pulled = stats.pulled,
                        deleted = stats.deleted,
                        "table synced"
                    );
                    report.record(table, TableOutcome::Succeeded(stats));
                }
                Err(e) => {
                    warn!(table = %table, error = %e, retryable = e.is_retryable(), "table sync failed");
                    report.record(table, TableOutcome::Failed(Arc::new(e)));
                }
            }
        }

        report.set_duration(started.elapsed());
        self.finish(&report);
        Ok(report)
    }

    async fn sync_table(&self, table: &TableName) -> SyncResult<TableStats> {
        let cursor = self.replica.cursor(table)?;
        let boundary = self.clock.now();
        let mut stats = TableStats::default();

        self.set_state(SyncState::Pushing);
        let dirty = self.replica.read_all(table, cursor.last_synced_at)?;
        let mut superseded = Vec::new();
        for batch in dirty.chunks(self.config.push_batch_size.max(1)) {
            let ack = self.transport.push(table, batch).await?;
            stats.pushed += batch.len();
            stats.accepted += ack.applied;
            superseded.extend(ack.superseded);
        }

        self.set_state(SyncState::Propagating);
        let pending = self.replica.tombstones(table)?;
        if !pending.is_empty() {
            let ids: Vec<RecordId> = pending.iter().map(|t| t.id).collect();
            self.transport.delete(table, &ids).await?;
            self.replica.purge_tombstones(table, &ids)?;
            stats.deleted = ids.len();
        }

        self.set_state(SyncState::Pulling);
        let mut changes = self.transport.pull(table, cursor.pulled_through).await?;
        changes.sort_by_key(|c| c.changed_at);
        stats.pulled = changes.len();
        let pulled_through = cursor.pulled_through.max(watermark(&changes));

        self.set_state(SyncState::Applying);
        let batch = stage(superseded, changes);
        if !batch.is_empty() {
            stats.applied = self.replica.apply_remote(table, batch)?;
        }

        self.replica
            .set_cursor(&SyncCursor::at(table.clone(), boundary).pulled_through(pulled_through))?;
        Ok(stats)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn finish(&self, report: &SyncReport) {
        self.set_state(if report.is_success() {
            SyncState::Synced
        } else {
            SyncState::Error
        });

        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.last_sync_time = Some(Instant::now());
        stats.last_error = None;
        for (table, outcome) in report.iter() {
            match outcome {
                TableOutcome::Succeeded(table_stats) => {
                    stats.tables_succeeded += 1;
                    stats.records_pushed += table_stats.pushed as u64;
                    stats.changes_pulled += table_stats.pulled as u64;
                    stats.tombstones_propagated += table_stats.deleted as u64;
                    stats.conflicts_kept_local += table_stats.applied.kept_local as u64;
                }
                TableOutcome::Failed(e) => {
                    stats.tables_failed += 1;
                    if stats.last_error.is_none() {
                        stats.last_error = Some(format!("{table}: {e}"));
                    }
                }
            }
        }
        info!(
            success = report.is_success(),
            pushed = report.total_pushed(),
            accepted = report.total_accepted(),
            pulled = report.total_pulled(),
            elapsed_ms = report.duration().as_millis() as u64,
            "sync cycle finished"
        );
    }
}

/// Collapses pushed-back winners and pulled changes into one batch per id.
/// Later entries replace earlier ones, except that a remote deletion is
/// final.
fn stage(superseded: Vec<Record>, changes: Vec<RemoteChange>) -> RemoteBatch {
    let mut staged: BTreeMap<RecordId, Option<Record>> = BTreeMap::new();
    for record in superseded {
        staged.insert(record.id, Some(record));
    }
    for change in changes {
        match change.change {
            Change::Upsert(record) => {
                if !matches!(staged.get(&record.id), Some(None)) {
                    staged.insert(record.id, Some(record));
                }
            }
            Change::Delete(tombstone) => {
                staged.insert(tombstone.id, None);
            }
        }
    }

    let mut batch = RemoteBatch::default();
    for (id, record) in staged {
        match record {
            Some(record) => batch.upserts.push(record),
            None => batch.deletions.push(id),
        }
    }
    batch
}

/// Latest change stamp of a pull, for callers that page manually.
pub fn watermark(changes: &[RemoteChange]) -> Option<Timestamp> {
    changes.iter().map(|c| c.changed_at).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::{LocalStore, MemoryReplica, SyncLedger};
    use crate::transport::MockTransport;
    use cofrasync_protocol::schema::standard_tables;
    use cofrasync_protocol::{ManualClock, Tombstone};

    fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn engine(config: SyncConfig) -> SyncEngine<MockTransport, MemoryReplica> {
        SyncEngine::new(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(MemoryReplica::new()),
        )
        .with_clock(Arc::new(ManualClock::new(ts(10_000))))
        .with_tables(standard_tables().unwrap())
        .unwrap()
    }

    #[tokio::test]
    async fn empty_replica_syncs_every_table() {
        let engine = engine(SyncConfig::default());
        let report = engine.sync().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.iter().count(), 5);
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(engine.stats().cycles_completed, 1);
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn push_is_split_into_batches() {
        let engine = engine(SyncConfig::default().with_push_batch_size(2));
        let records: Vec<_> = (0..5).map(|i| Record::create(vec![i], ts(i64::from(i)))).collect();
        engine.replica().upsert_many(&name("people"), &records).unwrap();

        let report = engine.sync().await.unwrap();
        let people = report.outcome("people").unwrap().stats().unwrap();
        assert_eq!(people.pushed, 5);
        let sizes: Vec<_> = engine.transport().pushed().iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn cursor_moves_to_highest_pulled_stamp() {
        let engine = engine(SyncConfig::default());
        let people = name("people");
        let a = Record::create(b"a".to_vec(), ts(100));
        let b = Record::create(b"b".to_vec(), ts(200));
        engine.transport().set_changes(
            &people,
            vec![
                RemoteChange::upsert(b.clone(), ts(250)),
                RemoteChange::upsert(a.clone(), ts(150)),
            ],
        );

        let report = engine.sync().await.unwrap();
        let stats = report.outcome("people").unwrap().stats().unwrap();
        assert_eq!(stats.pulled, 2);
        assert_eq!(stats.applied.inserted, 2);
        let cursor = engine.replica().cursor(&people).unwrap();
        assert_eq!(cursor.pulled_through, Some(ts(250)));
        assert_eq!(cursor.last_synced_at, Some(ts(10_000)));

        // nothing new: watermark stays
        engine.sync().await.unwrap();
        assert_eq!(engine.replica().cursor(&people).unwrap().pulled_through, Some(ts(250)));
    }

    #[tokio::test]
    async fn boundary_advances_when_nothing_is_pulled() {
        let clock = Arc::new(ManualClock::new(ts(10_000)));
        let engine = engine(SyncConfig::default()).with_clock(clock.clone());
        let people = name("people");

        engine.sync().await.unwrap();
        let cursor = engine.replica().cursor(&people).unwrap();
        assert_eq!(cursor.last_synced_at, Some(ts(10_000)));
        assert_eq!(cursor.pulled_through, None);

        clock.advance(500);
        engine.sync().await.unwrap();
        assert_eq!(
            engine.replica().cursor(&people).unwrap().last_synced_at,
            Some(ts(10_500))
        );
    }

    #[tokio::test]
    async fn local_writes_are_pushed_below_a_remote_watermark_ahead_of_them() {
        let clock = Arc::new(ManualClock::new(ts(10_000)));
        let engine = engine(SyncConfig::default()).with_clock(clock.clone());
        let people = name("people");
        let remote = Record::create(b"remote".to_vec(), ts(90_000));
        engine
            .transport()
            .set_changes(&people, vec![RemoteChange::upsert(remote, ts(90_000))]);
        engine.sync().await.unwrap();
        assert_eq!(
            engine.replica().cursor(&people).unwrap().pulled_through,
            Some(ts(90_000))
        );

        let local = Record::create(b"local".to_vec(), clock.advance(1));
        engine.replica().upsert_many(&people, &[local.clone()]).unwrap();
        clock.advance(1);
        let report = engine.sync().await.unwrap();
        let stats = report.outcome("people").unwrap().stats().unwrap();
        assert_eq!(stats.pulled, 0);
        // the pulled record is future-dated locally, so it rides along
        let (table, batch) = engine.transport().pushed().last().cloned().unwrap();
        assert_eq!(table, people);
        assert!(batch.contains(&local));
    }

    #[tokio::test]
    async fn remote_deletion_beats_remote_upsert() {
        let engine = engine(SyncConfig::default());
        let people = name("people");
        let record = Record::create(b"x".to_vec(), ts(5));
        engine.replica().upsert_many(&people, &[record.clone()]).unwrap();
        engine.replica().set_cursor(&SyncCursor::at(people.clone(), ts(5))).unwrap();
        engine.transport().set_changes(
            &people,
            vec![
                RemoteChange::delete(
                    Tombstone {
                        table: people.clone(),
                        id: record.id,
                        deleted_at: ts(6),
                    },
                    ts(6),
                ),
                RemoteChange::upsert(record.revise(b"y".to_vec(), ts(7)), ts(7)),
            ],
        );

        let report = engine.sync().await.unwrap();
        assert_eq!(report.outcome("people").unwrap().stats().unwrap().applied.removed, 1);
        assert!(engine.replica().get(&people, record.id).unwrap().is_none());
        assert!(engine.replica().tombstones(&people).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_table_gates_dependents_only() {
        let engine = engine(SyncConfig::default());
        engine.transport().fail_table(&name("receipts"));

        let report = engine.sync().await.unwrap();
        assert!(report.outcome("people").unwrap().is_success());
        assert!(report.outcome("price_lists").unwrap().is_success());
        assert!(report.outcome("procession_assignments").unwrap().is_success());
        assert!(report.failed(&name("receipts")));
        assert!(matches!(
            report.outcome("payments").unwrap().error(),
            Some(SyncError::DependencyFailed { dependency, .. }) if dependency.as_str() == "receipts"
        ));
        assert_eq!(engine.state(), SyncState::Error);
        assert!(engine.stats().last_error.unwrap().starts_with("receipts"));
    }

    #[tokio::test]
    async fn gating_can_be_disabled() {
        let engine = engine(SyncConfig::default().with_skip_dependents_on_failure(false));
        engine.transport().fail_table(&name("receipts"));
        let report = engine.sync().await.unwrap();
        assert!(report.outcome("payments").unwrap().is_success());
    }

    #[tokio::test]
    async fn invalid_graph_aborts_before_any_table() {
        let engine = engine(SyncConfig::default());
        engine
            .register_table(TableSpec::new(name("candles")).depends_on(name("altars")))
            .unwrap();
        let people = name("people");
        engine
            .replica()
            .upsert_many(&people, &[Record::create(Vec::new(), ts(1))])
            .unwrap();

        let result = engine.sync().await;
        assert!(matches!(
            result,
            Err(SyncError::Configuration(ConfigError::UnknownDependency { .. }))
        ));
        assert!(engine.transport().pushed().is_empty());
        assert_eq!(engine.state(), SyncState::Error);
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn recorded_deletion_is_propagated_then_purged() {
        let engine = engine(SyncConfig::default());
        let people = name("people");
        let record = Record::create(Vec::new(), ts(1));
        engine.replica().upsert_many(&people, &[record.clone()]).unwrap();
        assert_eq!(engine.record_deletion(&people, &[record.id]).unwrap(), 1);
        assert_eq!(
            engine.replica().tombstones(&people).unwrap()[0].deleted_at,
            ts(10_000)
        );

        let report = engine.sync().await.unwrap();
        assert_eq!(report.outcome("people").unwrap().stats().unwrap().deleted, 1);
        assert_eq!(engine.transport().deleted(), vec![(people.clone(), vec![record.id])]);
        assert!(engine.replica().tombstones(&people).unwrap().is_empty());
    }

    #[tokio::test]
    async fn resync_from_scratch_resets_cursors() {
        let engine = engine(SyncConfig::default());
        let people = name("people");
        engine.replica().set_cursor(&SyncCursor::at(people.clone(), ts(99))).unwrap();
        engine.resync_from_scratch().unwrap();
        assert!(engine.replica().cursor(&people).unwrap().is_initial());
    }

    #[test]
    fn stage_keeps_latest_upsert_per_id() {
        let record = Record::create(b"1".to_vec(), ts(1));
        let newer = record.revise(b"2".to_vec(), ts(2));
        let batch = stage(
            vec![record.clone()],
            vec![RemoteChange::upsert(newer.clone(), ts(3))],
        );
        assert_eq!(batch.upserts, vec![newer]);
        assert!(batch.deletions.is_empty());
        assert_eq!(watermark(&[RemoteChange::upsert(record, ts(3))]), Some(ts(3)));
    }
}
