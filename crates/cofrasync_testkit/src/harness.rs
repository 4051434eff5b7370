//! An office with one remote and any number of clients on a shared clock.
//!
//! Every local mutation made through a [`Client`] advances the shared
//! clock by [`TICK_MILLIS`] first. A client may read the shared clock with a
//! fixed offset, see [`Office::client_ahead`]; its writes and its cycle
//! boundaries both use that skewed reading while the remote keeps stamping
//! with the shared one.

use crate::generators::ClientOp;
use crate::transport::InProcessTransport;
use cofrasync_engine::{
    LocalStore, MemoryReplica, SyncConfig, SyncEngine, SyncLedger, SyncReport, TableRegistry,
};
use cofrasync_protocol::{
    Clock, ManualClock, Record, RecordId, SyncCursor, TableName, Timestamp, Tombstone,
};
use cofrasync_server::{ServerConfig, SyncServer};
use std::future::Future;
use std::sync::Arc;

/// Clock step before every local mutation.
pub const TICK_MILLIS: i64 = 1_000;

/// Engine type used by harness clients.
pub type ClientEngine = SyncEngine<InProcessTransport, MemoryReplica>;

/// The shared remote and clock.
pub struct Office {
    clock: Arc<ManualClock>,
    server: Arc<SyncServer>,
}

impl Office {
    /// An office whose clock starts at 1 s.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// An office with custom remote limits.
    pub fn with_config(config: ServerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(TICK_MILLIS)));
        let server = Arc::new(SyncServer::with_clock(config, clock.clone()));
        Self { clock, server }
    }

    /// The shared clock.
    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    /// The remote.
    pub fn server(&self) -> &Arc<SyncServer> {
        &self.server
    }

    /// Advances the clock one tick.
    pub fn tick(&self) -> Timestamp {
        self.clock.advance(TICK_MILLIS)
    }

    /// A client syncing every standard table with default settings.
    pub fn client(&self) -> Client {
        self.client_with(SyncConfig::default())
    }

    /// A client whose clock runs `offset_millis` ahead of the office clock.
    /// Negative offsets run behind.
    pub fn client_ahead(&self, offset_millis: i64) -> Client {
        self.client_on(SyncConfig::default(), offset_millis)
    }

    /// A client with `config`.
    pub fn client_with(&self, config: SyncConfig) -> Client {
        self.client_on(config, 0)
    }

    fn client_on(&self, config: SyncConfig, offset_millis: i64) -> Client {
        let clock: Arc<dyn Clock> = if offset_millis == 0 {
            self.clock.clone()
        } else {
            Arc::new(SkewedClock {
                base: Arc::clone(&self.clock),
                offset_millis,
            })
        };
        let transport = Arc::new(InProcessTransport::with_device(
            Arc::clone(&self.server),
            config.device_id,
        ));
        let engine = SyncEngine::new(config, transport, Arc::new(MemoryReplica::new()))
            .with_clock(Arc::clone(&clock))
            .with_tables(
                TableRegistry::standard()
                    .expect("standard tables")
                    .tables()
                    .to_vec(),
            )
            .expect("register standard tables");
        Client {
            engine: Arc::new(engine),
            office_clock: Arc::clone(&self.clock),
            clock,
        }
    }

    /// Live remote records of `table`, ordered by id.
    pub fn remote_records(&self, table: &TableName) -> Vec<Record> {
        self.server.store().records(table)
    }
}

impl Default for Office {
    fn default() -> Self {
        Self::new()
    }
}

/// The office clock read with a fixed offset.
#[derive(Debug)]
pub struct SkewedClock {
    base: Arc<ManualClock>,
    offset_millis: i64,
}

impl Clock for SkewedClock {
    fn now(&self) -> Timestamp {
        self.base.now().plus_millis(self.offset_millis)
    }
}

/// One device of the office.
pub struct Client {
    engine: Arc<ClientEngine>,
    office_clock: Arc<ManualClock>,
    clock: Arc<dyn Clock>,
}

impl Client {
    /// The engine.
    pub fn engine(&self) -> &Arc<ClientEngine> {
        &self.engine
    }

    /// The transport, for fault injection.
    pub fn transport(&self) -> &Arc<InProcessTransport> {
        self.engine.transport()
    }

    /// The local replica.
    pub fn replica(&self) -> &Arc<MemoryReplica> {
        self.engine.replica()
    }

    fn tick(&self) -> Timestamp {
        self.office_clock.advance(TICK_MILLIS);
        self.clock.now()
    }

    /// Creates and stores a record.
    pub fn create(&self, table: &TableName, payload: Vec<u8>) -> Record {
        let record = Record::create(payload, self.tick());
        self.write(table, &record);
        record
    }

    /// Stores `record` as is, e.g. one built with a chosen id.
    pub fn write(&self, table: &TableName, record: &Record) {
        self.replica()
            .upsert_many(table, std::slice::from_ref(record))
            .expect("local write");
    }

    /// Revises a record. Returns `None` if it is not held locally.
    pub fn edit(&self, table: &TableName, id: RecordId, payload: Vec<u8>) -> Option<Record> {
        let current = self.get(table, id)?;
        let next = current.revise(payload, self.tick());
        self.write(table, &next);
        Some(next)
    }

    /// Deletes a record and tombstones it. Returns whether it was held.
    pub fn delete(&self, table: &TableName, id: RecordId) -> bool {
        self.tick();
        self.engine
            .record_deletion(table, &[id])
            .expect("local delete")
            == 1
    }

    /// Runs one cycle.
    pub async fn sync(&self) -> SyncReport {
        self.engine.sync().await.expect("valid table configuration")
    }

    /// Runs one cycle with its first pull held open while `during` runs.
    pub async fn sync_around<F: Future>(&self, during: F) -> (SyncReport, F::Output) {
        let transport = Arc::clone(self.transport());
        transport.hold_pulls();
        let held = async move {
            while transport.parked_pulls() == 0 {
                tokio::task::yield_now().await;
            }
            let output = during.await;
            transport.release_pulls();
            output
        };
        tokio::join!(self.sync(), held)
    }

    /// One local record.
    pub fn get(&self, table: &TableName, id: RecordId) -> Option<Record> {
        self.replica().get(table, id).expect("local read")
    }

    /// Local records of `table`, ordered by id.
    pub fn records(&self, table: &TableName) -> Vec<Record> {
        let mut records = self.replica().read_all(table, None).expect("local read");
        records.sort_by_key(|record| record.id);
        records
    }

    /// Cursor of `table`.
    pub fn cursor(&self, table: &TableName) -> SyncCursor {
        self.replica().cursor(table).expect("cursor read")
    }

    /// Pending tombstones of `table`.
    pub fn tombstones(&self, table: &TableName) -> Vec<Tombstone> {
        self.replica().tombstones(table).expect("tombstone read")
    }

    /// Current reading of this client's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

/// Plays `ops` against `clients` on `table`.
///
/// `Edit` and `Delete` pick among the client's current records by
/// `slot % len`, and are skipped when it holds none.
pub async fn run_ops(clients: &[Client], table: &TableName, ops: &[ClientOp]) {
    for op in ops {
        let client = &clients[op.client() % clients.len()];
        match op {
            ClientOp::Create { payload, .. } => {
                client.create(table, payload.clone());
            }
            ClientOp::Edit { slot, payload, .. } => {
                let records = client.records(table);
                if !records.is_empty() {
                    let id = records[slot % records.len()].id;
                    client.edit(table, id, payload.clone());
                }
            }
            ClientOp::Delete { slot, .. } => {
                let records = client.records(table);
                if !records.is_empty() {
                    client.delete(table, records[slot % records.len()].id);
                }
            }
            ClientOp::Sync { .. } => {
                client.sync().await;
            }
            ClientOp::CreateDuringSync { payload, .. } => {
                client
                    .sync_around(async { client.create(table, payload.clone()) })
                    .await;
            }
        }
    }
}

/// Syncs every client in turn until a full round neither pulls a change
/// nor gets a pushed record stored. Returns the number of rounds.
pub async fn settle(clients: &[Client]) -> usize {
    for round in 1..=8 {
        let mut moved = 0;
        for client in clients {
            let report = client.sync().await;
            moved += report.total_pulled() + report.total_accepted();
        }
        if moved == 0 {
            return round;
        }
    }
    panic!("clients did not settle");
}
