//! Integration tests for the sync engine against an in-process remote.

use cofrasync_engine::{
    ConfigError, HttpTransport, JournalReplica, LocalStore, LoopbackClient, MemoryReplica,
    RemoteBatch, Replica, SyncConfig, SyncEngine, SyncError, SyncLedger, SyncScheduler, TableRegistry,
};
use cofrasync_protocol::schema::{TableSchema, PAYMENTS, PEOPLE, PRICE_LISTS, RECEIPTS};
use cofrasync_protocol::{Record, RecordId, TableSpec};
use cofrasync_server::ServerConfig;
use cofrasync_storage::JournalOptions;
use cofrasync_testkit::fixtures::{new_record, person, price_list, receipt};
use cofrasync_testkit::generators::client_ops_strategy;
use cofrasync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn engine_over<R: Replica>(office: &Office, replica: Arc<R>) -> SyncEngine<InProcessTransport, R> {
    let transport = Arc::new(InProcessTransport::new(Arc::clone(office.server())));
    SyncEngine::new(SyncConfig::default(), transport, replica)
        .with_clock(office.clock().clone())
        .with_tables(TableRegistry::standard().unwrap().tables().to_vec())
        .unwrap()
}

fn journal_engine(
    office: &Office,
    disk: &CrashableBackend,
) -> SyncEngine<InProcessTransport, JournalReplica> {
    let replica =
        JournalReplica::with_backend(Box::new(disk.clone()), JournalOptions::default()).unwrap();
    engine_over(office, Arc::new(replica))
}

fn sorted(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by_key(|record| record.id);
    records
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[tokio::test]
async fn client_server_full_sync() {
    let office = Office::new();
    let client = office.client();
    let people = table(PEOPLE);

    client.create(&people, person("Ana Ruiz", 1).encode().unwrap());
    client.create(&people, person("Luis Gil", 2).encode().unwrap());

    let report = client.sync().await;
    assert!(report.is_success());
    let stats = report.outcome(PEOPLE).unwrap().stats().unwrap();
    assert_eq!(stats.pushed, 2);
    assert_eq!(office.remote_records(&people), client.records(&people));
}

#[tokio::test]
async fn empty_sync() {
    let office = Office::new();
    let client = office.client();

    let report = client.sync().await;
    assert!(report.is_success());
    assert_eq!(report.total_pushed(), 0);
    assert_eq!(report.total_pulled(), 0);
    assert_eq!(report.iter().count(), 5);
    let cursor = client.cursor(&table(PEOPLE));
    assert_eq!(cursor.pulled_through, None);
    assert_eq!(cursor.last_synced_at, Some(client.now()));
}

#[tokio::test]
async fn concurrent_edit_with_later_timestamp_wins() {
    let office = Office::new();
    let (a, b) = (office.client(), office.client());
    let people = table(PEOPLE);

    let p1 = a.create(&people, person("Ana Ruiz", 7).encode().unwrap());
    a.sync().await;
    assert_eq!(office.remote_records(&people), vec![p1.clone()]);
    assert_eq!(a.cursor(&people).pulled_through, Some(p1.updated_at));
    b.sync().await;

    let local = a
        .edit(&people, p1.id, person("Ana Ruiz Gil", 7).encode().unwrap())
        .unwrap();
    let remote = b
        .edit(&people, p1.id, person("Ana María Ruiz", 7).encode().unwrap())
        .unwrap();
    assert_eq!((local.version, remote.version), (2, 2));
    assert!(remote.updated_at > local.updated_at);
    b.sync().await;

    let report = a.sync().await;
    assert!(report.is_success());
    assert_eq!(a.get(&people, p1.id), Some(remote.clone()));
    assert_eq!(a.cursor(&people).pulled_through, Some(remote.updated_at));
    assert_eq!(office.remote_records(&people), vec![remote]);
}

#[tokio::test]
async fn failed_delete_keeps_tombstone_and_cursor() {
    let office = Office::new();
    let client = office.client();
    let people = table(PEOPLE);

    let r1 = client.create(&people, person("Rosa León", 3).encode().unwrap());
    client.sync().await;
    let cursor = client.cursor(&people);

    assert!(client.delete(&people, r1.id));
    assert_eq!(client.tombstones(&people).len(), 1);
    client.transport().fail_next(Operation::Delete, &people, 1);

    let report = client.sync().await;
    assert!(report.failed(&people));
    assert!(matches!(
        report.outcome(PEOPLE).unwrap().error(),
        Some(SyncError::Transport { retryable: true, .. })
    ));
    assert_eq!(client.tombstones(&people)[0].id, r1.id);
    assert_eq!(client.cursor(&people), cursor);
    assert_eq!(office.remote_records(&people), vec![r1.clone()]);

    let report = client.sync().await;
    assert!(report.is_success());
    assert_eq!(report.outcome(PEOPLE).unwrap().stats().unwrap().deleted, 1);
    assert!(client.tombstones(&people).is_empty());
    assert!(office.remote_records(&people).is_empty());
    assert!(office.server().store().is_deleted(&people, r1.id));
    let after = client.cursor(&people);
    assert!(after.pulled_through > cursor.pulled_through);
    assert!(after.last_synced_at > cursor.last_synced_at);
}

#[tokio::test]
async fn pushing_the_same_records_again_changes_nothing() {
    let office = Office::new();
    let client = office.client();
    let people = table(PEOPLE);

    client.create(&people, person("Ana Ruiz", 1).encode().unwrap());
    client.create(&people, person("Luis Gil", 2).encode().unwrap());
    client.sync().await;
    let remote = office.remote_records(&people);
    let stamp = office.server().store().last_stamp(&people);

    client.engine().resync_from_scratch().unwrap();
    let report = client.sync().await;
    assert_eq!(report.outcome(PEOPLE).unwrap().stats().unwrap().pushed, 2);
    assert_eq!(office.remote_records(&people), remote);
    assert_eq!(office.server().store().last_stamp(&people), stamp);
    assert_eq!(client.records(&people), remote);
}

#[tokio::test]
async fn write_during_a_held_pull_is_pushed_next_cycle() {
    let office = Office::new();
    let (a, b) = (office.client(), office.client());
    let people = table(PEOPLE);
    a.create(&people, person("Ana Ruiz", 1).encode().unwrap());

    let (report, mid) = a
        .sync_around(async {
            let mid = a.create(&people, person("Luis Gil", 2).encode().unwrap());
            b.create(&people, person("Rosa León", 3).encode().unwrap());
            assert!(b.sync().await.is_success());
            mid
        })
        .await;
    assert!(report.is_success());
    assert_eq!(report.outcome(PEOPLE).unwrap().stats().unwrap().pulled, 2);
    assert!(a.cursor(&people).pulled_through > Some(mid.updated_at));
    assert!(!office.remote_records(&people).contains(&mid));

    let report = a.sync().await;
    assert_eq!(report.outcome(PEOPLE).unwrap().stats().unwrap().accepted, 1);
    assert!(office.remote_records(&people).contains(&mid));

    settle(&[a, b]).await;
    assert_eq!(office.remote_records(&people).len(), 3);
}

#[tokio::test]
async fn peer_with_a_fast_clock_does_not_hide_other_edits() {
    let office = Office::new();
    let fast = office.client_ahead(3_600_000);
    let (a, b) = (office.client(), office.client());
    let people = table(PEOPLE);

    let early = fast.create(&people, person("Ana Ruiz", 1).encode().unwrap());
    fast.sync().await;
    assert!(office.server().store().last_stamp(&people) < Some(early.updated_at));
    a.sync().await;
    assert_eq!(a.get(&people, early.id), Some(early.clone()));

    let edit = a.create(&people, person("Luis Gil", 2).encode().unwrap());
    assert!(edit.updated_at < early.updated_at);
    let report = a.sync().await;
    assert_eq!(report.total_accepted(), 1);
    assert!(office.remote_records(&people).contains(&edit));

    b.sync().await;
    fast.sync().await;
    for client in [&b, &fast] {
        assert_eq!(client.get(&people, edit.id), Some(edit.clone()));
        assert_eq!(client.get(&people, early.id), Some(early.clone()));
    }

    let late = b.create(&people, person("Rosa León", 3).encode().unwrap());
    b.sync().await;
    a.sync().await;
    fast.sync().await;
    assert_eq!(a.get(&people, late.id), Some(late.clone()));
    assert_eq!(fast.get(&people, late.id), Some(late));
}

#[tokio::test]
async fn deletion_reaches_other_clients() {
    let office = Office::new();
    let (a, b) = (office.client(), office.client());
    let people = table(PEOPLE);

    let record = a.create(&people, person("Pedro Mena", 4).encode().unwrap());
    a.sync().await;
    b.sync().await;
    assert!(b.get(&people, record.id).is_some());

    a.delete(&people, record.id);
    a.sync().await;
    let report = b.sync().await;
    assert_eq!(report.outcome(PEOPLE).unwrap().stats().unwrap().applied.removed, 1);
    assert!(b.get(&people, record.id).is_none());
    assert!(b.records(&people).is_empty());
}

#[tokio::test]
async fn capped_pull_continues_on_the_next_cycle() {
    let office = Office::with_config(ServerConfig::new().with_max_pull_batch(2));
    let (a, b) = (office.client(), office.client());
    let people = table(PEOPLE);

    for number in 1..=5 {
        a.create(&people, person("Hermano", number).encode().unwrap());
    }
    a.sync().await;
    assert_eq!(office.remote_records(&people).len(), 5);

    let mut pulled = Vec::new();
    for _ in 0..3 {
        let report = b.sync().await;
        assert!(report.is_success());
        pulled.push(report.outcome(PEOPLE).unwrap().stats().unwrap().pulled);
    }
    assert_eq!(pulled, vec![2, 2, 1]);
    assert_eq!(b.records(&people), office.remote_records(&people));
    assert_eq!(
        b.cursor(&people).pulled_through,
        office.server().store().last_stamp(&people)
    );
}

#[tokio::test]
async fn tombstoned_record_is_not_resurrected_by_remote_edit() {
    let office = Office::new();
    let (a, b) = (office.client(), office.client());
    let people = table(PEOPLE);

    let record = a.create(&people, person("Pedro Mena", 4).encode().unwrap());
    a.sync().await;
    b.sync().await;

    a.delete(&people, record.id);
    b.edit(&people, record.id, person("Pedro Mena Sanz", 4).encode().unwrap());
    b.sync().await;

    a.transport().fail_next(Operation::Delete, &people, 1);
    assert!(a.sync().await.failed(&people));
    assert!(a.get(&people, record.id).is_none());

    assert!(a.sync().await.is_success());
    assert!(a.get(&people, record.id).is_none());
    assert!(office.remote_records(&people).is_empty());

    b.sync().await;
    assert!(b.get(&people, record.id).is_none());
}

#[tokio::test]
async fn remote_pull_discards_updates_to_tombstoned_ids() {
    let office = Office::new();
    let (a, b) = (office.client(), office.client());
    let people = table(PEOPLE);

    let record = a.create(&people, b"v1".to_vec());
    a.sync().await;
    b.sync().await;
    b.edit(&people, record.id, b"v2".to_vec());
    b.sync().await;

    a.replica()
        .delete_tracked(&people, &[record.id], a.now())
        .unwrap();
    a.replica()
        .apply_remote(
            &people,
            RemoteBatch {
                upserts: office.remote_records(&people),
                deletions: Vec::new(),
            },
        )
        .unwrap();
    assert!(a.get(&people, record.id).is_none());
}

#[tokio::test]
async fn crash_between_push_and_cursor_commit_recovers() {
    let office = Office::new();
    let disk = CrashableBackend::new();
    let people = table(PEOPLE);
    let engine = journal_engine(&office, &disk);

    let records: Vec<Record> = (1..=3)
        .map(|n| new_record(&person(&format!("Hermano {n}"), n), office.tick()))
        .collect();
    engine.replica().upsert_many(&people, &records).unwrap();

    disk.crash_after(0);
    let report = engine.sync().await.unwrap();
    assert!(report.failed(&people));
    assert!(matches!(
        report.outcome(PEOPLE).unwrap().error(),
        Some(SyncError::LocalStore(_))
    ));
    assert_eq!(office.remote_records(&people), sorted(records.clone()));
    let stamp = office.server().store().last_stamp(&people);
    drop(engine);

    let engine = journal_engine(&office, &disk.reboot());
    assert!(engine.replica().cursor(&people).unwrap().is_initial());
    let report = engine.sync().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.outcome(PEOPLE).unwrap().stats().unwrap().pushed, 3);
    assert_eq!(office.remote_records(&people), sorted(records.clone()));
    assert_eq!(office.server().store().last_stamp(&people), stamp);
    assert_eq!(
        sorted(engine.replica().read_all(&people, None).unwrap()),
        sorted(records)
    );
    assert_eq!(engine.replica().cursor(&people).unwrap().pulled_through, stamp);
}

#[tokio::test]
async fn journal_replica_keeps_sync_state_across_restarts() {
    let office = Office::new();
    let mut temp = TempReplica::new();
    let people = table(PEOPLE);
    let lists = table(PRICE_LISTS);

    let cursor = {
        let engine = engine_over(&office, Arc::clone(temp.replica()));
        engine
            .replica()
            .upsert_many(&people, &[new_record(&person("Ana Ruiz", 1), office.tick())])
            .unwrap();
        engine
            .replica()
            .upsert_many(&lists, &[new_record(&price_list(2026), office.tick())])
            .unwrap();
        assert!(engine.sync().await.unwrap().is_success());
        engine.replica().cursor(&people).unwrap()
    };

    let replica = Arc::clone(temp.reopen());
    assert_eq!(replica.cursor(&people).unwrap(), cursor);
    assert_eq!(replica.read_all(&people, None).unwrap().len(), 1);

    let stamp = office.server().store().last_stamp(&people);
    let engine = engine_over(&office, replica);
    let report = engine.sync().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.total_accepted(), 0);
    assert_eq!(report.total_pulled(), 0);
    assert_eq!(office.server().store().last_stamp(&people), stamp);
}

#[tokio::test]
async fn torn_journal_tail_is_cut_and_resynced() {
    let office = Office::new();
    let disk = CrashableBackend::new();
    let people = table(PEOPLE);
    let engine = journal_engine(&office, &disk);

    let kept = new_record(&person("Ana Ruiz", 1), office.tick());
    let torn = new_record(&person("Luis Gil", 2), office.tick());
    engine.replica().upsert_many(&people, &[kept.clone()]).unwrap();
    engine.replica().upsert_many(&people, &[torn]).unwrap();
    drop(engine);
    disk.tear_tail(5);

    let engine = journal_engine(&office, &disk.reboot());
    assert_eq!(engine.replica().recovery().frames, 1);
    assert!(engine.replica().recovery().torn_bytes > 0);
    assert!(engine.sync().await.unwrap().is_success());
    assert_eq!(office.remote_records(&people), vec![kept]);
}

#[tokio::test]
async fn overlapping_syncs_share_one_cycle() {
    let office = Office::new();
    let client = office.client();
    let people = table(PEOPLE);
    client.create(&people, b"ana".to_vec());

    client.transport().hold_pulls();
    let engine = Arc::clone(client.engine());
    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync().await }
    });
    while client.transport().parked_pulls() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(engine.is_syncing());
    assert!(engine.state().is_active());

    let second = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync().await }
    });
    while engine.stats().coalesced_calls == 0 {
        tokio::task::yield_now().await;
    }
    client.transport().release_pulls();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.total_pushed(), 1);
    assert_eq!(second.total_pushed(), 1);
    assert_eq!(client.transport().count(Operation::Push), 1);
    assert_eq!(engine.stats().cycles_completed, 1);
    assert!(!engine.is_syncing());
}

#[tokio::test]
async fn cancel_stops_at_the_next_table() {
    let office = Office::new();
    let client = office.client();
    client.create(&table(PEOPLE), b"ana".to_vec());

    client.transport().hold_pulls();
    let engine = Arc::clone(client.engine());
    let running = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync().await }
    });
    while client.transport().parked_pulls() == 0 {
        tokio::task::yield_now().await;
    }
    engine.cancel();
    client.transport().release_pulls();

    let report = running.await.unwrap().unwrap();
    let outcomes: Vec<_> = report.iter().collect();
    assert_eq!(outcomes[0].0.as_str(), PEOPLE);
    assert!(outcomes[0].1.is_success());
    assert!(outcomes[1..]
        .iter()
        .all(|(_, outcome)| matches!(outcome.error(), Some(SyncError::Cancelled))));
    assert!(!client.cursor(&table(PEOPLE)).is_initial());

    let report = client.sync().await;
    assert!(report.is_success());
}

#[tokio::test]
async fn invalid_table_graph_aborts_before_any_call() {
    let office = Office::new();
    let transport = Arc::new(InProcessTransport::new(Arc::clone(office.server())));
    let engine = SyncEngine::new(
        SyncConfig::default(),
        Arc::clone(&transport),
        Arc::new(MemoryReplica::new()),
    );
    engine
        .register_table(TableSpec::new(table(RECEIPTS)).depends_on(table(PEOPLE)))
        .unwrap();

    let err = engine.sync().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Configuration(ConfigError::UnknownDependency { .. })
    ));
    assert!(!err.is_retryable());
    assert!(transport.calls().is_empty());

    let cyclic = SyncEngine::new(
        SyncConfig::default(),
        Arc::clone(&transport),
        Arc::new(MemoryReplica::new()),
    )
    .with_tables([
        TableSpec::new(table("a")).depends_on(table("b")),
        TableSpec::new(table("b")).depends_on(table("a")),
    ])
    .unwrap();
    assert!(matches!(
        cyclic.sync().await,
        Err(SyncError::Configuration(ConfigError::DependencyCycle { .. }))
    ));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn failed_table_skips_its_dependents() {
    let office = Office::new();
    let client = office.client();
    let people = table(PEOPLE);
    let ana = client.create(&people, person("Ana Ruiz", 1).encode().unwrap());
    let list = client.create(&table(PRICE_LISTS), price_list(2026).encode().unwrap());
    client.create(&table(RECEIPTS), receipt(ana.id, list.id, 1).encode().unwrap());

    client.transport().fail_next(Operation::Pull, &people, 1);
    let report = client.sync().await;
    assert!(report.failed(&people));
    assert!(report.outcome(PRICE_LISTS).unwrap().is_success());
    for dependent in [RECEIPTS, PAYMENTS] {
        assert!(matches!(
            report.outcome(dependent).unwrap().error(),
            Some(SyncError::DependencyFailed { .. })
        ));
    }
    assert!(office.remote_records(&table(RECEIPTS)).is_empty());
    assert!(client.engine().stats().last_error.unwrap().starts_with(PEOPLE));

    assert!(client.sync().await.is_success());
    assert_eq!(office.remote_records(&table(RECEIPTS)).len(), 1);
}

#[tokio::test]
async fn unavailable_remote_over_http_is_retryable() {
    let office = Office::new();
    let transport = Arc::new(HttpTransport::new(
        "http://hermandad.local",
        LoopbackClient::new(ServerEndpoint(Arc::clone(office.server()))),
        Uuid::new_v4(),
    ));
    let engine = SyncEngine::new(
        SyncConfig::default(),
        Arc::clone(&transport),
        Arc::new(MemoryReplica::new()),
    )
    .with_clock(office.clock().clone())
    .with_tables(TableRegistry::standard().unwrap().tables().to_vec())
    .unwrap();
    let people = table(PEOPLE);
    let record = new_record(&person("Ana Ruiz", 1), office.tick());
    engine.replica().upsert_many(&people, &[record.clone()]).unwrap();

    office.server().set_available(false);
    let report = engine.sync().await.unwrap();
    assert!(!report.is_success());
    assert!(report
        .outcome(PEOPLE)
        .unwrap()
        .error()
        .is_some_and(SyncError::is_retryable));

    office.server().set_available(true);
    assert!(engine.sync().await.unwrap().is_success());
    assert_eq!(office.remote_records(&people), vec![record.clone()]);

    transport.close();
    let report = engine.sync().await.unwrap();
    assert!(matches!(
        report.outcome(PEOPLE).unwrap().error(),
        Some(SyncError::NotConnected)
    ));
    transport.reconnect();

    let other = office.client();
    other.sync().await;
    assert_eq!(other.records(&people), vec![record]);
}

#[tokio::test]
async fn scheduler_syncs_in_the_background() {
    let office = Office::new();
    let client = office.client_with(
        SyncConfig::new(Uuid::new_v4()).with_sync_interval(Duration::from_millis(10)),
    );
    let people = table(PEOPLE);
    let record = client.create(&people, b"ana".to_vec());

    let scheduler = SyncScheduler::spawn(Arc::clone(client.engine())).unwrap();
    while office.remote_records(&people).is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    scheduler.stop().await;
    assert_eq!(office.remote_records(&people), vec![record]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn clients_converge_after_settling(ops in client_ops_strategy(3, 1..40)) {
        runtime().block_on(async {
            let office = Office::new();
            let clients = [office.client(), office.client(), office.client()];
            let people = table(PEOPLE);

            run_ops(&clients, &people, &ops).await;
            settle(&clients).await;

            let remote = office.remote_records(&people);
            for client in &clients {
                assert_eq!(client.records(&people), remote);
                assert!(client.tombstones(&people).is_empty());
            }
        });
    }

    #[test]
    fn clients_with_skewed_clocks_converge(ops in client_ops_strategy(3, 1..40)) {
        runtime().block_on(async {
            let office = Office::new();
            let clients = [
                office.client(),
                office.client_ahead(45_000),
                office.client_ahead(90_000),
            ];
            let people = table(PEOPLE);

            run_ops(&clients, &people, &ops).await;
            settle(&clients).await;

            let remote = office.remote_records(&people);
            for client in &clients {
                assert_eq!(client.records(&people), remote);
            }
        });
    }

    #[test]
    fn versions_never_decrease(ops in client_ops_strategy(2, 1..40)) {
        runtime().block_on(async {
            let office = Office::new();
            let clients = [office.client(), office.client()];
            let people = table(PEOPLE);
            let mut seen: HashMap<(usize, RecordId), u64> = HashMap::new();

            for op in &ops {
                run_ops(&clients, &people, std::slice::from_ref(op)).await;
                for (index, client) in clients.iter().enumerate() {
                    for record in client.records(&people) {
                        let previous = seen.insert((index, record.id), record.version);
                        assert!(previous.map_or(true, |v| v <= record.version));
                    }
                }
            }
        });
    }
}
