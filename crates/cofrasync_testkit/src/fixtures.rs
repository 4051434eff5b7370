//! Sample office payloads and ready-made replicas.

use cofrasync_engine::JournalReplica;
use cofrasync_protocol::schema::{
    Payment, PaymentMethod, Person, PriceItem, PriceList, ProcessionAssignment, Receipt,
    TableSchema,
};
use cofrasync_protocol::{Record, RecordId, TableName, Timestamp};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Shorthand for a millisecond timestamp.
pub fn ts(millis: i64) -> Timestamp {
    Timestamp::from_millis(millis)
}

/// A validated table name; panics on an invalid one.
pub fn table(name: &str) -> TableName {
    TableName::new(name).expect("invalid table name in test")
}

/// An active member.
pub fn person(full_name: &str, member_number: u32) -> Person {
    Person {
        full_name: full_name.to_string(),
        national_id: None,
        member_number,
        joined_on: "2020-01-15".to_string(),
        active: true,
    }
}

/// The fees of `year`.
pub fn price_list(year: u16) -> PriceList {
    PriceList {
        name: format!("Cuotas {year}"),
        year,
        items: vec![
            PriceItem {
                concept: "cuota anual".to_string(),
                amount_cents: 3_000,
            },
            PriceItem {
                concept: "papeleta de sitio".to_string(),
                amount_cents: 2_500,
            },
        ],
    }
}

/// A yearly-fee receipt.
pub fn receipt(person_id: RecordId, price_list_id: RecordId, number: u32) -> Receipt {
    Receipt {
        person_id,
        price_list_id,
        number,
        issued_on: "2026-02-01".to_string(),
        concept: "cuota anual".to_string(),
        amount_cents: 3_000,
    }
}

/// A cash payment of a receipt.
pub fn payment(receipt_id: RecordId, person_id: RecordId, amount_cents: i64) -> Payment {
    Payment {
        receipt_id,
        person_id,
        amount_cents,
        paid_on: "2026-02-03".to_string(),
        method: PaymentMethod::Cash,
    }
}

/// A place in a procession.
pub fn assignment(person_id: RecordId, position: &str) -> ProcessionAssignment {
    ProcessionAssignment {
        person_id,
        procession: "Martes Santo".to_string(),
        position: position.to_string(),
        year: 2026,
    }
}

/// A new record carrying `payload`.
pub fn new_record<S: TableSchema>(payload: &S, now: Timestamp) -> Record {
    Record::create(payload.encode().expect("encode payload"), now)
}

/// The next version of `record` carrying `payload`.
pub fn revised<S: TableSchema>(record: &Record, payload: &S, now: Timestamp) -> Record {
    record.revise(payload.encode().expect("encode payload"), now)
}

/// A journal replica in a temporary directory, removed on drop.
pub struct TempReplica {
    replica: Option<Arc<JournalReplica>>,
    dir: TempDir,
}

impl TempReplica {
    /// Opens a fresh replica.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let replica = JournalReplica::open(dir.path()).expect("open replica");
        Self {
            replica: Some(Arc::new(replica)),
            dir,
        }
    }

    /// The open replica.
    pub fn replica(&self) -> &Arc<JournalReplica> {
        self.replica.as_ref().expect("replica is open")
    }

    /// Replica directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes and reopens the replica, as a process restart would. Every
    /// other handle to the old replica must be dropped first.
    pub fn reopen(&mut self) -> &Arc<JournalReplica> {
        let old = self.replica.take().expect("replica is open");
        assert_eq!(Arc::strong_count(&old), 1, "replica still shared");
        drop(old);
        let replica = JournalReplica::open(self.dir.path()).expect("reopen replica");
        self.replica.insert(Arc::new(replica))
    }
}

impl Default for TempReplica {
    fn default() -> Self {
        Self::new()
    }
}
