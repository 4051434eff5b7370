//! Property-based test generators using proptest.

use cofrasync_protocol::schema::{Person, PriceItem, PriceList};
use cofrasync_protocol::{Record, RecordId, Timestamp};
use proptest::prelude::*;
use std::ops::Range;

/// Strategy for record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    any::<[u8; 16]>().prop_map(RecordId::from_bytes)
}

/// Strategy for opaque payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..48)
}

/// Strategy for timestamps inside one day.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0i64..86_400_000).prop_map(Timestamp::from_millis)
}

/// Strategy for well-formed records: `created_at <= updated_at`,
/// `version >= 1`.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        record_id_strategy(),
        timestamp_strategy(),
        0i64..1_000_000,
        1u64..20,
        payload_strategy(),
    )
        .prop_map(|(id, created_at, age, version, payload)| Record {
            id,
            created_at,
            updated_at: created_at.plus_millis(age),
            version,
            payload,
        })
}

/// Strategy for members.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (
        "[A-Z][a-z]{2,9} [A-Z][a-z]{2,11}",
        prop::option::of("[0-9]{8}[A-Z]"),
        1u32..5_000,
        any::<bool>(),
    )
        .prop_map(|(full_name, national_id, member_number, active)| Person {
            full_name,
            national_id,
            member_number,
            joined_on: "2019-03-19".to_string(),
            active,
        })
}

/// Strategy for price lists.
pub fn price_list_strategy() -> impl Strategy<Value = PriceList> {
    (
        2000u16..2100,
        prop::collection::vec(("[a-z ]{3,20}", 0i64..100_000), 0..6),
    )
        .prop_map(|(year, items)| PriceList {
            name: format!("Cuotas {year}"),
            year,
            items: items
                .into_iter()
                .map(|(concept, amount_cents)| PriceItem {
                    concept,
                    amount_cents,
                })
                .collect(),
        })
}

/// One step of a multi-client scenario.
#[derive(Debug, Clone)]
pub enum ClientOp {
    /// Create a record.
    Create {
        /// Client index.
        client: usize,
        /// Payload.
        payload: Vec<u8>,
    },
    /// Edit one of the client's records.
    Edit {
        /// Client index.
        client: usize,
        /// Which record.
        slot: usize,
        /// New payload.
        payload: Vec<u8>,
    },
    /// Delete one of the client's records.
    Delete {
        /// Client index.
        client: usize,
        /// Which record.
        slot: usize,
    },
    /// Run a sync cycle.
    Sync {
        /// Client index.
        client: usize,
    },
    /// Run a sync cycle and create a record while its pull is in flight.
    CreateDuringSync {
        /// Client index.
        client: usize,
        /// Payload.
        payload: Vec<u8>,
    },
}

impl ClientOp {
    /// Client the step runs on.
    pub fn client(&self) -> usize {
        match self {
            ClientOp::Create { client, .. }
            | ClientOp::Edit { client, .. }
            | ClientOp::Delete { client, .. }
            | ClientOp::Sync { client }
            | ClientOp::CreateDuringSync { client, .. } => *client,
        }
    }
}

/// Strategy for a scenario over `clients` clients with `steps` steps.
pub fn client_ops_strategy(clients: usize, steps: Range<usize>) -> impl Strategy<Value = Vec<ClientOp>> {
    let clients = clients.max(1);
    let op = prop_oneof![
        3 => (0..clients, prop::collection::vec(any::<u8>(), 1..8))
            .prop_map(|(client, payload)| ClientOp::Create { client, payload }),
        3 => (0..clients, any::<usize>(), prop::collection::vec(any::<u8>(), 1..8))
            .prop_map(|(client, slot, payload)| ClientOp::Edit { client, slot, payload }),
        1 => (0..clients, any::<usize>())
            .prop_map(|(client, slot)| ClientOp::Delete { client, slot }),
        2 => (0..clients).prop_map(|client| ClientOp::Sync { client }),
        1 => (0..clients, prop::collection::vec(any::<u8>(), 1..8))
            .prop_map(|(client, payload)| ClientOp::CreateDuringSync { client, payload }),
    ];
    prop::collection::vec(op, steps)
}
