//! Remote change feed and push acknowledgements.

use crate::id::RecordId;
use crate::record::{Record, Tombstone};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// One entry of a table's remote change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChange {
    /// Position of the change in the remote feed. Strictly increasing per
    /// table; a pull `since` a value returns changes stamped after it.
    pub changed_at: Timestamp,
    /// The change itself.
    pub change: Change,
}

/// Kind of remote change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// The remote now holds this record.
    Upsert(Record),
    /// The record was deleted remotely.
    Delete(Tombstone),
}

impl RemoteChange {
    /// An upsert stamped at `changed_at`.
    #[must_use]
    pub fn upsert(record: Record, changed_at: Timestamp) -> Self {
        Self {
            changed_at,
            change: Change::Upsert(record),
        }
    }

    /// A deletion stamped at `changed_at`.
    #[must_use]
    pub fn delete(tombstone: Tombstone, changed_at: Timestamp) -> Self {
        Self {
            changed_at,
            change: Change::Delete(tombstone),
        }
    }

    /// Id of the affected record.
    #[must_use]
    pub fn id(&self) -> RecordId {
        match &self.change {
            Change::Upsert(record) => record.id,
            Change::Delete(tombstone) => tombstone.id,
        }
    }
}

/// Outcome of a push batch on the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    /// Records the remote stored.
    pub applied: usize,
    /// Remote copies that beat pushed records. The client resolves them
    /// like pulled records.
    pub superseded: Vec<Record>,
}
