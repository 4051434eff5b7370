//! The record envelope and the per-table sync bookkeeping types.

use crate::id::RecordId;
use crate::table::TableName;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// A versioned, timestamped business entity.
///
/// The sync layer only reads the envelope fields. `payload` is the
/// CBOR-encoded table schema (see [`crate::schema`]) and is never
/// interpreted during sync.
///
/// # Invariants
///
/// - `created_at` never changes after creation
/// - every mutation raises `version` by exactly 1 and `updated_at` strictly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier.
    pub id: RecordId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Mutation counter, starting at 1.
    pub version: u64,
    /// Encoded table payload.
    pub payload: Vec<u8>,
}

impl Record {
    /// A new record with a fresh id.
    #[must_use]
    pub fn create(payload: Vec<u8>, now: Timestamp) -> Self {
        Self::create_with_id(RecordId::new(), payload, now)
    }

    /// A new record with a caller-chosen id.
    #[must_use]
    pub fn create_with_id(id: RecordId, payload: Vec<u8>, now: Timestamp) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            version: 1,
            payload,
        }
    }

    /// The next version of this record carrying `payload`.
    ///
    /// `updated_at` becomes `now`, or one millisecond past the previous
    /// value if the clock has not moved forward.
    #[must_use]
    pub fn revise(&self, payload: Vec<u8>, now: Timestamp) -> Self {
        Self {
            id: self.id,
            created_at: self.created_at,
            updated_at: now.max(self.updated_at.next()),
            version: self.version + 1,
            payload,
        }
    }

    /// Whether the record was written at or after `since`. Everything is
    /// dirty against an absent boundary.
    ///
    /// The comparison is inclusive: a boundary is read from the clock
    /// before the records are, so a write in that same millisecond may not
    /// have been seen yet.
    #[must_use]
    pub fn changed_since(&self, since: Option<Timestamp>) -> bool {
        since.map_or(true, |since| self.updated_at >= since)
    }
}

/// Marker for a record deleted locally and not yet deleted remotely.
///
/// Also used for remote deletions in the change feed, where `deleted_at`
/// is the remote's stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Table the record lived in.
    pub table: TableName,
    /// Deleted record.
    pub id: RecordId,
    /// Deletion time.
    pub deleted_at: Timestamp,
}

/// Per-table sync position.
///
/// The two fields live on different clocks and bound different steps:
///
/// - `last_synced_at` is read from the local clock when the table's last
///   successful cycle started, before its records were read. Local records
///   written at or after it are pushed.
/// - `pulled_through` is the highest remote change stamp applied. The next
///   pull asks for changes stamped after it.
///
/// Both move together, only when a table's whole cycle succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Table.
    pub table: TableName,
    /// Local "as of" boundary of the last successful cycle; `None` pushes
    /// everything.
    pub last_synced_at: Option<Timestamp>,
    /// Remote watermark; `None` means the next pull is a full pull.
    pub pulled_through: Option<Timestamp>,
}

impl SyncCursor {
    /// The cursor of a table that has never synced.
    #[must_use]
    pub fn initial(table: TableName) -> Self {
        Self {
            table,
            last_synced_at: None,
            pulled_through: None,
        }
    }

    /// A cursor whose last cycle started at `at` and pulled nothing.
    #[must_use]
    pub fn at(table: TableName, at: Timestamp) -> Self {
        Self {
            table,
            last_synced_at: Some(at),
            pulled_through: None,
        }
    }

    /// Sets the remote watermark.
    #[must_use]
    pub fn pulled_through(mut self, stamp: Option<Timestamp>) -> Self {
        self.pulled_through = stamp;
        self
    }

    /// Whether the table has never completed a cycle.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.last_synced_at.is_none() && self.pulled_through.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn create_starts_at_version_one() {
        let record = Record::create(b"p".to_vec(), ts(100));
        assert_eq!(record.version, 1);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn revise_survives_a_clock_going_backwards() {
        let record = Record::create(b"a".to_vec(), ts(500));
        let revised = record.revise(b"b".to_vec(), ts(200));
        assert_eq!(revised.version, 2);
        assert_eq!(revised.updated_at, ts(501));
        assert_eq!(revised.created_at, ts(500));
        assert_eq!(revised.id, record.id);
    }

    #[test]
    fn dirty_against_boundary() {
        let record = Record::create(Vec::new(), ts(10));
        assert!(record.changed_since(None));
        assert!(record.changed_since(Some(ts(9))));
        assert!(record.changed_since(Some(ts(10))));
        assert!(!record.changed_since(Some(ts(11))));
    }

    #[test]
    fn cursor_positions_are_independent() {
        let people = TableName::new("people").unwrap();
        assert!(SyncCursor::initial(people.clone()).is_initial());

        let cursor = SyncCursor::at(people.clone(), ts(40));
        assert_eq!(cursor.pulled_through, None);
        assert!(!cursor.is_initial());

        let cursor = SyncCursor::initial(people).pulled_through(Some(ts(7)));
        assert_eq!(cursor.last_synced_at, None);
        assert!(!cursor.is_initial());
    }

    proptest! {
        #[test]
        fn revisions_strictly_increase(steps in proptest::collection::vec(-1_000i64..1_000, 1..40)) {
            let mut record = Record::create(Vec::new(), ts(0));
            let mut now = 0i64;
            for step in steps {
                now += step;
                let next = record.revise(Vec::new(), ts(now));
                prop_assert_eq!(next.version, record.version + 1);
                prop_assert!(next.updated_at > record.updated_at);
                record = next;
            }
        }
    }
}
