//! Conflict resolution between a local record and a pulled one.
//!
//! The rule, in precedence order:
//!
//! 1. a pending local tombstone beats any remote upsert
//! 2. no local copy: insert
//! 3. higher `version` wins
//! 4. equal `version`: later `updated_at` wins
//! 5. fully equal: the remote copy wins
//!
//! The same rule decides on the remote side whether a pushed record
//! replaces the stored one, which is what makes push idempotent.

use crate::record::Record;
use std::cmp::Ordering;

/// What to do with a pulled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// No local copy; store the remote one.
    Insert,
    /// The remote copy wins; overwrite local.
    Replace,
    /// The local copy wins; it is pushed again next cycle if still dirty.
    KeepLocal,
    /// Local and remote are identical.
    Unchanged,
    /// The record is tombstoned locally; drop the remote copy.
    DiscardTombstoned,
}

impl Resolution {
    /// Whether the remote record gets written locally.
    #[must_use]
    pub fn writes_remote(self) -> bool {
        matches!(self, Resolution::Insert | Resolution::Replace)
    }
}

/// Resolves `remote` against the local state of the same id.
#[must_use]
pub fn resolve(local: Option<&Record>, tombstoned: bool, remote: &Record) -> Resolution {
    if tombstoned {
        return Resolution::DiscardTombstoned;
    }
    let Some(local) = local else {
        return Resolution::Insert;
    };
    if local == remote {
        return Resolution::Unchanged;
    }
    match remote
        .version
        .cmp(&local.version)
        .then(remote.updated_at.cmp(&local.updated_at))
    {
        Ordering::Greater | Ordering::Equal => Resolution::Replace,
        Ordering::Less => Resolution::KeepLocal,
    }
}

/// Whether `incoming` replaces `current` under the resolution rule.
#[must_use]
pub fn supersedes(incoming: &Record, current: &Record) -> bool {
    resolve(Some(current), false, incoming) == Resolution::Replace
}
