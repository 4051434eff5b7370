//! Per-cycle sync report.

use crate::error::SyncError;
use crate::replica::ApplyOutcome;
use cofrasync_protocol::TableName;
use std::sync::Arc;
use std::time::Duration;

/// Counters for one table in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Local records sent to the remote.
    pub pushed: usize,
    /// Pushed records the remote stored; re-sent copies it already held
    /// are not counted.
    pub accepted: usize,
    /// Remote changes received.
    pub pulled: usize,
    /// Tombstones propagated and purged.
    pub deleted: usize,
    /// How the pulled changes resolved.
    pub applied: ApplyOutcome,
}

/// Result of one table's cycle.
#[derive(Debug, Clone)]
pub enum TableOutcome {
    /// Every step ran and the cursor advanced.
    Succeeded(TableStats),
    /// The table stopped at the error; its cursor is unchanged.
    Failed(Arc<SyncError>),
}

impl TableOutcome {
    /// Whether the table succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, TableOutcome::Succeeded(_))
    }

    /// Stats of a successful table.
    pub fn stats(&self) -> Option<&TableStats> {
        match self {
            TableOutcome::Succeeded(stats) => Some(stats),
            TableOutcome::Failed(_) => None,
        }
    }

    /// Error of a failed table.
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            TableOutcome::Succeeded(_) => None,
            TableOutcome::Failed(error) => Some(error),
        }
    }
}

/// Outcome of a `sync()` call, one entry per table in processing order.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    tables: Vec<(TableName, TableOutcome)>,
    duration: Duration,
}

impl SyncReport {
    pub(crate) fn record(&mut self, table: TableName, outcome: TableOutcome) {
        self.tables.push((table, outcome));
    }

    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// Outcome of `table`, if it was processed.
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|(name, _)| name.as_str() == table)
            .map(|(_, outcome)| outcome)
    }

    /// All outcomes in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableName, &TableOutcome)> {
        self.tables.iter().map(|(name, outcome)| (name, outcome))
    }

    /// Whether every table succeeded.
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(|(_, outcome)| outcome.is_success())
    }

    /// Whether `table` failed in this cycle.
    pub fn failed(&self, table: &TableName) -> bool {
        self.outcome(table.as_str())
            .is_some_and(|outcome| !outcome.is_success())
    }

    /// Names of failed tables.
    pub fn failed_tables(&self) -> Vec<&TableName> {
        self.tables
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(name, _)| name)
            .collect()
    }

    /// Records pushed across all tables.
    pub fn total_pushed(&self) -> usize {
        self.tables
            .iter()
            .filter_map(|(_, outcome)| outcome.stats())
            .map(|stats| stats.pushed)
            .sum()
    }

    /// Pushed records the remote stored, across all tables.
    pub fn total_accepted(&self) -> usize {
        self.tables
            .iter()
            .filter_map(|(_, outcome)| outcome.stats())
            .map(|stats| stats.accepted)
            .sum()
    }

    /// Changes pulled across all tables.
    pub fn total_pulled(&self) -> usize {
        self.tables
            .iter()
            .filter_map(|(_, outcome)| outcome.stats())
            .map(|stats| stats.pulled)
            .sum()
    }

    /// Wall time of the cycle.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}
