//! Resync command implementation.

use super::CliError;
use cofrasync_engine::{JournalReplica, SyncLedger};
use std::path::Path;

/// Clears every cursor. Records and tombstones stay; the next sync
/// re-pushes every record and pulls the full remote state.
pub fn run(path: &Path) -> Result<(), CliError> {
    if !path.is_dir() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    let replica = JournalReplica::open(path)?;
    replica.clear_cursors()?;
    let tables = replica.summary().len();
    println!("✓ Reset sync cursors of {tables} table(s) at {}", path.display());
    Ok(())
}
