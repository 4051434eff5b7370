//! Compact command implementation.

use super::{format_size, CliError};
use cofrasync_engine::JournalReplica;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), CliError> {
    if !path.is_dir() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }

    println!("Compacting replica at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let replica = JournalReplica::open(path)?;
    let recovery = replica.recovery();
    println!("Journal:");
    println!("  Frames:  {}", recovery.frames);
    println!("  Size:    {}", format_size(replica.journal_size()?));
    if recovery.torn_bytes > 0 {
        println!("  Cut torn tail of {}", format_size(recovery.torn_bytes));
    }

    if dry_run {
        return Ok(());
    }

    let stats = replica.compact()?;
    println!();
    println!("  Size before: {}", format_size(stats.before));
    println!("  Size after:  {}", format_size(stats.after));
    println!(
        "  Space saved: {}",
        format_size(stats.before.saturating_sub(stats.after))
    );
    println!("✓ Compaction complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::inspect::inspect;
    use crate::commands::tests::sample_replica;

    #[test]
    fn compaction_keeps_state() {
        let dir = sample_replica();
        let before = inspect(dir.path()).unwrap();
        run(dir.path(), false).unwrap();
        let after = inspect(dir.path()).unwrap();
        assert_eq!(after.tables, before.tables);
        assert!(after.journal_size <= before.journal_size);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = sample_replica();
        let before = inspect(dir.path()).unwrap();
        run(dir.path(), true).unwrap();
        let after = inspect(dir.path()).unwrap();
        assert_eq!(after.frames, before.frames);
        assert_eq!(after.journal_size, before.journal_size);
    }
}
