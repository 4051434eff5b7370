//! Inspect command implementation.

use super::{decode_entry, format_size, CliError, JournalFile};
use crate::Format;
use cofrasync_engine::replica::{ReplicaState, TableSummary};
use serde::Serialize;
use std::path::Path;

/// Replica inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Replica path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Valid frames.
    pub frames: usize,
    /// Bytes of an interrupted write after the last valid frame.
    pub torn_bytes: u64,
    /// Per-table counts and cursors.
    pub tables: Vec<TableSummary>,
}

impl InspectResult {
    fn live_records(&self) -> usize {
        self.tables.iter().map(|t| t.records).sum()
    }

    fn pending_tombstones(&self) -> usize {
        self.tables.iter().map(|t| t.tombstones).sum()
    }
}

/// Runs the inspect command. The journal is read, never repaired.
pub fn run(path: &Path, format: Format) -> Result<(), CliError> {
    let result = inspect(path)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Replays the journal into a fresh state and summarizes it.
pub fn inspect(path: &Path) -> Result<InspectResult, CliError> {
    let file = JournalFile::open(path)?;
    let scan = file.scan()?;
    let mut state = ReplicaState::default();
    for frame in &scan.frames {
        let entry = decode_entry(&frame.payload).map_err(|e| {
            CliError::VerificationFailed(format!("frame at offset {}: {e}", frame.offset))
        })?;
        state.apply(entry);
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size: file.size()?,
        frames: scan.frames.len(),
        torn_bytes: scan.torn_bytes,
        tables: state.summary(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("cofrasync Replica Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Journal:");
    println!("  Size:   {}", format_size(result.journal_size));
    println!("  Frames: {}", result.frames);
    if result.torn_bytes > 0 {
        println!("  Torn tail: {} (cut on next open)", format_size(result.torn_bytes));
    }
    println!();
    println!("Records:");
    println!("  Live records:       {}", result.live_records());
    println!("  Pending tombstones: {}", result.pending_tombstones());

    if !result.tables.is_empty() {
        println!();
        println!("Tables:");
        for table in &result.tables {
            let cursor = table
                .cursor
                .map_or_else(|| "never synced".to_string(), |at| at.to_string());
            let pulled = table
                .pulled_through
                .map_or_else(|| "-".to_string(), |stamp| stamp.to_string());
            println!(
                "  {:<24} {:>6} records, {:>4} tombstones, cursor {}, pulled through {}",
                table.table.as_str(),
                table.records,
                table.tombstones,
                cursor,
                pulled
            );
        }
    }
}
