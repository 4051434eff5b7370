//! Dump journal command implementation.

use super::{decode_entry, CliError, JournalFile};
use crate::Format;
use serde::Serialize;
use std::path::Path;

/// One journal frame for output.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Offset in the journal file.
    pub offset: u64,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Entry description, or the decode error.
    pub entry: String,
}

/// Runs the dump-journal command.
pub fn run(path: &Path, limit: Option<usize>, format: Format) -> Result<(), CliError> {
    let frames = read_frames(path, limit)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&frames)?),
        Format::Text => {
            println!("{:>10}  {:>8}  ENTRY", "OFFSET", "BYTES");
            for frame in &frames {
                println!("{:>10}  {:>8}  {}", frame.offset, frame.payload_size, frame.entry);
            }
            println!();
            println!("{} frame(s)", frames.len());
        }
    }
    Ok(())
}

/// Reads up to `limit` frames from the start of the journal.
pub fn read_frames(path: &Path, limit: Option<usize>) -> Result<Vec<FrameInfo>, CliError> {
    let scan = JournalFile::open(path)?.scan()?;
    Ok(scan
        .frames
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|frame| FrameInfo {
            offset: frame.offset,
            payload_size: frame.payload.len(),
            entry: match decode_entry(&frame.payload) {
                Ok(entry) => entry.describe(),
                Err(e) => format!("<undecodable: {e}>"),
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sample_replica;

    #[test]
    fn frames_are_described_in_order() {
        let dir = sample_replica();
        let frames = read_frames(dir.path(), None).unwrap();
        let entries: Vec<_> = frames.iter().map(|f| f.entry.as_str()).collect();
        assert_eq!(
            entries,
            vec![
                "upsert people: 2 record(s)",
                "cursor people -> 20ms",
                "delete+tombstone people: 1 id(s)",
            ]
        );
        assert_eq!(frames[0].offset, 0);
    }

    #[test]
    fn limit_caps_output() {
        let dir = sample_replica();
        assert_eq!(read_frames(dir.path(), Some(1)).unwrap().len(), 1);
    }
}
