//! Verify command implementation.

use super::{decode_entry, format_size, CliError, JournalFile};
use cofrasync_storage::StorageError;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Frames with a valid checksum.
    pub frames_checked: usize,
    /// Frames whose entry decoded.
    pub valid_entries: usize,
    /// Bytes of an interrupted write after the last valid frame.
    pub torn_bytes: u64,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// A torn tail alone is repaired on the next open and is not a failure.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), CliError> {
    println!("Verifying replica at {}", path.display());
    println!();

    let result = verify(path)?;
    println!("Journal:");
    println!("  Frames checked: {}", result.frames_checked);
    println!("  Valid entries:  {}", result.valid_entries);
    if result.torn_bytes > 0 {
        println!(
            "  Torn tail:      {} (interrupted write, cut on next open)",
            format_size(result.torn_bytes)
        );
    }
    for error in &result.errors {
        println!("  ERROR: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Replica verification passed");
        Ok(())
    } else {
        println!("✗ Replica verification failed");
        Err(CliError::VerificationFailed(format!(
            "{} problem(s) found",
            result.errors.len()
        )))
    }
}

/// Checks every frame checksum and decodes every entry.
pub fn verify(path: &Path) -> Result<VerifyResult, CliError> {
    let file = JournalFile::open(path)?;
    let mut result = VerifyResult::default();

    let scan = match file.scan() {
        Ok(scan) => scan,
        Err(CliError::Storage(e @ StorageError::Corrupted { .. })) => {
            result.errors.push(e.to_string());
            return Ok(result);
        }
        Err(e) => return Err(e),
    };

    result.frames_checked = scan.frames.len();
    result.torn_bytes = scan.torn_bytes;
    for frame in &scan.frames {
        match decode_entry(&frame.payload) {
            Ok(_) => result.valid_entries += 1,
            Err(e) => result
                .errors
                .push(format!("frame at offset {}: undecodable entry: {e}", frame.offset)),
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sample_replica;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};

    fn journal(dir: &Path) -> std::path::PathBuf {
        dir.join("replica.journal")
    }

    #[test]
    fn clean_replica_passes() {
        let dir = sample_replica();
        let result = verify(dir.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.frames_checked, 3);
        assert_eq!(result.valid_entries, 3);
    }

    #[test]
    fn torn_tail_is_reported_but_passes() {
        let dir = sample_replica();
        let mut file = OpenOptions::new().append(true).open(journal(dir.path())).unwrap();
        file.write_all(b"CFSJ\x01\x00").unwrap();
        drop(file);

        let result = verify(dir.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.torn_bytes, 6);
    }

    #[test]
    fn damaged_middle_frame_fails() {
        let dir = sample_replica();
        let mut file = OpenOptions::new().write(true).open(journal(dir.path())).unwrap();
        file.seek(SeekFrom::Start(12)).unwrap();
        file.write_all(&[0xAA, 0xBB]).unwrap();
        drop(file);

        let result = verify(dir.path()).unwrap();
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("checksum"));
    }
}
