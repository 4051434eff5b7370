//! Append-only, CRC-checked frame journal.
//!
//! Every durable replica mutation is one frame. A frame is the unit of
//! atomicity: after a crash a frame is either fully present and valid, or
//! it is part of the torn tail that recovery cuts off.
//!
//! ```text
//! ┌────────┬─────────┬────────┬─────────────┬────────┐
//! │ magic  │ version │ length │ payload     │ crc32  │
//! │ 4 B    │ 2 B LE  │ 4 B LE │ length B    │ 4 B LE │
//! └────────┴─────────┴────────┴─────────────┴────────┘
//! ```
//!
//! The CRC covers header and payload.

use crate::backend::StorageBackend;
use crate::crc::crc32;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use tracing::warn;

/// Magic bytes opening every frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"CFSJ";

/// Current frame format version.
pub const JOURNAL_VERSION: u16 = 1;

const HEADER_SIZE: u64 = 10;
const CRC_SIZE: u64 = 4;

/// Options for a [`Journal`].
#[derive(Debug, Clone, Copy)]
pub struct JournalOptions {
    /// Sync the backend after every appended frame.
    pub sync_on_write: bool,
}

impl JournalOptions {
    /// Sets whether every append is synced.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            sync_on_write: true,
        }
    }
}

/// One valid frame read back from the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the frame header.
    pub offset: u64,
    /// Frame payload.
    pub payload: Vec<u8>,
}

/// Result of walking the journal.
#[derive(Debug, Clone, Default)]
pub struct JournalScan {
    /// Valid frames in append order.
    pub frames: Vec<Frame>,
    /// Bytes covered by valid frames.
    pub valid_len: u64,
    /// Bytes after the last valid frame (an interrupted append).
    pub torn_bytes: u64,
}

/// A frame journal over a [`StorageBackend`].
pub struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    options: JournalOptions,
}

impl Journal {
    /// Wraps `backend`. Call [`Journal::recover`] before appending to a
    /// journal that may hold a torn tail.
    pub fn new(backend: Box<dyn StorageBackend>, options: JournalOptions) -> Self {
        Self {
            backend: Mutex::new(backend),
            options,
        }
    }

    /// Appends `payload` as one frame and returns its offset.
    ///
    /// A failed append is rolled back so later frames start on a frame
    /// boundary; if even that fails, recovery cuts the partial frame.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FrameTooLarge`] if the payload does not fit
    /// the length field, or any backend error.
    pub fn append(&self, payload: &[u8]) -> StorageResult<u64> {
        let frame = encode_frame(payload)?;
        let mut backend = self.backend.lock();
        let start = backend.size()?;
        let written = match backend.append(&frame) {
            Ok(offset) if self.options.sync_on_write => backend.sync().map(|()| offset),
            other => other,
        };
        if written.is_err() && backend.truncate(start).is_err() {
            warn!(offset = start, "could not roll back failed journal append");
        }
        written
    }

    /// Walks every frame without modifying the journal.
    ///
    /// A trailing partial frame, or a final frame whose checksum does not
    /// match, is reported as torn. A bad frame followed by more data is
    /// corruption.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] for bad magic, unknown version or
    /// a checksum mismatch in the middle of the journal.
    pub fn scan(&self) -> StorageResult<JournalScan> {
        let backend = self.backend.lock();
        let size = backend.size()?;
        let mut scan = JournalScan::default();
        let mut offset = 0u64;

        while offset < size {
            if size - offset < HEADER_SIZE {
                break;
            }
            let header = backend.read_at(offset, HEADER_SIZE as usize)?;
            if header[0..4] != JOURNAL_MAGIC {
                if Self::is_zero_tail(&**backend, offset, size)? {
                    break;
                }
                return Err(StorageError::corrupted(offset, "bad frame magic"));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != JOURNAL_VERSION {
                return Err(StorageError::corrupted(
                    offset,
                    format!("unsupported frame version {version}"),
                ));
            }
            let len = u64::from(u32::from_le_bytes([header[6], header[7], header[8], header[9]]));
            let frame_end = offset + HEADER_SIZE + len + CRC_SIZE;
            if frame_end > size {
                break;
            }

            let body = backend.read_at(offset + HEADER_SIZE, (len + CRC_SIZE) as usize)?;
            let (payload, crc_bytes) = body.split_at(len as usize);
            let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            let mut covered = header;
            covered.extend_from_slice(payload);
            if crc32(&covered) != stored {
                if frame_end == size {
                    break;
                }
                return Err(StorageError::corrupted(offset, "frame checksum mismatch"));
            }

            scan.frames.push(Frame {
                offset,
                payload: payload.to_vec(),
            });
            offset = frame_end;
        }

        scan.valid_len = offset;
        scan.torn_bytes = size - offset;
        Ok(scan)
    }

    /// Scans the journal and cuts off any torn tail so later appends start
    /// on a frame boundary.
    ///
    /// # Errors
    ///
    /// Propagates scan and truncate errors.
    pub fn recover(&self) -> StorageResult<JournalScan> {
        let scan = self.scan()?;
        if scan.torn_bytes > 0 {
            warn!(
                torn_bytes = scan.torn_bytes,
                valid_len = scan.valid_len,
                "discarding torn journal tail"
            );
            let mut backend = self.backend.lock();
            backend.truncate(scan.valid_len)?;
            backend.sync()?;
        }
        Ok(scan)
    }

    /// Replaces the whole journal with `payloads`, one frame each.
    ///
    /// Not crash-atomic on its own; file-backed replicas write the
    /// replacement to a side file and rename it into place instead.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn rewrite<P: AsRef<[u8]>>(&self, payloads: &[P]) -> StorageResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        for payload in payloads {
            backend.append(&encode_frame(payload.as_ref())?)?;
        }
        backend.sync()
    }

    /// Replaces the journal options, e.g. once a bulk rewrite is done.
    pub fn set_options(&mut self, options: JournalOptions) {
        self.options = options;
    }

    /// Syncs the backend.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn sync(&self) -> StorageResult<()> {
        self.backend.lock().sync()
    }

    /// Journal size in bytes.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn size(&self) -> StorageResult<u64> {
        self.backend.lock().size()
    }

    fn is_zero_tail(backend: &dyn StorageBackend, offset: u64, size: u64) -> StorageResult<bool> {
        let rest = backend.read_at(offset, (size - offset) as usize)?;
        Ok(rest.iter().all(|b| *b == 0))
    }
}

fn encode_frame(payload: &[u8]) -> StorageResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| StorageError::FrameTooLarge(payload.len()))?;

    let mut frame = Vec::with_capacity(payload.len() + (HEADER_SIZE + CRC_SIZE) as usize);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}
