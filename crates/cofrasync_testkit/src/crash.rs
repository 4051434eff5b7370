//! Simulated crashes underneath a journal replica.
//!
//! [`CrashableBackend`] keeps its bytes in memory behind a shared handle.
//! A test arms it to die after a byte budget, runs an operation that fails
//! mid-write, then "restarts" by opening a new replica over
//! [`CrashableBackend::reboot`], which sees exactly the bytes that made it
//! to the medium.
//!
//! ```rust,ignore
//! let disk = CrashableBackend::new();
//! let replica = JournalReplica::with_backend(Box::new(disk.clone()), JournalOptions::default())?;
//! disk.crash_after(12);
//! assert!(replica.upsert_many(&people, &records).is_err());
//! let recovered = JournalReplica::with_backend(Box::new(disk.reboot()), JournalOptions::default())?;
//! ```

use cofrasync_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory backend that can be told to fail part-way through a write.
///
/// Clones share the same bytes and crash state.
#[derive(Debug, Clone)]
pub struct CrashableBackend {
    bytes: Arc<Mutex<InMemoryBackend>>,
    budget: Arc<AtomicUsize>,
    crashed: Arc<AtomicBool>,
    fail_sync: Arc<AtomicBool>,
}

impl CrashableBackend {
    /// An empty, healthy backend.
    pub fn new() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// A healthy backend holding `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(InMemoryBackend::from_bytes(bytes))),
            budget: Arc::new(AtomicUsize::new(usize::MAX)),
            crashed: Arc::new(AtomicBool::new(false)),
            fail_sync: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Lets `bytes` more bytes through, then fails. The write that crosses
    /// the budget is persisted only up to it.
    pub fn crash_after(&self, bytes: usize) {
        self.budget.store(bytes, Ordering::SeqCst);
    }

    /// Makes `sync` fail.
    pub fn set_fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Bytes on the simulated medium.
    pub fn image(&self) -> Vec<u8> {
        self.bytes.lock().snapshot()
    }

    /// Drops the last `bytes` bytes, as if a write had been cut short.
    pub fn tear_tail(&self, bytes: usize) {
        let mut backend = self.bytes.lock();
        let size = backend.size().unwrap_or(0);
        let _ = backend.truncate(size.saturating_sub(bytes as u64));
    }

    /// A healthy backend over a copy of the current bytes.
    pub fn reboot(&self) -> Self {
        Self::from_bytes(self.image())
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("simulated crash during {what}")))
    }
}

impl Default for CrashableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.bytes.lock().read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.has_crashed() {
            return Err(self.crash("write after crash"));
        }
        let budget = self.budget.load(Ordering::SeqCst);
        let mut bytes = self.bytes.lock();
        if data.len() > budget {
            bytes.append(&data[..budget])?;
            self.budget.store(0, Ordering::SeqCst);
            drop(bytes);
            return Err(self.crash("write"));
        }
        if budget != usize::MAX {
            self.budget.store(budget - data.len(), Ordering::SeqCst);
        }
        bytes.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(self.crash("sync"));
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        self.bytes.lock().size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(self.crash("truncate after crash"));
        }
        self.bytes.lock().truncate(new_size)
    }
}
