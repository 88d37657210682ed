//! In-process guest board record.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{LocalStore, LocalStoreError};

/// Keeps the record in memory. Clones share the same record, so a test can
/// hand one clone to a controller and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    record: Arc<Mutex<Option<String>>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryLocalStore {
    /// Empty store: loads as the seed set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a raw record.
    #[must_use]
    pub fn with_record(contents: &str) -> Self {
        let store = Self::default();
        *store.record.lock() = Some(contents.to_string());
        store
    }

    /// Current raw record.
    #[must_use]
    pub fn record(&self) -> Option<String> {
        self.record.lock().clone()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl LocalStore for MemoryLocalStore {
    fn read_record(&self) -> Result<Option<String>, LocalStoreError> {
        Ok(self.record.lock().clone())
    }

    fn write_record(&self, contents: &str) -> Result<(), LocalStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("storage quota exceeded").into());
        }
        *self.record.lock() = Some(contents.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
