//! Device-local persistence for the guest board.
//!
//! The guest board lives in a single record holding the whole task list as
//! a JSON array. [`LocalStore`] implementations only move the raw record in
//! and out; the provided [`LocalStore::load`] and [`LocalStore::save`]
//! methods carry the board policy:
//!
//! - a missing or unparseable record loads as the seed set,
//! - saving overwrites the whole record and never fails the caller.
//!
//! Concrete implementations:
//! - [`file::FileStore`]: `kanbanTasks.json` in the data directory
//! - [`memory::MemoryLocalStore`]: in-process record for tests

pub mod file;
pub mod memory;

use taskflow_proto::task::{Task, seed_tasks};

/// Fixed key of the guest board record.
pub const LOCAL_RECORD_KEY: &str = "kanbanTasks";

/// Errors raised by a [`LocalStore`] backend.
///
/// These never reach the board: [`LocalStore::load`] and
/// [`LocalStore::save`] log them and carry on.
#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    /// Reading or writing the record failed.
    #[error("local store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record is not a valid task list.
    #[error("local record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Raw access to the guest board record, plus the load/save policy.
pub trait LocalStore: Send {
    /// Read the raw record, `None` if it has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`LocalStoreError::Io`] if the backend cannot be read.
    fn read_record(&self) -> Result<Option<String>, LocalStoreError>;

    /// Replace the raw record.
    ///
    /// # Errors
    ///
    /// Returns [`LocalStoreError::Io`] if the backend cannot be written.
    fn write_record(&self, contents: &str) -> Result<(), LocalStoreError>;

    /// Load the guest board, falling back to the seed set.
    fn load(&self) -> Vec<Task> {
        match self.read_record() {
            Ok(Some(contents)) => match serde_json::from_str::<Vec<Task>>(&contents) {
                Ok(tasks) => tasks,
                Err(e) => {
                    tracing::warn!(
                        key = LOCAL_RECORD_KEY,
                        error = %LocalStoreError::Corrupt(e),
                        "ignoring unreadable local board, using seed tasks"
                    );
                    seed_tasks()
                }
            },
            Ok(None) => {
                tracing::debug!(key = LOCAL_RECORD_KEY, "no local board yet, using seed tasks");
                seed_tasks()
            }
            Err(e) => {
                tracing::warn!(key = LOCAL_RECORD_KEY, error = %e, "failed to read local board");
                seed_tasks()
            }
        }
    }

    /// Persist the whole guest board. Failures are logged and swallowed.
    fn save(&self, tasks: &[Task]) {
        let result = serde_json::to_string(tasks)
            .map_err(LocalStoreError::from)
            .and_then(|contents| self.write_record(&contents));
        match result {
            Ok(()) => tracing::trace!(key = LOCAL_RECORD_KEY, count = tasks.len(), "saved local board"),
            Err(e) => tracing::warn!(key = LOCAL_RECORD_KEY, error = %e, "failed to save local board"),
        }
    }
}
