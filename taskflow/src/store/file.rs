//! File-backed guest board record.

use std::path::{Path, PathBuf};

use super::{LOCAL_RECORD_KEY, LocalStore, LocalStoreError};

/// Stores the guest board as `kanbanTasks.json` inside a data directory.
///
/// Writes go to a sibling temp file that is then renamed over the record, so
/// a crash mid-write never leaves a torn record behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `data_dir`. The directory is created lazily
    /// on first save.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{LOCAL_RECORD_KEY}.json")),
        }
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalStore for FileStore {
    fn read_record(&self) -> Result<Option<String>, LocalStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, contents: &str) -> Result<(), LocalStoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
