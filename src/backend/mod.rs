//! Storage backends.
//!
//! A backend is a synchronous string-keyed map. Values are the encoded text
//! of whatever the caller stored; backends never interpret them.
//!
//! - [`MemoryBackend`]: in-process map with an optional byte quota
//! - [`FileBackend`]: JSON file on disk, guarded by an exclusive lock file

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::error::BackendError;

/// Contract every storage backend fulfils.
pub trait StorageBackend: Send + Sync {
    /// Raw text stored under `key`, or `None` if absent.
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` under `key`, replacing any previous entry.
    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Delete `key`. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), BackendError>;

    /// Delete every entry.
    fn clear(&self) -> Result<(), BackendError>;

    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>, BackendError>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize, BackendError> {
        Ok(self.keys()?.len())
    }

    fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }
}

/// Bytes an entry counts against a quota.
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}
