//! In-memory storage backend.

use super::{entry_size, StorageBackend};
use crate::error::BackendError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key-value map held in process memory.
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
    /// Max total bytes of keys plus values (None = unlimited).
    quota_bytes: Option<usize>,
    /// Reject every mutation with `AccessDenied`.
    read_only: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty, unlimited backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            quota_bytes: None,
            read_only: AtomicBool::new(false),
        }
    }

    /// Create an empty backend that rejects writes beyond `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    /// Toggle read-only mode, as when a platform denies storage access.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Total bytes currently used.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum()
    }

    fn check_writable(&self, op: &str) -> Result<(), BackendError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(BackendError::AccessDenied(format!("{} on read-only storage", op)));
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.check_writable("set")?;
        let mut entries = self.entries.write();

        if let Some(limit) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = others + entry_size(key, value);
            if needed > limit {
                return Err(BackendError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        self.check_writable("remove")?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        self.check_writable("clear")?;
        self.entries.write().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize, BackendError> {
        Ok(self.entries.read().len())
    }
}
