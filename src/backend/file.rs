//! File-backed storage backend.
//!
//! Entries live in a single JSON object file. The whole map is kept in
//! memory and rewritten through a temp file + rename after every mutation,
//! so a crash leaves either the old or the new file, never a torn one.

use super::{entry_size, StorageBackend};
use crate::error::BackendError;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable key-value map stored as a JSON file.
pub struct FileBackend {
    /// Path of the JSON data file.
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// In-memory copy of the file contents.
    entries: RwLock<BTreeMap<String, String>>,

    /// Max total bytes of keys plus values (None = unlimited).
    quota_bytes: Option<usize>,
}

impl FileBackend {
    /// Open the file at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        Self::open_with_quota(path, None)
    }

    /// Open with a byte quota on the total size of keys plus values.
    pub fn open_with_quota(
        path: impl AsRef<Path>,
        quota_bytes: Option<usize>,
    ) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_file = Self::acquire_lock(&path)?;
        let entries = Self::load(&path)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
            entries: RwLock::new(entries),
            quota_bytes,
        })
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<BTreeMap<String, String>, BackendError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| BackendError::Corrupt(e.to_string()))
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), BackendError> {
        let bytes =
            serde_json::to_vec(entries).map_err(|e| BackendError::Corrupt(e.to_string()))?;

        let tmp_path = Self::sibling(&self.path, ".tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// `path` with `suffix` appended to the full file name.
    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn acquire_lock(path: &Path) -> Result<File, BackendError> {
        let lock_file = File::create(Self::sibling(path, ".lock"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| BackendError::Locked)?;

        Ok(lock_file)
    }

    /// Apply `mutate` to a copy of the map and persist it. The in-memory map
    /// only changes once the file is written.
    fn mutate<F>(&self, mutate: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Result<(), BackendError>,
    {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        mutate(&mut next)?;
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let quota = self.quota_bytes;
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
            if let Some(limit) = quota {
                let needed: usize = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
                if needed > limit {
                    return Err(BackendError::QuotaExceeded {
                        key: key.to_string(),
                        needed,
                        limit,
                    });
                }
            }
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        if !self.entries.read().contains_key(key) {
            return Ok(());
        }
        self.mutate(|entries| {
            entries.remove(key);
            Ok(())
        })
    }

    fn clear(&self) -> Result<(), BackendError> {
        self.mutate(|entries| {
            entries.clear();
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize, BackendError> {
        Ok(self.entries.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.set_item("theme", "\"dark\"").unwrap();
            backend.set_item("count", "3").unwrap();
            backend.remove_item("count").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get_item("theme").unwrap().as_deref(), Some("\"dark\""));
        assert_eq!(backend.get_item("count").unwrap(), None);
        assert_eq!(backend.keys().unwrap(), vec!["theme"]);
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        let _backend = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);
        assert!(matches!(second, Err(BackendError::Locked)));
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, b"{not json").unwrap();

        let result = FileBackend::open(&path);
        assert!(matches!(result, Err(BackendError::Corrupt(_))));
    }

    #[test]
    fn test_quota_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        let backend = FileBackend::open_with_quota(&path, Some(8)).unwrap();
        backend.set_item("a", "1").unwrap();

        let result = backend.set_item("big", "0123456789");
        assert!(matches!(result, Err(BackendError::QuotaExceeded { .. })));
        assert_eq!(backend.get_item("big").unwrap(), None);

        drop(backend);
        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_files_differing_by_extension_stay_apart() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("s.json");
        let txt_path = dir.path().join("s.txt");

        let json = Arc::new(FileBackend::open(&json_path).unwrap());
        let txt = Arc::new(FileBackend::open(&txt_path).unwrap());

        let pairs = [("a", Arc::clone(&json)), ("b", Arc::clone(&txt))];
        let writers: Vec<_> = pairs
            .into_iter()
            .map(|(prefix, backend)| {
                thread::spawn(move || {
                    for i in 0..200 {
                        backend
                            .set_item(&format!("{}{}", prefix, i % 5), &i.to_string())
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        drop(json);
        drop(txt);

        let json = FileBackend::open(&json_path).unwrap();
        let txt = FileBackend::open(&txt_path).unwrap();
        assert_eq!(json.keys().unwrap(), vec!["a0", "a1", "a2", "a3", "a4"]);
        assert_eq!(txt.keys().unwrap(), vec!["b0", "b1", "b2", "b3", "b4"]);
        assert!(!dir.path().join("s.tmp").exists());
    }

    #[test]
    fn test_clear_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.set_item("a", "1").unwrap();
            backend.clear().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.is_empty().unwrap());
    }
}
