//! Storage accessor: serialized reads and writes that notify on change.

use crate::backend::{FileBackend, MemoryBackend, StorageBackend};
use crate::binding::Binding;
use crate::error::{Result, StorageError};
use crate::events::EventBus;
use crate::types::{InitialValue, NewValue, StorageEvent};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Storage configuration.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// JSON file to persist entries in (None = in-memory only).
    pub path: Option<PathBuf>,

    /// Max total bytes of keys plus values (None = unlimited).
    pub quota_bytes: Option<usize>,

    /// Whether a new handle writes its initial value when the key is absent.
    pub persist_initial: bool,

    /// Buffer size for channel subscriptions opened through [`Storage::events`].
    pub channel_buffer: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            quota_bytes: None,
            persist_initial: true,
            channel_buffer: 256,
        }
    }
}

/// Key-value storage with change notification.
///
/// Values are stored as JSON text. Every successful mutation dispatches a
/// [`StorageEvent`] on the shared [`EventBus`] before returning, so all
/// bindings to the affected key observe it. Cloning is cheap; clones share
/// the backend and the bus.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
    bus: Arc<EventBus>,
    config: StorageConfig,
    /// Serializes check-then-store cycles.
    write_lock: Arc<Mutex<()>>,
}

impl Storage {
    /// Open storage as described by `config`.
    pub fn open(config: StorageConfig) -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = match config.path {
            Some(ref path) => Arc::new(FileBackend::open_with_quota(path, config.quota_bytes)?),
            None => match config.quota_bytes {
                Some(limit) => Arc::new(MemoryBackend::with_quota(limit)),
                None => Arc::new(MemoryBackend::new()),
            },
        };

        Ok(Self::with_backend(backend, Arc::new(EventBus::new()), config))
    }

    /// Fresh in-memory storage with default settings.
    pub fn in_memory() -> Self {
        Self::with_backend(
            Arc::new(MemoryBackend::new()),
            Arc::new(EventBus::new()),
            StorageConfig::default(),
        )
    }

    /// Storage over an explicit backend and bus.
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        bus: Arc<EventBus>,
        config: StorageConfig,
    ) -> Self {
        Self {
            backend,
            bus,
            config,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // --- Reads ---

    /// Raw text stored under `key`.
    pub fn read_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.backend.get_item(key)?)
    }

    /// Decoded value stored under `key`.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// All stored keys.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.backend.keys()?)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.backend.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.backend.is_empty()?)
    }

    // --- Writes ---

    /// Store a value, or apply an updater to the value already stored.
    ///
    /// An updater fails with [`StorageError::MissingPreviousValue`] when
    /// nothing is stored. It runs without the write lock held, so it may write
    /// to other keys; if the value it was given has changed by the time its
    /// result is stored, the write fails with [`StorageError::Conflict`].
    /// Any failure is logged and returned wrapped in [`StorageError::Write`].
    pub fn write<T>(&self, key: &str, value: NewValue<'_, T>) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let raw = match value {
            NewValue::Literal(value) => self.store_encoded(key, &value, None),
            NewValue::Updater(update) => self.apply_update(key, update),
        };

        match raw {
            Ok(raw) => {
                self.bus.dispatch(&StorageEvent::written(key, raw));
                Ok(())
            }
            Err(e) => Err(self.write_failed(key, e)),
        }
    }

    /// Store a value directly.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        match self.store_encoded(key, value, None) {
            Ok(raw) => {
                self.bus.dispatch(&StorageEvent::written(key, raw));
                Ok(())
            }
            Err(e) => Err(self.write_failed(key, e)),
        }
    }

    /// Store `value` only if nothing is stored under `key`. Returns whether it
    /// was written; the check and the write happen under one lock.
    pub fn set_if_absent<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        let written = serde_json::to_string(value)
            .map_err(StorageError::from)
            .and_then(|raw| {
                let _lock = self.write_lock.lock();
                if self.backend.get_item(key)?.is_some() {
                    return Ok(None);
                }
                self.backend.set_item(key, &raw)?;
                Ok(Some(raw))
            });

        match written {
            Ok(Some(raw)) => {
                self.bus.dispatch(&StorageEvent::written(key, raw));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(self.write_failed(key, e)),
        }
    }

    /// Replace the stored value with `update(previous)`.
    pub fn update<T, F>(&self, key: &str, update: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        self.write(key, NewValue::updater(update))
    }

    /// Encode `value` and store it. With `expected` set, the stored text must
    /// still equal it when the lock is taken. Returns the stored text.
    fn store_encoded<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expected: Option<&str>,
    ) -> Result<String> {
        let raw = serde_json::to_string(value)?;

        let _lock = self.write_lock.lock();
        if let Some(expected) = expected {
            if self.backend.get_item(key)?.as_deref() != Some(expected) {
                return Err(StorageError::Conflict(key.to_string()));
            }
        }
        self.backend.set_item(key, &raw)?;
        Ok(raw)
    }

    fn apply_update<T>(&self, key: &str, update: Box<dyn FnOnce(T) -> T + '_>) -> Result<String>
    where
        T: Serialize + DeserializeOwned,
    {
        let previous_raw = self
            .backend
            .get_item(key)?
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| StorageError::MissingPreviousValue(key.to_string()))?;
        let previous: T = serde_json::from_str(&previous_raw)?;

        let next = update(previous);
        self.store_encoded(key, &next, Some(&previous_raw))
    }

    fn write_failed(&self, key: &str, error: StorageError) -> StorageError {
        tracing::error!(key = %key, error = %error, "failed to write storage value");
        StorageError::Write {
            key: key.to_string(),
            source: Box::new(error),
        }
    }

    /// Delete `key` and notify. Best effort: failures are logged, not returned.
    pub fn remove(&self, key: &str) {
        let removed = {
            let _lock = self.write_lock.lock();
            self.backend.remove_item(key)
        };

        match removed {
            Ok(()) => self.bus.dispatch(&StorageEvent::removed(key)),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "failed to remove storage value");
            }
        }
    }

    /// Delete each key in order, notifying per key. A failing key is logged
    /// and skipped; the rest are still removed.
    pub fn remove_many<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.remove(key.as_ref());
        }
    }

    /// Delete every entry, notifying once per removed key.
    pub fn clear(&self) -> Result<()> {
        let removed = {
            let _lock = self.write_lock.lock();
            self.backend
                .keys()
                .and_then(|keys| self.backend.clear().map(|()| keys))
        };

        let keys = removed.map_err(|e| {
            tracing::error!(error = %e, "failed to clear storage");
            StorageError::Clear(e)
        })?;

        for key in keys {
            self.bus.dispatch(&StorageEvent::removed(key));
        }

        Ok(())
    }

    // --- Bindings ---

    /// Bind to `key` with the given fallback.
    pub fn bind<T>(&self, key: impl Into<String>, initial: InitialValue<'_, T>) -> Binding<T>
    where
        T: DeserializeOwned + Clone,
    {
        Binding::new(self.clone(), key, initial)
    }

    /// Channel of events for the given keys (None = all keys).
    pub fn events(&self, keys: Option<Vec<String>>) -> crate::events::EventReceiver {
        self.bus.channel_with_buffer(keys, self.config.channel_buffer)
    }
}
