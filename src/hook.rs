//! Component-facing handle over a storage binding.
//!
//! [`use_storage`] composes a [`Binding`]'s subscription and snapshot the
//! way a UI host composes an external store: the handle re-reads the stored
//! value on demand and runs its `on_change` callbacks (re-renders) whenever
//! the key is notified.

use crate::binding::Binding;
use crate::error::Result;
use crate::events::Listener;
use crate::storage::Storage;
use crate::types::{InitialValue, NewValue};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type RenderCallback = Arc<dyn Fn() + Send + Sync>;

/// Shared between the handle and its bus listener.
#[derive(Default)]
struct RenderState {
    /// Notifications observed for the bound key.
    version: AtomicU64,
    callbacks: RwLock<Vec<RenderCallback>>,
}

impl RenderState {
    fn notify(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        let callbacks: Vec<RenderCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            callback();
        }
    }
}

/// Live handle to one stored key.
///
/// Stays subscribed for its whole lifetime; dropping it unsubscribes.
pub struct StorageHandle<T> {
    binding: Binding<T>,
    render: Arc<RenderState>,
    _subscription: Listener,
}

/// Bind `key` with a plain initial value.
pub fn use_storage<T>(storage: &Storage, key: impl Into<String>, initial: T) -> StorageHandle<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    use_storage_from(storage, key, InitialValue::Literal(initial))
}

/// Bind `key` with an initial value produced once, on first use.
pub fn use_storage_with<T, F>(storage: &Storage, key: impl Into<String>, produce: F) -> StorageHandle<T>
where
    T: Serialize + DeserializeOwned + Clone,
    F: FnOnce() -> T,
{
    use_storage_from(storage, key, InitialValue::producer(produce))
}

/// Bind `key` with either form of initial value.
///
/// With [`StorageConfig::persist_initial`](crate::StorageConfig::persist_initial)
/// set, an absent key is seeded with the initial value so the backend matches
/// what the handle reports from the first read.
pub fn use_storage_from<T>(
    storage: &Storage,
    key: impl Into<String>,
    initial: InitialValue<'_, T>,
) -> StorageHandle<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let binding = storage.bind(key, initial);

    if storage.config().persist_initial {
        seed_initial(&binding);
    }

    let render = Arc::new(RenderState::default());
    let subscription = {
        let render = Arc::clone(&render);
        binding.subscribe(move || render.notify())
    };

    StorageHandle {
        binding,
        render,
        _subscription: subscription,
    }
}

fn seed_initial<T>(binding: &Binding<T>)
where
    T: Serialize + DeserializeOwned + Clone,
{
    match binding.storage().set_if_absent(binding.key(), binding.initial()) {
        Ok(true) => tracing::debug!(key = %binding.key(), "persisted initial value"),
        Ok(false) => {}
        Err(e) => tracing::debug!(key = %binding.key(), error = %e, "initial value not persisted"),
    }
}

impl<T> StorageHandle<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn key(&self) -> &str {
        self.binding.key()
    }

    /// Latest value, read from storage now.
    pub fn value(&self) -> T {
        self.binding.snapshot()
    }

    /// Number of change notifications observed for this key.
    pub fn version(&self) -> u64 {
        self.render.version.load(Ordering::SeqCst)
    }

    /// Run `callback` after each change notification for this key.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.render.callbacks.write().push(Arc::new(callback));
    }

    /// Store a value or apply an updater. See [`Storage::write`].
    pub fn set(&self, value: NewValue<'_, T>) -> Result<()> {
        self.binding.storage().write(self.binding.key(), value)
    }

    /// Store `value` directly.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.set(NewValue::Literal(value))
    }

    /// Replace the stored value with `update(previous)`.
    pub fn update<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(T) -> T,
    {
        self.set(NewValue::updater(update))
    }

    /// Delete this key. Best effort.
    pub fn remove(&self) {
        self.binding.storage().remove(self.binding.key());
    }

    /// Delete every key in the storage.
    pub fn clear_all(&self) -> Result<()> {
        self.binding.storage().clear()
    }
}
