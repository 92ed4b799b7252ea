//! Reactive binding of one key: a change subscription plus a snapshot read.

use crate::events::Listener;
use crate::storage::Storage;
use crate::types::InitialValue;
use serde::de::DeserializeOwned;

/// One consumer's view of a stored key.
///
/// [`Binding::snapshot`] re-queries the backend on every call; nothing is
/// cached apart from the resolved initial value.
pub struct Binding<T> {
    storage: Storage,
    key: String,
    initial: T,
}

impl<T> Binding<T>
where
    T: DeserializeOwned + Clone,
{
    /// Bind `key`, resolving `initial` now. A producer runs exactly once.
    pub fn new(storage: Storage, key: impl Into<String>, initial: InitialValue<'_, T>) -> Self {
        Self {
            storage,
            key: key.into(),
            initial: initial.resolve(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn initial(&self) -> &T {
        &self.initial
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Call `on_change` after every notification for exactly this key.
    ///
    /// The subscription lasts until the returned [`Listener`] is dropped.
    pub fn subscribe<F>(&self, on_change: F) -> Listener
    where
        F: Fn() + Send + Sync + 'static,
    {
        let key = self.key.clone();
        tracing::debug!(key = %key, "binding subscribed");

        self.storage.bus().listen(move |event| {
            if event.is_for(&key) {
                on_change();
            }
        })
    }

    /// Current value: the decoded stored text, or the initial value when the
    /// key is absent, empty, unreadable, or fails to decode. Never fails.
    pub fn snapshot(&self) -> T {
        let raw = match self.storage.backend().get_item(&self.key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return self.initial.clone(),
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "failed to read stored value");
                return self.initial.clone();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "failed to parse stored value");
                self.initial.clone()
            }
        }
    }
}
