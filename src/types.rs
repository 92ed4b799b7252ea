//! Core types shared by the storage accessor, event bus, and bindings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// Notification that the value stored under `key` changed.
///
/// `new_value` carries the encoded text after a write and is `None` after a
/// removal. Events are never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

impl StorageEvent {
    /// Event for a key that now holds `raw`.
    pub fn written(key: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            new_value: Some(raw.into()),
        }
    }

    /// Event for a key that no longer exists.
    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            new_value: None,
        }
    }

    /// Exact key match, no wildcards.
    pub fn is_for(&self, key: &str) -> bool {
        self.key == key
    }
}

/// Fallback value for a binding: either given directly or produced once.
pub enum InitialValue<'a, T> {
    Literal(T),
    Producer(Box<dyn FnOnce() -> T + 'a>),
}

impl<'a, T> InitialValue<'a, T> {
    /// Lazily produced initial value.
    pub fn producer<F>(f: F) -> Self
    where
        F: FnOnce() -> T + 'a,
    {
        InitialValue::Producer(Box::new(f))
    }

    /// Resolve to a concrete value. A producer runs here and nowhere else.
    pub fn resolve(self) -> T {
        match self {
            InitialValue::Literal(value) => value,
            InitialValue::Producer(produce) => produce(),
        }
    }
}

impl<T> From<T> for InitialValue<'_, T> {
    fn from(value: T) -> Self {
        InitialValue::Literal(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for InitialValue<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            InitialValue::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Value passed to a write: a replacement or a function of the stored value.
pub enum NewValue<'a, T> {
    Literal(T),
    Updater(Box<dyn FnOnce(T) -> T + 'a>),
}

impl<'a, T> NewValue<'a, T> {
    /// Update computed from the currently stored value.
    pub fn updater<F>(f: F) -> Self
    where
        F: FnOnce(T) -> T + 'a,
    {
        NewValue::Updater(Box::new(f))
    }
}

impl<T> From<T> for NewValue<'_, T> {
    fn from(value: T) -> Self {
        NewValue::Literal(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for NewValue<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            NewValue::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}
