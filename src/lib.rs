//! # Storage Sync
//!
//! Keeps every consumer of a stored key in sync with the key-value store
//! underneath it.
//!
//! ## Core Concepts
//!
//! - **Backend**: a synchronous string-keyed map (in memory or a JSON file)
//! - **Storage**: JSON-encoded reads and writes that notify on every change
//! - **Event bus**: synchronous, in-process fan-out of change notifications
//! - **Binding**: a per-key subscription plus a snapshot read with a fallback
//! - **Handle**: what a component holds: value, set, remove, clear
//!
//! ## Example
//!
//! ```ignore
//! use storage_sync::{use_storage, Storage, StorageConfig};
//!
//! let storage = Storage::open(StorageConfig {
//!     path: Some("./settings.json".into()),
//!     ..Default::default()
//! })?;
//!
//! let theme = use_storage(&storage, "theme", "light".to_string());
//! let other = use_storage(&storage, "theme", "light".to_string());
//!
//! theme.set_value("dark".to_string())?;
//! assert_eq!(other.value(), "dark");
//!
//! // Both fall back to their initial value
//! other.remove();
//! ```

pub mod backend;
pub mod binding;
pub mod error;
pub mod events;
pub mod hook;
pub mod storage;
pub mod types;

// Re-exports
pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use binding::Binding;
pub use error::{BackendError, Result, StorageError};
pub use events::{EventBus, EventReceiver, Listener};
pub use hook::{use_storage, use_storage_from, use_storage_with, StorageHandle};
pub use storage::{Storage, StorageConfig};
pub use types::*;
