//! Error handling and edge case tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use storage_sync::{
    use_storage, BackendError, EventBus, InitialValue, MemoryBackend, NewValue, Storage,
    StorageBackend, StorageConfig, StorageError, StorageEvent,
};
use tempfile::TempDir;

/// Memory backend that refuses to touch one key.
struct StubbornBackend {
    inner: MemoryBackend,
    stubborn_key: String,
    fail_reads: bool,
}

impl StubbornBackend {
    fn new(stubborn_key: &str) -> Self {
        Self {
            inner: MemoryBackend::new(),
            stubborn_key: stubborn_key.to_string(),
            fail_reads: false,
        }
    }

    fn deny(&self, key: &str) -> Result<(), BackendError> {
        if key == self.stubborn_key {
            return Err(BackendError::AccessDenied(key.to_string()));
        }
        Ok(())
    }
}

impl StorageBackend for StubbornBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        if self.fail_reads {
            self.deny(key)?;
        }
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        self.deny(key)?;
        self.inner.remove_item(key)
    }

    fn clear(&self) -> Result<(), BackendError> {
        Err(BackendError::AccessDenied("clear".to_string()))
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        self.inner.keys()
    }
}

fn storage_over(backend: Arc<dyn StorageBackend>) -> (Storage, Arc<Mutex<Vec<StorageEvent>>>) {
    let bus = Arc::new(EventBus::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.add_listener(move |event| sink.lock().push(event.clone()));

    let storage = Storage::with_backend(backend, bus, StorageConfig::default());
    (storage, events)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// --- Write Errors ---

#[test]
fn test_write_to_read_only_backend() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    backend.set_item("k", "1").unwrap();
    backend.set_read_only(true);
    let (storage, events) = storage_over(backend);

    let result = storage.write("k", NewValue::Literal(2));

    match result {
        Err(StorageError::Write { key, source }) => {
            assert_eq!(key, "k");
            assert!(matches!(*source, StorageError::Backend(BackendError::AccessDenied(_))));
        }
        other => panic!("Expected write error, got {:?}", other),
    }
    assert_eq!(storage.read::<i32>("k").unwrap(), Some(1));
    assert!(events.lock().is_empty());
}

#[test]
fn test_quota_exceeded_keeps_old_value() {
    let storage = Storage::open(StorageConfig {
        quota_bytes: Some(16),
        ..Default::default()
    })
    .unwrap();
    let handle = use_storage(&storage, "note", "hi".to_string());

    let result = handle.set_value("this note is much too long".to_string());

    assert!(matches!(
        result.unwrap_err().cause(),
        StorageError::Backend(BackendError::QuotaExceeded { .. })
    ));
    assert_eq!(handle.value(), "hi");
    assert_eq!(handle.version(), 0);
}

#[test]
fn test_updater_on_absent_key() {
    let (storage, events) = storage_over(Arc::new(MemoryBackend::new()));

    let err = storage
        .write("count", NewValue::updater(|n: i32| n + 1))
        .unwrap_err();

    assert!(matches!(err.cause(), StorageError::MissingPreviousValue(key) if key == "count"));
    assert!(events.lock().is_empty());
}

#[test]
fn test_updater_on_wrong_type() {
    let storage = Storage::in_memory();
    storage.set("count", "three").unwrap();

    let err = storage.update("count", |n: i32| n + 1).unwrap_err();

    assert!(matches!(err.cause(), StorageError::Serialization(_)));
    assert_eq!(storage.read::<String>("count").unwrap().as_deref(), Some("three"));
}

#[test]
fn test_unencodable_value_is_rejected() {
    let (storage, events) = storage_over(Arc::new(MemoryBackend::new()));
    storage.set("k", &1).unwrap();
    events.lock().clear();

    let mut bytes_keyed: HashMap<Vec<u8>, i32> = HashMap::new();
    bytes_keyed.insert(vec![1, 2], 3);
    let err = storage.set("k", &bytes_keyed).unwrap_err();

    assert!(matches!(err, StorageError::Write { ref key, .. } if key == "k"));
    assert!(matches!(err.cause(), StorageError::Serialization(_)));
    assert_eq!(storage.read_raw("k").unwrap().as_deref(), Some("1"));
    assert!(events.lock().is_empty());
}

// --- Remove Errors ---

#[test]
fn test_remove_failure_is_swallowed() {
    init_tracing();
    let backend = Arc::new(StubbornBackend::new("pinned"));
    backend.set_item("pinned", "1").unwrap();
    let (storage, events) = storage_over(backend);

    storage.remove("pinned");

    assert_eq!(storage.read_raw("pinned").unwrap().as_deref(), Some("1"));
    assert!(events.lock().is_empty());
}

#[test]
fn test_remove_many_continues_past_failure() {
    let backend = Arc::new(StubbornBackend::new("b"));
    for key in ["a", "b", "c"] {
        backend.set_item(key, "0").unwrap();
    }
    let (storage, events) = storage_over(backend);

    storage.remove_many(vec!["a", "b", "c"]);

    assert_eq!(storage.keys().unwrap(), vec!["b"]);
    assert_eq!(
        *events.lock(),
        vec![StorageEvent::removed("a"), StorageEvent::removed("c")]
    );
}

#[test]
fn test_remove_absent_key_still_notifies() {
    let (storage, events) = storage_over(Arc::new(MemoryBackend::new()));

    storage.remove("ghost");

    assert_eq!(*events.lock(), vec![StorageEvent::removed("ghost")]);
}

// --- Clear Errors ---

#[test]
fn test_clear_failure_propagates() {
    let backend = Arc::new(StubbornBackend::new("pinned"));
    backend.set_item("a", "1").unwrap();
    let (storage, events) = storage_over(backend);

    let result = storage.clear();

    assert!(matches!(result, Err(StorageError::Clear(BackendError::AccessDenied(_)))));
    assert_eq!(storage.len().unwrap(), 1);
    assert!(events.lock().is_empty());
}

#[test]
fn test_clear_empty_storage() {
    let (storage, events) = storage_over(Arc::new(MemoryBackend::new()));

    storage.clear().unwrap();
    assert!(events.lock().is_empty());
}

// --- Read Errors ---

#[test]
fn test_unreadable_key_yields_initial() {
    init_tracing();
    let mut backend = StubbornBackend::new("secret");
    backend.fail_reads = true;
    backend.set_item("secret", "42").unwrap();
    let (storage, _) = storage_over(Arc::new(backend));

    let binding = storage.bind("secret", InitialValue::Literal(0_i32));
    assert_eq!(binding.snapshot(), 0);
}

#[test]
fn test_corrupt_value_yields_initial() {
    let storage = Storage::in_memory();
    storage.backend().set_item("prefs", "{\"theme\":").unwrap();

    let handle = use_storage(&storage, "prefs", serde_json::json!({ "theme": "light" }));
    assert_eq!(handle.value(), serde_json::json!({ "theme": "light" }));

    // Not overwritten: the key was present
    assert_eq!(storage.read_raw("prefs").unwrap().as_deref(), Some("{\"theme\":"));
}

// --- Backend Errors ---

#[test]
fn test_open_locked_file() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        path: Some(dir.path().join("storage.json")),
        ..Default::default()
    };

    let _first = Storage::open(config.clone()).unwrap();
    let second = Storage::open(config);

    assert!(matches!(second, Err(StorageError::Backend(BackendError::Locked))));
}

#[test]
fn test_open_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");
    std::fs::write(&path, b"[1, 2").unwrap();

    let result = Storage::open(StorageConfig {
        path: Some(path),
        ..Default::default()
    });

    assert!(matches!(result, Err(StorageError::Backend(BackendError::Corrupt(_)))));
}
