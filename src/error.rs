//! Error types for storage operations.

use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Quota exceeded writing {key}: needs {needed} bytes, limit is {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Corrupt storage file: {0}")]
    Corrupt(String),

    #[error("Storage is locked by another process")]
    Locked,
}

/// Main error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cannot apply update to {0}: nothing is stored")]
    MissingPreviousValue(String),

    #[error("Value for {0} changed while its update was being computed")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to write value for key {key}")]
    Write {
        key: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Failed to clear storage")]
    Clear(#[source] BackendError),
}

impl StorageError {
    /// The innermost error, unwrapping any `Write` layers.
    pub fn cause(&self) -> &StorageError {
        match self {
            StorageError::Write { source, .. } => source.cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
