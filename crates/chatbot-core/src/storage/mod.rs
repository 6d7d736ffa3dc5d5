//! String key-value persistence with an optional size quota.
//!
//! [`KeyValueStore`] is the seam the conversation layer writes through.  Two
//! implementations ship with the crate: [`MemoryStore`] for tests and
//! short-lived processes, and [`FileStore`] which keeps one file per key.

mod file;
mod memory;

use std::sync::Arc;

use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Synchronous string store.  `set` may refuse a write that would push the
/// store past its quota; the previous value is then left untouched.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }
}

/// Bytes a stored entry counts against a quota.
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}
