use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{KeyValueStore, StorageError, entry_size};

/// In-process store.  With a quota it behaves like browser local storage:
/// the sum of key and value lengths may not exceed the limit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self { entries: Mutex::default(), quota: Some(quota) }
    }

    pub fn quota(&self) -> Option<usize> {
        self.quota
    }

    /// Bytes currently counted against the quota.
    pub fn used(&self) -> usize {
        self.lock().iter().map(|(k, v)| entry_size(k, v)).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.lock();
        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = others + entry_size(key, value);
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unbounded_store_accepts_everything() {
        let store = MemoryStore::new();
        store.set("k", &"x".repeat(1 << 20)).unwrap();
        assert_eq!(store.get("k").unwrap().map(|v| v.len()), Some(1 << 20));
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn quota_rejects_and_keeps_previous_value() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();
        let err = store.set("k", "1234567890").unwrap_err();
        assert!(err.is_quota());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("12345"));
    }

    #[test]
    fn replacing_a_value_does_not_double_count() {
        let store = MemoryStore::with_quota(8);
        store.set("ab", "123456").unwrap();
        store.set("ab", "654321").unwrap();
        assert_eq!(store.used(), 8);
    }
}
