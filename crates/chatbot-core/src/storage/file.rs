use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{KeyValueStore, StorageError, entry_size};

/// Directory-backed store: each key is a `<key>.json` file.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    quota: Option<usize>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, quota: None })
    }

    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{name}.json"))
    }

    /// Bytes held by every entry except `skip`.
    fn used_except(&self, skip: &Path) -> Result<usize, StorageError> {
        let mut total = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path == skip || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let stem_len = path.file_stem().map_or(0, |s| s.len());
            total += stem_len + entry.metadata()?.len() as usize;
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(quota) = self.quota {
            let needed = self.used_except(&path)? + entry_size(key, value);
            if needed > quota {
                debug!(key, needed, quota, "file store write rejected");
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::open(dir.path()).unwrap().set("multimodal-chatbot-token", "\"abc\"").unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("multimodal-chatbot-token").unwrap().as_deref(), Some("\"abc\""));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn quota_applies_across_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap().with_quota(20);
        store.set("a", "0123456789").unwrap();
        assert!(store.set("b", "0123456789").unwrap_err().is_quota());
        store.delete("a").unwrap();
        store.set("b", "0123456789").unwrap();
    }

    #[test]
    fn delete_of_missing_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.delete("nothing").unwrap();
    }
}
