//! Synchronous persistent maps underneath [`LocalStore`](super::LocalStore).

use crate::error::Result;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Writes that must reach storage together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    /// Entries to create or overwrite
    pub puts: Vec<(String, String)>,
    /// Entries to delete; missing ones are ignored
    pub deletes: Vec<String>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a write.
    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.puts.push((key.into(), value.into()));
        self
    }

    /// Add a delete.
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.deletes.push(key.into());
        self
    }

    /// Check if the batch does nothing.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

/// A string-to-string persistent map.
///
/// Backends are deliberately synchronous: the local store must be readable
/// without an async round-trip while the commit queue bootstraps.
pub trait Backend: Send + Sync {
    /// Read a raw entry.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Apply every write of `batch` atomically. After a failure or a crash
    /// storage holds either all of the batch or none of it.
    fn apply(&self, batch: WriteBatch) -> Result<()>;

    /// Whether writes block on I/O and should leave the async runtime.
    fn is_blocking(&self) -> bool {
        false
    }

    /// Write a raw entry.
    fn put(&self, key: &str, value: String) -> Result<()> {
        self.apply(WriteBatch::new().put(key, value))
    }

    /// Delete a raw entry. Missing keys are ignored.
    fn delete(&self, key: &str) -> Result<()> {
        self.apply(WriteBatch::new().delete(key))
    }
}

/// Volatile in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of raw entries, reserved ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the backend holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        for (key, value) in batch.puts {
            self.entries.insert(key, value);
        }
        for key in batch.deletes {
            self.entries.remove(&key);
        }
        Ok(())
    }
}

/// Backend persisting the whole map as one JSON file.
///
/// Every batch rewrites the file once through a temporary sibling and a
/// rename, so a crash leaves either the old or the new map on disk.
///
/// Writes block on disk I/O; [`LocalStore`](super::LocalStore) runs them
/// on tokio's blocking pool.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileBackend {
    /// Open (or create on first write) the map stored at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "opened file backend");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written,
        // so a poisoned guard is still consistent.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Backend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        let mut entries = self.lock();
        let mut undo: Vec<(String, Option<String>)> = Vec::new();
        let mut changed = false;

        for (key, value) in batch.puts {
            let previous = entries.insert(key.clone(), value);
            undo.push((key, previous));
            changed = true;
        }
        for key in batch.deletes {
            if let Some(previous) = entries.remove(&key) {
                undo.push((key, Some(previous)));
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }

        // One flush per batch: the rename publishes all of it at once.
        if let Err(e) = self.flush(&entries) {
            for (key, previous) in undo.into_iter().rev() {
                match previous {
                    Some(value) => entries.insert(key, value),
                    None => entries.remove(&key),
                };
            }
            return Err(e);
        }
        Ok(())
    }

    fn is_blocking(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_put_get_delete() {
        let backend = MemoryBackend::new();
        backend.put("k", "v".into()).unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("v"));

        backend.delete("k").unwrap();
        backend.delete("k").unwrap();
        assert!(backend.get("k").unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", "1".into()).unwrap();
            backend.put("b", "2".into()).unwrap();
            backend.delete("a").unwrap();
        }

        let reopened = FileBackend::open(&path).unwrap();
        assert!(reopened.get("a").unwrap().is_none());
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("2"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn file_backend_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            FileBackend::open(&path),
            Err(crate::Error::Codec(_))
        ));
    }

    #[test]
    fn file_backend_batch_is_one_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let backend = FileBackend::open(&path).unwrap();
        backend.put("old", "0".into()).unwrap();

        backend
            .apply(WriteBatch::new().put("a", "1").put("meta", "{}").delete("old"))
            .unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk.get("a").map(String::as_str), Some("1"));
        assert!(!on_disk.contains_key("old"));
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("store.json");
        let backend = FileBackend::open(&path).unwrap();

        let batch = WriteBatch::new().put("a", "1").put("meta", "{}");
        assert!(backend.apply(batch).is_err());
        assert!(backend.get("a").unwrap().is_none());
        assert!(backend.get("meta").unwrap().is_none());
    }

    #[test]
    fn file_backend_write_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so every flush fails.
        let path = dir.path().join("missing").join("store.json");
        let backend = FileBackend::open(&path).unwrap();

        assert!(matches!(backend.put("a", "1".into()), Err(crate::Error::Io(_))));
        assert!(backend.get("a").unwrap().is_none());
    }
}
