//! Local store: a namespaced persistent map with an embedded metadata index.

use super::backend::{Backend, FileBackend, MemoryBackend, WriteBatch};
use super::{is_reserved, validate_user_key, AsyncStorage, LocalStorage, META_KEY};
use crate::codec::{default_fingerprinter, Codec, Fingerprinter, JsonCodec};
use crate::{error::Result, Error, Fingerprint, MetaIndex, Value};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The local side of a synchronizer.
///
/// Every physical key is `<instance>/<key>`. The committed metadata index is
/// cached in memory and persisted under the reserved `@meta` key; it is only
/// modified while the index lock is held, together with the value it
/// describes, so readers never observe a value without its entry or the
/// reverse. A value and its index entry reach the backend in a single
/// [`WriteBatch`], so a crash cannot separate them either.
///
/// Writes to a blocking backend such as [`FileBackend`] run on tokio's
/// blocking pool.
pub struct LocalStore<B: Backend = MemoryBackend> {
    instance_name: String,
    backend: Arc<B>,
    codec: Arc<dyn Codec>,
    fingerprinter: Fingerprinter,
    index: Mutex<MetaIndex>,
}

impl LocalStore<MemoryBackend> {
    /// A volatile local store, mostly useful for tests.
    pub fn in_memory(instance_name: impl Into<String>) -> Self {
        // An empty memory backend has no index to decode.
        Self::build(instance_name.into(), MemoryBackend::new(), MetaIndex::new())
    }
}

impl LocalStore<FileBackend> {
    /// Open a local store persisted in a single JSON file.
    pub fn open_file(instance_name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        Self::new(instance_name, FileBackend::open(path)?)
    }
}

impl<B: Backend> LocalStore<B> {
    /// Open a store over an existing backend, loading its persisted index.
    pub fn new(instance_name: impl Into<String>, backend: B) -> Result<Self> {
        let instance_name = instance_name.into();
        let index = match backend.get(&physical_key(&instance_name, META_KEY))? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => MetaIndex::new(),
        };
        tracing::debug!(
            instance = %instance_name,
            keys = index.len(),
            "opened local store"
        );
        Ok(Self::build(instance_name, backend, index))
    }

    fn build(instance_name: String, backend: B, index: MetaIndex) -> Self {
        Self {
            instance_name,
            backend: Arc::new(backend),
            codec: Arc::new(JsonCodec),
            fingerprinter: default_fingerprinter(),
            index: Mutex::new(index),
        }
    }

    /// Use a different value codec.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Use a different fingerprint function.
    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn physical(&self, key: &str) -> String {
        physical_key(&self.instance_name, key)
    }

    fn read(&self, key: &str) -> Result<Option<Value>> {
        match self.backend.get(&self.physical(key))? {
            Some(raw) => Ok(Some(self.codec.decode(raw.as_bytes())?)),
            None => Ok(None),
        }
    }

    fn index_batch(&self, index: &MetaIndex) -> Result<WriteBatch> {
        Ok(WriteBatch::new().put(self.physical(META_KEY), serde_json::to_string(index)?))
    }
}

impl<B: Backend + 'static> LocalStore<B> {
    async fn write(&self, batch: WriteBatch) -> Result<()> {
        if !self.backend.is_blocking() {
            return self.backend.apply(batch);
        }
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.apply(batch))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

fn physical_key(instance_name: &str, key: &str) -> String {
    format!("{instance_name}/{key}")
}

#[async_trait]
impl<B: Backend + 'static> AsyncStorage for LocalStore<B> {
    fn instance_name(&self) -> &str {
        &self.instance_name
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_sync(key)
    }

    async fn set(&self, key: &str, value: Value) -> Result<Fingerprint> {
        validate_user_key(key)?;
        let bytes = self.codec.encode(&value)?;
        let fingerprint = (self.fingerprinter)(&bytes);
        let raw = String::from_utf8(bytes)
            .map_err(|e| Error::Codec(format!("local store needs UTF-8 encodings: {e}")))?;

        let mut index = self.index.lock().await;
        let previous_entry = index.get(key).cloned();
        index.insert(key, fingerprint.clone());
        let written = match self.index_batch(&index) {
            Ok(batch) => self.write(batch.put(self.physical(key), raw)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            match previous_entry {
                Some(entry) => index.insert(key, entry.fingerprint),
                None => {
                    index.remove(key);
                }
            }
            return Err(e);
        }

        tracing::trace!(instance = %self.instance_name, key, %fingerprint, "local set");
        Ok(fingerprint)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        validate_user_key(key)?;
        let physical = self.physical(key);
        let mut index = self.index.lock().await;
        if self.backend.get(&physical)?.is_none() && !index.contains(key) {
            return Ok(());
        }

        let previous_entry = index.remove(key);
        let written = match self.index_batch(&index) {
            Ok(batch) => self.write(batch.delete(physical)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Some(entry) = previous_entry {
                index.insert(key, entry.fingerprint);
            }
            return Err(e);
        }

        tracing::trace!(instance = %self.instance_name, key, "local remove");
        Ok(())
    }

    async fn meta_index(&self) -> Result<MetaIndex> {
        Ok(self.index.lock().await.clone())
    }
}

#[async_trait]
impl<B: Backend + 'static> LocalStorage for LocalStore<B> {
    fn as_storage(&self) -> &dyn AsyncStorage {
        self
    }

    fn get_sync(&self, key: &str) -> Result<Option<Value>> {
        validate_user_key(key)?;
        self.read(key)
    }

    fn load_reserved(&self, key: &str) -> Result<Option<Value>> {
        debug_assert!(is_reserved(key));
        match self.backend.get(&self.physical(key))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_reserved(&self, key: &str, value: &Value) -> Result<()> {
        if !is_reserved(key) || key == META_KEY {
            return Err(Error::InvalidKey(key.to_string()));
        }
        let raw = serde_json::to_string(value)?;
        self.write(WriteBatch::new().put(self.physical(key), raw)).await
    }
}
