//! The storage contract and its reference implementations.
//!
//! The sync layer only ever talks to stores through [`AsyncStorage`] (and
//! [`LocalStorage`] for the local side). Two implementations ship with the
//! crate:
//!
//! - [`LocalStore`]: a persistent map namespaced per instance, keeping its
//!   metadata index next to the values.
//! - [`ObjectStoreStorage`]: an adapter over any paginated object store
//!   exposing etags, with [`MemoryObjectClient`] as an in-process bucket.

mod backend;
mod local;
mod memory_object;
mod remote;

pub use backend::{Backend, FileBackend, MemoryBackend, WriteBatch};
pub use local::LocalStore;
pub use memory_object::MemoryObjectClient;
pub use remote::{
    ListPage, ObjectClient, ObjectError, ObjectStoreStorage, ObjectSummary, DEFAULT_PAGE_SIZE,
    OBJECT_SUFFIX,
};

use crate::{error::Result, Error, Fingerprint, Key, MetaIndex, Value};
use async_trait::async_trait;

/// Prefix of the key namespace reserved for store-internal state.
pub const RESERVED_PREFIX: char = '@';

/// Reserved key holding the serialized metadata index.
pub const META_KEY: &str = "@meta";

/// Reserved key under which a commit queue persists its pending tasks.
pub fn queue_key(queue_name: &str) -> String {
    format!("@queue/{queue_name}/tasks")
}

/// Check whether a key belongs to the reserved namespace.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Reject keys the user API must never accept.
pub fn validate_user_key(key: &str) -> Result<()> {
    if key.is_empty() || key.chars().any(char::is_control) {
        return Err(Error::InvalidKey(key.to_string()));
    }
    if is_reserved(key) {
        return Err(Error::ReservedKey(key.to_string()));
    }
    Ok(())
}

/// Capability set shared by local and remote stores.
///
/// Every method may be called concurrently with itself on one instance.
#[async_trait]
pub trait AsyncStorage: Send + Sync {
    /// Name of this store instance; used to namespace physical keys.
    fn instance_name(&self) -> &str;

    /// Read a value. A missing key is `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value and its index entry atomically, returning the new
    /// fingerprint.
    async fn set(&self, key: &str, value: Value) -> Result<Fingerprint>;

    /// Remove a value and its index entry. Removing a missing key is not an
    /// error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Snapshot of the store's metadata index.
    async fn meta_index(&self) -> Result<MetaIndex>;

    /// Read a value, falling back to `default` when the key is missing.
    async fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// All keys in the store, in index order.
    async fn keys(&self) -> Result<Vec<Key>> {
        Ok(self.meta_index().await?.keys().cloned().collect())
    }
}

/// Extra capabilities required of the local side.
#[async_trait]
pub trait LocalStorage: AsyncStorage {
    /// View this store through the plain storage contract.
    fn as_storage(&self) -> &dyn AsyncStorage;

    /// Synchronous read, used to bootstrap state at construction time.
    fn get_sync(&self, key: &str) -> Result<Option<Value>>;

    /// Synchronously read a reserved key. Never consults the index.
    fn load_reserved(&self, key: &str) -> Result<Option<Value>>;

    /// Persist a reserved key. The metadata index is left untouched, so
    /// internal state never takes part in reconciliation.
    async fn save_reserved(&self, key: &str, value: &Value) -> Result<()>;
}
