//! Offline-first storage facade.

use crate::config::SyncConfig;
use crate::storage::{AsyncStorage, LocalStorage, ObjectClient, ObjectStoreStorage};
use crate::sync::{SyncState, Synchronizer};
use crate::{error::Result, Commit, Fingerprint, MetaIndex, Value};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A store that reads and writes locally and keeps a remote in sync.
///
/// Reads never touch the network. Writes land in the local store first and
/// are then queued for the remote; with `auto_push` the queue drains in the
/// background right away, otherwise on the next [`synchronize`].
///
/// [`synchronize`]: HybridStorage::synchronize
pub struct HybridStorage {
    local: Arc<dyn LocalStorage>,
    synchronizer: Synchronizer,
    auto_push: bool,
}

impl HybridStorage {
    /// Combine a local and a remote store.
    pub fn new(
        local: Arc<dyn LocalStorage>,
        remote: Arc<dyn AsyncStorage>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let synchronizer = Synchronizer::new(local.clone(), remote, config)?;
        Ok(Self::from_synchronizer(local, synchronizer, config.auto_push))
    }

    /// Combine a local store with an object store client.
    pub fn with_object_store<C: ObjectClient + 'static>(
        local: Arc<dyn LocalStorage>,
        client: C,
        config: &SyncConfig,
    ) -> Result<Self> {
        let remote = ObjectStoreStorage::new(config.instance_name.clone(), client)
            .with_page_size(config.page_size);
        Self::new(local, Arc::new(remote), config)
    }

    /// Wrap an already configured synchronizer over `local`.
    pub fn from_synchronizer(
        local: Arc<dyn LocalStorage>,
        synchronizer: Synchronizer,
        auto_push: bool,
    ) -> Self {
        Self {
            local,
            synchronizer,
            auto_push,
        }
    }

    /// The synchronizer behind this store.
    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Run a full synchronization.
    pub async fn synchronize(&self) -> SyncState {
        self.synchronizer.synchronize().await
    }

    /// Start a synchronization in the background.
    pub fn spawn_synchronize(self: &Arc<Self>) -> JoinHandle<SyncState> {
        let storage = Arc::clone(self);
        tokio::spawn(async move { storage.synchronize().await })
    }

    /// Current synchronization state.
    pub fn sync_state(&self) -> SyncState {
        self.synchronizer.state()
    }

    /// Synchronous local read.
    pub fn get_sync(&self, key: &str) -> Result<Option<Value>> {
        self.local.get_sync(key)
    }
}

#[async_trait]
impl AsyncStorage for HybridStorage {
    fn instance_name(&self) -> &str {
        self.local.instance_name()
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.local.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<Fingerprint> {
        let fingerprint = self.local.set(key, value.clone()).await?;
        self.synchronizer
            .commit_local_change(Commit::local_write(key, value), self.auto_push)
            .await?;
        Ok(fingerprint)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.local.remove(key).await?;
        self.synchronizer
            .commit_local_change(Commit::local_delete(key), self.auto_push)
            .await
    }

    async fn meta_index(&self) -> Result<MetaIndex> {
        self.local.meta_index().await
    }
}

impl std::fmt::Debug for HybridStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridStorage")
            .field("instance", &self.instance_name())
            .field("auto_push", &self.auto_push)
            .field("synchronizer", &self.synchronizer)
            .finish()
    }
}
