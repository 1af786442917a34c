//! # Hybrid Engine
//!
//! An offline-first JSON key-value store that keeps a local store and a
//! remote object store in sync.
//!
//! Reads and writes always hit the local store. Local changes are recorded
//! as commits in a persistent queue and replayed against the remote in the
//! background; remote changes are discovered by comparing metadata indexes
//! and applied locally.
//!
//! ## Core Concepts
//!
//! ### Storage Contract
//!
//! Every store implements [`AsyncStorage`]: `get`, `set`, `remove` and a
//! [`MetaIndex`] mapping each key to a content fingerprint. The local side
//! additionally implements [`LocalStorage`], which can persist internal
//! state under the reserved `@` namespace without it ever showing up in the
//! index.
//!
//! ### Commits and Patches
//!
//! A [`Commit`] is a queued intent to mutate one store of the pair:
//! - [`Commit::Set`] - write a carried value
//! - [`Commit::Update`] - copy the current value from the other store
//! - [`Commit::Remove`] - delete from both stores
//!
//! A [`Patch`] is what reconciliation produces; every patch converts into a
//! commit targeting the local store.
//!
//! ### Reconciliation
//!
//! [`diff`] compares a local and a remote index and returns one patch per
//! differing key. Fingerprint inequality is the only conflict signal, and
//! the remote always wins.
//!
//! ### Commit Queue
//!
//! The [`CommitQueue`] persists pending commits and drains them one at a
//! time, in order, at most one drain at a time. A failed commit stays at the
//! head until the next [`CommitQueue::run`].
//!
//! ## Quick Start
//!
//! ```rust
//! use hybrid_engine::{
//!     AsyncStorage, HybridStorage, LocalStore, MemoryObjectClient, SyncConfig, SyncState,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> hybrid_engine::Result<()> {
//! // 1. Configure an instance
//! let config = SyncConfig::new("notes").with_auto_push(false);
//!
//! // 2. Combine a local store with an object store
//! let storage = HybridStorage::with_object_store(
//!     Arc::new(LocalStore::in_memory("notes")),
//!     MemoryObjectClient::new(),
//!     &config,
//! )?;
//!
//! // 3. Write locally
//! storage.set("todo", json!({"title": "write docs"})).await?;
//! assert_eq!(storage.get("todo").await?, Some(json!({"title": "write docs"})));
//!
//! // 4. Synchronize with the remote
//! assert_eq!(storage.synchronize().await, SyncState::Synchronized);
//! # Ok(())
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(demo()).unwrap();
//! ```
//!
//! ## Persistence
//!
//! [`LocalStore`] runs over a [`Backend`]: [`MemoryBackend`] for tests or
//! [`FileBackend`] for a single JSON file on disk. The commit queue lives in
//! the same backend, so pending changes survive a restart.

pub mod codec;
pub mod commit;
pub mod config;
pub mod error;
pub mod hybrid;
pub mod meta;
pub mod observer;
pub mod queue;
pub mod reconcile;
pub mod schedule;
pub mod storage;
pub mod sync;

// Re-export main types at crate root
pub use codec::{Codec, Fingerprinter, JsonCodec};
pub use commit::{Commit, Patch, Reason, RemoveCommit, SetCommit, Staging, Target, UpdateCommit};
pub use config::{ConfigError, SyncConfig};
pub use error::{Error, Result};
pub use hybrid::HybridStorage;
pub use meta::{MetaEntry, MetaIndex};
pub use observer::{NoopObserver, SyncEvent, SyncObserver, TracingObserver};
pub use queue::{CommitHandler, CommitQueue};
pub use reconcile::{apply_to_index, diff};
pub use schedule::{IdleScheduler, ImmediateScheduler, Scheduler, Slice};
pub use storage::{
    AsyncStorage, Backend, FileBackend, LocalStorage, LocalStore, MemoryBackend,
    MemoryObjectClient, ObjectClient, ObjectError, ObjectStoreStorage, WriteBatch,
};
pub use sync::{StorePair, SyncState, Synchronizer};

/// Type aliases for clarity
pub type Key = String;
pub type Fingerprint = String;
pub type Value = serde_json::Value;
