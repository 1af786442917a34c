//! Bidirectional synchronization between a local and a remote store.
//!
//! Local changes travel to the remote through the persistent commit queue
//! (push). Remote changes are discovered by diffing the two metadata indexes
//! and applied to the local store as patches (pull). A full synchronization
//! pulls first so that remote changes land before local edits are replayed.
//!
//! When both sides changed a key since the last synchronization, the pull
//! copies the remote value over the local one before the push runs: the
//! remote wins for concurrent edits.

use crate::config::SyncConfig;
use crate::observer::{SyncEvent, SyncObserver, TracingObserver};
use crate::queue::{CommitHandler, CommitQueue};
use crate::reconcile::diff;
use crate::schedule::{IdleScheduler, Scheduler};
use crate::storage::{AsyncStorage, LocalStorage};
use crate::{error::Result, Commit, Error, Target};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Constructed, never synchronized
    Initialized,
    /// A synchronization is in progress
    Synchronizing,
    /// The last synchronization succeeded
    Synchronized,
    /// The last synchronization failed
    Failed,
}

impl SyncState {
    /// Whether no synchronization is in flight.
    pub fn is_settled(self) -> bool {
        !matches!(self, SyncState::Synchronizing)
    }
}

/// The two stores a commit is applied against.
///
/// A commit's `target` is the store being mutated; the other store is the
/// source of values for `set` and `update`.
pub struct StorePair {
    local: Arc<dyn LocalStorage>,
    remote: Arc<dyn AsyncStorage>,
}

impl StorePair {
    pub fn new(local: Arc<dyn LocalStorage>, remote: Arc<dyn AsyncStorage>) -> Self {
        Self { local, remote }
    }

    /// The local store.
    pub fn local(&self) -> &Arc<dyn LocalStorage> {
        &self.local
    }

    /// The remote store.
    pub fn remote(&self) -> &Arc<dyn AsyncStorage> {
        &self.remote
    }

    fn store(&self, target: Target) -> &dyn AsyncStorage {
        match target {
            Target::Local => self.local.as_storage(),
            Target::Remote => self.remote.as_ref(),
        }
    }

    /// Apply a single commit.
    ///
    /// - `set` writes the carried value to the source, then the target.
    /// - `update` copies the source's current value into the target; if the
    ///   source no longer holds the key it is a no-op.
    /// - `remove` deletes the key from both stores.
    pub async fn apply(&self, commit: &Commit) -> Result<()> {
        let target = self.store(commit.target());
        let source = self.store(commit.target().opposite());

        match commit {
            Commit::Set(c) => {
                source.set(&c.key, c.value.clone()).await?;
                target.set(&c.key, c.value.clone()).await?;
            }
            Commit::Update(c) => match source.get(&c.key).await? {
                Some(value) => {
                    target.set(&c.key, value).await?;
                }
                None => tracing::debug!(key = %c.key, "source value gone, skipping update"),
            },
            Commit::Remove(c) => {
                target.remove(&c.key).await?;
                source.remove(&c.key).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommitHandler for StorePair {
    async fn apply(&self, commit: &Commit) -> Result<()> {
        StorePair::apply(self, commit).await
    }

    async fn on_failure(&self, commit: &Commit, error: &Error) {
        tracing::warn!(
            key = %commit.key(),
            kind = commit.kind(),
            error = %error,
            "push stopped; commit stays queued"
        );
    }
}

/// Keeps a local store and a remote store in step.
pub struct Synchronizer {
    pair: Arc<StorePair>,
    queue: CommitQueue,
    observer: Arc<dyn SyncObserver>,
    state: watch::Sender<SyncState>,
}

impl Synchronizer {
    /// Create a synchronizer with the default scheduler and observer.
    pub fn new(
        local: Arc<dyn LocalStorage>,
        remote: Arc<dyn AsyncStorage>,
        config: &SyncConfig,
    ) -> Result<Self> {
        Self::with_hooks(
            local,
            remote,
            config,
            Arc::new(IdleScheduler::new(config.slice_timeout)),
            Arc::new(TracingObserver),
        )
    }

    /// Create a synchronizer with an explicit scheduler and observer.
    ///
    /// The commit queue is named after the config's instance name and
    /// restored from the local store.
    pub fn with_hooks(
        local: Arc<dyn LocalStorage>,
        remote: Arc<dyn AsyncStorage>,
        config: &SyncConfig,
        scheduler: Arc<dyn Scheduler>,
        observer: Arc<dyn SyncObserver>,
    ) -> Result<Self> {
        let pair = Arc::new(StorePair::new(local.clone(), remote));
        let queue = CommitQueue::with_hooks(
            config.instance_name.clone(),
            local,
            pair.clone(),
            scheduler,
            observer.clone(),
        )?;
        let (state, _) = watch::channel(SyncState::Initialized);

        Ok(Self {
            pair,
            queue,
            observer,
            state,
        })
    }

    /// The store pair commits are applied against.
    pub fn stores(&self) -> &StorePair {
        &self.pair
    }

    /// The queue of local changes waiting to be pushed.
    pub fn queue(&self) -> &CommitQueue {
        &self.queue
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Record a local change for the next push.
    ///
    /// With `auto_push` a background push starts right away.
    pub async fn commit_local_change(&self, commit: Commit, auto_push: bool) -> Result<()> {
        self.queue.enqueue(commit, auto_push).await
    }

    /// Bring remote changes into the local store.
    ///
    /// Diffs the two indexes and applies one patch per differing key.
    /// Returns the number of patches applied. Stops at the first failing
    /// patch; the remaining differences are found again next time.
    pub async fn pull(&self) -> Result<usize> {
        let remote_index = self.pair.remote.meta_index().await?;
        let local_index = self.pair.local.meta_index().await?;

        let patches = diff(&local_index, &remote_index);
        self.observer
            .on_event(&SyncEvent::PatchesComputed { patches: &patches });

        for patch in &patches {
            let commit = Commit::from(patch.clone());
            self.pair.apply(&commit).await?;
            self.observer
                .on_event(&SyncEvent::CommitApplied { commit: &commit });
        }
        Ok(patches.len())
    }

    /// Replay pending local changes against the remote.
    pub async fn push(&self) -> Result<()> {
        self.queue.run().await
    }

    /// Pull, then push. Errors are logged and reflected in the state.
    pub async fn synchronize(&self) -> SyncState {
        self.transition(SyncState::Synchronizing);

        let outcome = match self.pull().await {
            Ok(pulled) => {
                tracing::debug!(pulled, "pull complete");
                self.push().await
            }
            Err(e) => Err(e),
        };

        let state = match outcome {
            Ok(()) => SyncState::Synchronized,
            Err(e) => {
                tracing::error!(
                    instance = %self.pair.local.instance_name(),
                    error = %e,
                    "synchronization failed"
                );
                SyncState::Failed
            }
        };
        self.transition(state);
        state
    }

    fn transition(&self, state: SyncState) {
        self.state.send_replace(state);
        self.observer.on_event(&SyncEvent::StateChanged { state });
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("queue", &self.queue)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
