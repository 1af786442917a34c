//! Persistent FIFO of commits, drained one at a time in the background.
//!
//! The queue persists its full contents under a reserved key of the local
//! store after every enqueue and dequeue, so pending commits survive a
//! restart. A commit leaves the queue only after its handler succeeded;
//! a failure stops the drain and leaves the commit at the head for the
//! next run. Delivery is therefore at least once.

use crate::observer::{SyncEvent, SyncObserver, TracingObserver};
use crate::schedule::{IdleScheduler, Scheduler};
use crate::storage::{queue_key, LocalStorage};
use crate::{error::Result, Commit, Error, Value};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Late slices tolerated in a row before the next commit runs anyway.
pub const MAX_CONSECUTIVE_PREEMPTIONS: usize = 8;

/// Applies commits taken from a [`CommitQueue`].
#[async_trait]
pub trait CommitHandler: Send + Sync {
    /// Apply one commit. An error keeps it at the head of the queue.
    async fn apply(&self, commit: &Commit) -> Result<()>;

    /// Called after `apply` failed and the drain has stopped.
    async fn on_failure(&self, _commit: &Commit, _error: &Error) {}
}

/// A named, persistent commit queue.
///
/// Cloning is cheap and yields a handle to the same queue.
#[derive(Clone)]
pub struct CommitQueue {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    storage_key: String,
    local: Arc<dyn LocalStorage>,
    handler: Arc<dyn CommitHandler>,
    scheduler: Arc<dyn Scheduler>,
    observer: Arc<dyn SyncObserver>,
    tasks: Mutex<VecDeque<Commit>>,
    running: AtomicBool,
}

impl CommitQueue {
    /// Open the queue `name`, restoring whatever was persisted for it.
    pub fn new(
        name: impl Into<String>,
        local: Arc<dyn LocalStorage>,
        handler: Arc<dyn CommitHandler>,
    ) -> Result<Self> {
        Self::with_hooks(
            name,
            local,
            handler,
            Arc::new(IdleScheduler::default()),
            Arc::new(TracingObserver),
        )
    }

    /// Open the queue with an explicit scheduler and observer.
    pub fn with_hooks(
        name: impl Into<String>,
        local: Arc<dyn LocalStorage>,
        handler: Arc<dyn CommitHandler>,
        scheduler: Arc<dyn Scheduler>,
        observer: Arc<dyn SyncObserver>,
    ) -> Result<Self> {
        let name = name.into();
        let storage_key = queue_key(&name);
        let tasks: VecDeque<Commit> = match local.load_reserved(&storage_key)? {
            Some(persisted) => serde_json::from_value(persisted)?,
            None => VecDeque::new(),
        };
        if !tasks.is_empty() {
            tracing::info!(queue = %name, pending = tasks.len(), "restored pending commits");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                storage_key,
                local,
                handler,
                scheduler,
                observer,
                tasks: Mutex::new(tasks),
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Name of the queue.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether a drain currently owns the queue.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of pending commits.
    pub async fn len(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }

    /// Check if nothing is pending.
    pub async fn is_empty(&self) -> bool {
        self.inner.tasks.lock().await.is_empty()
    }

    /// The commit that will be delivered next.
    pub async fn peek(&self) -> Option<Commit> {
        self.inner.tasks.lock().await.front().cloned()
    }

    /// All pending commits in delivery order.
    pub async fn snapshot(&self) -> Vec<Commit> {
        self.inner.tasks.lock().await.iter().cloned().collect()
    }

    /// Append a commit and persist the queue.
    ///
    /// With `auto_run`, a background drain is started on the current tokio
    /// runtime; the call returns without waiting for it.
    pub async fn enqueue(&self, commit: Commit, auto_run: bool) -> Result<()> {
        {
            let mut tasks = self.inner.tasks.lock().await;
            tasks.push_back(commit);
            if let Err(e) = self.persist(&tasks).await {
                tasks.pop_back();
                return Err(e);
            }
        }

        if auto_run {
            self.spawn_run();
        }
        Ok(())
    }

    /// Remove the head commit and persist the queue.
    pub async fn dequeue(&self) -> Result<Option<Commit>> {
        let mut tasks = self.inner.tasks.lock().await;
        let Some(head) = tasks.pop_front() else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&tasks).await {
            tasks.push_front(head);
            return Err(e);
        }
        Ok(Some(head))
    }

    /// Drain the queue until it is empty or a commit fails.
    ///
    /// Returns immediately if another drain already owns the queue. On
    /// failure the handler's `on_failure` runs and the error is returned;
    /// the failed commit stays queued.
    pub async fn run(&self) -> Result<()> {
        loop {
            if self.is_empty().await || !self.try_acquire() {
                return Ok(());
            }

            let outcome = self.drain().await;
            self.inner.running.store(false, Ordering::SeqCst);

            if let Err((commit, error)) = outcome {
                self.inner.handler.on_failure(&commit, &error).await;
                self.inner.observer.on_event(&SyncEvent::CommitFailed {
                    commit: &commit,
                    error: &error,
                });
                return Err(error);
            }
            // Commits enqueued after the drain saw an empty queue but before
            // it released ownership are picked up by the next iteration.
        }
    }

    fn try_acquire(&self) -> bool {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn drain(&self) -> std::result::Result<usize, (Commit, Error)> {
        let queue = self.name();
        self.inner.observer.on_event(&SyncEvent::DrainStarted {
            queue,
            pending: self.len().await,
        });

        let mut delivered = 0;
        let mut preempted = 0;
        loop {
            if preempted < MAX_CONSECUTIVE_PREEMPTIONS
                && self.inner.scheduler.next_slice().await.did_timeout()
            {
                preempted += 1;
                self.inner.observer.on_event(&SyncEvent::DrainYielded { queue });
                continue;
            }
            preempted = 0;

            let Some(commit) = self.peek().await else {
                break;
            };
            if let Err(e) = self.inner.handler.apply(&commit).await {
                return Err((commit, e));
            }
            self.inner
                .observer
                .on_event(&SyncEvent::CommitApplied { commit: &commit });

            // The commit has been applied; if removing it fails it is
            // delivered again on the next run.
            if let Err(e) = self.dequeue().await {
                return Err((commit, e));
            }
            delivered += 1;
        }

        self.inner
            .observer
            .on_event(&SyncEvent::DrainFinished { queue, delivered });
        Ok(delivered)
    }

    fn spawn_run(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue = self.clone();
                handle.spawn(async move {
                    if let Err(e) = queue.run().await {
                        tracing::warn!(queue = %queue.name(), error = %e, "background drain stopped");
                    }
                });
            }
            Err(_) => tracing::warn!(
                queue = %self.name(),
                "no tokio runtime, commit stays queued until the next run"
            ),
        }
    }

    async fn persist(&self, tasks: &VecDeque<Commit>) -> Result<()> {
        let value: Value = serde_json::to_value(tasks)?;
        self.inner
            .local
            .save_reserved(&self.inner.storage_key, &value)
            .await
    }
}

impl std::fmt::Debug for CommitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitQueue")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
