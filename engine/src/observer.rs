//! Lifecycle hooks for the commit queue and synchronizer.

use crate::{Commit, Error, Patch, SyncState};

/// Something that happened inside the sync machinery.
#[derive(Debug)]
pub enum SyncEvent<'a> {
    /// A drain took ownership of the queue.
    DrainStarted { queue: &'a str, pending: usize },
    /// A slice arrived late; the drain is resubmitting itself.
    DrainYielded { queue: &'a str },
    /// The queue ran dry.
    DrainFinished { queue: &'a str, delivered: usize },
    /// Reconciliation produced its patch list.
    PatchesComputed { patches: &'a [Patch] },
    /// A commit was applied to the store pair.
    CommitApplied { commit: &'a Commit },
    /// A commit failed and stays at the head of its queue.
    CommitFailed { commit: &'a Commit, error: &'a Error },
    /// The synchronizer moved to a new state.
    StateChanged { state: SyncState },
}

/// Receives [`SyncEvent`]s. Implementations must be cheap and must not block.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent<'_>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn on_event(&self, _event: &SyncEvent<'_>) {}
}

/// Forwards events to `tracing` (the default observer).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent<'_>) {
        match event {
            SyncEvent::DrainStarted { queue, pending } => {
                tracing::debug!(queue = %queue, pending, "drain started")
            }
            SyncEvent::DrainYielded { queue } => {
                tracing::trace!(queue = %queue, "slice preempted, yielding")
            }
            SyncEvent::DrainFinished { queue, delivered } => {
                tracing::debug!(queue = %queue, delivered, "drain finished")
            }
            SyncEvent::PatchesComputed { patches } => {
                tracing::info!(count = patches.len(), "computed patches")
            }
            SyncEvent::CommitApplied { commit } => tracing::debug!(
                kind = commit.kind(),
                key = %commit.key(),
                target = ?commit.target(),
                reason = ?commit.reason(),
                "commit applied"
            ),
            SyncEvent::CommitFailed { commit, error } => tracing::warn!(
                kind = commit.kind(),
                key = %commit.key(),
                target = ?commit.target(),
                error = %error,
                "commit failed"
            ),
            SyncEvent::StateChanged { state } => {
                tracing::info!(state = ?state, "sync state changed")
            }
        }
    }
}
