//! Scheduling port for background queue draining.
//!
//! A drain never runs commits back to back on the caller's task. Before each
//! commit it asks a [`Scheduler`] for a low-priority slice; the slice says
//! whether the host got around to it in time. A late slice is not a failure:
//! the drain yields and asks again, and after
//! [`MAX_CONSECUTIVE_PREEMPTIONS`](crate::queue::MAX_CONSECUTIVE_PREEMPTIONS)
//! late slices in a row it runs the next commit regardless.

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Default deadline for a slice to be granted.
pub const DEFAULT_SLICE_TIMEOUT: Duration = Duration::from_secs(1);

/// Shortest slice deadline a scheduler accepts. Anything below cannot be
/// met by a yield and would report every slice as late.
pub const MIN_SLICE_TIMEOUT: Duration = Duration::from_millis(1);

/// A granted scheduling slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    did_timeout: bool,
}

impl Slice {
    /// A slice granted within its deadline.
    pub fn granted() -> Self {
        Self { did_timeout: false }
    }

    /// A slice that arrived after its deadline; the work must be resubmitted.
    pub fn preempted() -> Self {
        Self { did_timeout: true }
    }

    /// Whether the deadline was exceeded before the slice was granted.
    pub fn did_timeout(&self) -> bool {
        self.did_timeout
    }
}

/// Hands out low-priority slices of execution time.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Wait until the host can spare a slice for one unit of work.
    async fn next_slice(&self) -> Slice;
}

/// Yields to the tokio runtime before every unit of work.
///
/// Other ready tasks on the worker run first. If it takes longer than the
/// timeout to be polled again the runtime is saturated and the slice is
/// reported as preempted.
#[derive(Debug, Clone, Copy)]
pub struct IdleScheduler {
    timeout: Duration,
}

impl IdleScheduler {
    /// Create a scheduler with the given slice deadline, raised to at least
    /// [`MIN_SLICE_TIMEOUT`].
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: timeout.max(MIN_SLICE_TIMEOUT),
        }
    }

    /// The slice deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for IdleScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SLICE_TIMEOUT)
    }
}

#[async_trait]
impl Scheduler for IdleScheduler {
    async fn next_slice(&self) -> Slice {
        let requested = Instant::now();
        tokio::task::yield_now().await;
        if requested.elapsed() > self.timeout {
            Slice::preempted()
        } else {
            Slice::granted()
        }
    }
}

/// Grants every slice immediately without yielding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

#[async_trait]
impl Scheduler for ImmediateScheduler {
    async fn next_slice(&self) -> Slice {
        Slice::granted()
    }
}
