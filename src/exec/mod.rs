//! Executor substrate the suspension primitives sit on.
//!
//! The crate does not bring a scheduler of its own; it consumes one through
//! [`Executor`]: an infallible work-item sink with a comparable identity.
//! What lives here is the glue an awaitable needs to reason about executors:
//!
//! - a thread-local record of which executor is running the current thread,
//!   maintained by worker threads through [`enter`];
//! - [`BackgroundPool`], a minimal fixed-size pool serving as the
//!   process-wide [`default_pool`], so the crate works stand-alone;
//! - [`block_on`], a thread-parking single-future executor for tests, demos,
//!   and synchronous edges;
//! - [`DispatchContext`] and [`MessageLoop`], the single-threaded posting
//!   target used by the context-affinity awaitable.

use std::cell::Cell;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::suspend::Continuation;

mod block_on;
pub use block_on::block_on;

mod context;
pub use context::{DispatchContext, MessageLoop};

mod pool;
pub use pool::BackgroundPool;
pub(crate) use pool::on_default_worker;

/// Identity of an [`Executor`], compared by allocation, not behavior.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ExecutorId(u64);

impl ExecutorId {
    /// Allocates a fresh, process-unique identity.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        ExecutorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A pool of workers that can run enqueued work items.
///
/// The contract is deliberately small: `enqueue` is infallible and gives no
/// ordering guarantee beyond "eventually runs", and `id` identifies the
/// executor for affinity tests. Implementors whose workers should satisfy
/// executor-affinity fast paths must call [`enter`] on each worker thread.
pub trait Executor: Send + Sync {
    /// Submits a work item. Must not block and must not fail.
    fn enqueue(&self, work: Continuation);

    /// This executor's identity.
    fn id(&self) -> ExecutorId;
}

thread_local! {
    /// Identity of the executor driving the current thread, if any. Set by
    /// worker threads via [`enter`]; read by affinity fast paths.
    static CURRENT_EXECUTOR: Cell<Option<ExecutorId>> = const { Cell::new(None) };
}

/// Returns the identity of the executor running the current thread, if the
/// thread announced one via [`enter`].
pub fn current() -> Option<ExecutorId> {
    CURRENT_EXECUTOR.with(|c| c.get())
}

/// Marks the current thread as a worker of `id` until the returned guard is
/// dropped. Nested calls restore the previous identity on drop.
#[must_use = "dropping the guard immediately clears the executor identity"]
pub fn enter(id: ExecutorId) -> EnterGuard {
    let previous = CURRENT_EXECUTOR.with(|c| c.replace(Some(id)));
    EnterGuard { previous }
}

/// Restores the previously announced executor identity on drop.
#[derive(Debug)]
pub struct EnterGuard {
    previous: Option<ExecutorId>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_EXECUTOR.with(|c| c.set(previous));
    }
}

/// The process-wide default [`BackgroundPool`], started on first use.
///
/// Sized to `std::thread::available_parallelism`, minimum two workers so
/// pool-to-pool handoffs cannot self-deadlock on a single busy worker.
pub fn default_pool() -> &'static BackgroundPool {
    static DEFAULT_POOL: OnceLock<BackgroundPool> = OnceLock::new();
    DEFAULT_POOL.get_or_init(|| {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get().max(2))
            .unwrap_or(2);
        BackgroundPool::start_default(workers)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_guard_restores_previous_identity() {
        assert_eq!(current(), None);
        let outer = ExecutorId::next();
        let inner = ExecutorId::next();
        {
            let _a = enter(outer);
            assert_eq!(current(), Some(outer));
            {
                let _b = enter(inner);
                assert_eq!(current(), Some(inner));
            }
            assert_eq!(current(), Some(outer));
        }
        assert_eq!(current(), None);
    }

    #[test]
    fn executor_ids_are_unique() {
        assert_ne!(ExecutorId::next(), ExecutorId::next());
    }
}
