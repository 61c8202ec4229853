use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::exec::{Executor, ExecutorId, enter};
use crate::suspend::Continuation;

thread_local! {
    /// Set on threads owned by the process-wide default pool. Basis of the
    /// "already on a default-pool worker" affinity fast path: any default
    /// worker qualifies, not just an exact executor-identity match.
    static IS_DEFAULT_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` on threads owned by the default pool.
pub(crate) fn on_default_worker() -> bool {
    IS_DEFAULT_WORKER.with(|c| c.get())
}

/// Work queue shared between the pool handle and its workers.
#[derive(Debug)]
struct PoolState {
    items: VecDeque<Continuation>,
    shutdown: bool,
}

#[derive(Debug)]
struct PoolShared {
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Minimal fixed-size worker pool.
///
/// Exists so the crate is usable without an external runtime; it is the
/// substrate behind [`default_pool`](super::default_pool) and a convenient
/// second executor in tests. Workers announce their identity with
/// [`enter`](super::enter), run items in FIFO order per the shared queue,
/// and exit once the pool handle is dropped and the queue drains.
#[derive(Debug)]
pub struct BackgroundPool {
    shared: Arc<PoolShared>,
    id: ExecutorId,
}

impl BackgroundPool {
    /// Starts a pool with `workers` threads.
    pub fn new(workers: usize) -> Self {
        Self::start(workers, false)
    }

    /// Starts the process-wide default pool; its workers additionally set
    /// the default-worker thread flag.
    pub(crate) fn start_default(workers: usize) -> Self {
        Self::start(workers, true)
    }

    fn start(workers: usize, default: bool) -> Self {
        assert!(workers > 0, "a pool needs at least one worker");

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                items: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });
        let id = ExecutorId::next();

        for n in 0..workers {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("repose-pool-{}-{n}", if default { "default" } else { "aux" }))
                .spawn(move || Self::worker(shared, id, default))
                .expect("failed to spawn pool worker");
        }

        BackgroundPool { shared, id }
    }

    fn worker(shared: Arc<PoolShared>, id: ExecutorId, default: bool) {
        let _enter = enter(id);
        if default {
            IS_DEFAULT_WORKER.with(|c| c.set(true));
        }

        loop {
            let work = {
                let mut state = shared
                    .state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                loop {
                    if let Some(work) = state.items.pop_front() {
                        break work;
                    }
                    if state.shutdown {
                        return;
                    }
                    state = shared
                        .available
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            };

            work.run();
        }
    }
}

impl Executor for BackgroundPool {
    fn enqueue(&self, work: Continuation) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        state.items.push_back(work);
        self.shared.available.notify_one();
    }

    fn id(&self) -> ExecutorId {
        self.id
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        state.shutdown = true;
        self.shared.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn enqueued_work_runs_on_a_marked_worker() {
        let pool = BackgroundPool::new(2);
        let (tx, rx) = mpsc::channel();

        let id = pool.id();
        pool.enqueue(Continuation::detached(move || {
            tx.send(crate::exec::current()).unwrap();
        }));

        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, Some(id));
    }

    #[test]
    fn default_pool_workers_set_the_thread_flag() {
        let (tx, rx) = mpsc::channel();
        crate::exec::default_pool().enqueue(Continuation::detached(move || {
            tx.send(on_default_worker()).unwrap();
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!on_default_worker());
    }

    #[test]
    fn items_enqueued_before_drop_still_run() {
        let (tx, rx) = mpsc::channel();
        {
            let pool = BackgroundPool::new(1);
            for i in 0..16 {
                let tx = tx.clone();
                pool.enqueue(Continuation::detached(move || {
                    tx.send(i).unwrap();
                }));
            }
        }
        drop(tx);
        let got: Vec<i32> = rx.iter().collect();
        assert_eq!(got, (0..16).collect::<Vec<_>>());
    }
}
