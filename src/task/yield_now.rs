use std::future::IntoFuture;

use crate::exec::{Executor, default_pool};
use crate::suspend::{Await, Continuation, Suspend};

/// Awaitable that unconditionally suspends once.
///
/// A deterministic yield point: the awaiter is never ready, so the caller
/// always gives up its current tick. By default the continuation fires
/// immediately (the yield primitive of the surrounding runtime; the task is
/// rescheduled wherever it normally resumes). With
/// [`via_pool`](YieldNow::via_pool) the continuation is instead enqueued on
/// the default pool, forcing the resumption signal off the current context
/// entirely.
pub fn yield_now() -> YieldNow {
    YieldNow {
        continue_on_current: true,
        detach: false,
    }
}

/// Configuration value for a forced yield. See [`yield_now`].
#[derive(Debug, Clone)]
pub struct YieldNow {
    continue_on_current: bool,
    detach: bool,
}

impl YieldNow {
    /// Dispatches the resumption from a default-pool worker instead of the
    /// current context.
    pub fn via_pool(mut self) -> Self {
        self.continue_on_current = false;
        self
    }

    /// Skips ambient-scope propagation into the continuation.
    pub fn detach_scope(mut self) -> Self {
        self.detach = true;
        self
    }

    /// Produces the single-use awaiter for this yield.
    pub fn suspend(&self) -> YieldAwaiter {
        YieldAwaiter {
            continue_on_current: self.continue_on_current,
        }
    }
}

impl IntoFuture for YieldNow {
    type Output = ();
    type IntoFuture = Await<YieldAwaiter>;

    fn into_future(self) -> Self::IntoFuture {
        let detach = self.detach;
        Await::with_policy(self.suspend(), detach)
    }
}

/// Live suspension point for one forced yield.
#[derive(Debug)]
pub struct YieldAwaiter {
    continue_on_current: bool,
}

impl Suspend for YieldAwaiter {
    type Output = ();

    /// Always `false`: yielding that sometimes does not yield is useless as
    /// a fairness point.
    fn is_ready(&self) -> bool {
        false
    }

    /// In current-context mode the continuation is invoked before `register`
    /// returns; callers driving the contract by hand should expect that.
    fn register(&mut self, cont: Continuation) {
        if self.continue_on_current {
            cont.run();
        } else {
            default_pool().enqueue(cont);
        }
    }

    fn take(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{block_on, on_default_worker};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn never_ready() {
        assert!(!yield_now().suspend().is_ready());
        assert!(!yield_now().via_pool().suspend().is_ready());
    }

    #[test]
    fn await_completes_after_one_suspension() {
        let polls = block_on(async {
            yield_now().await;
            yield_now().via_pool().await;
            2
        });
        assert_eq!(polls, 2);
    }

    #[test]
    fn current_mode_fires_during_registration() {
        let (tx, rx) = mpsc::channel();
        let mut awaiter = yield_now().suspend();
        awaiter.register(Continuation::detached(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));
        // Ran synchronously, on this thread.
        assert_eq!(rx.try_recv().unwrap(), std::thread::current().id());
    }

    #[test]
    fn pool_mode_fires_from_a_pool_worker() {
        let (tx, rx) = mpsc::channel();
        let mut awaiter = yield_now().via_pool().suspend();
        awaiter.register(Continuation::detached(move || {
            tx.send(on_default_worker()).unwrap();
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}
