use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::suspend::Continuation;

/// Subscriber list. `next_id` only grows; entries are removed on revoke or
/// when `cancel` drains the list.
#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, Continuation)>,
}

struct TokenInner {
    cancelled: AtomicBool,
    subscribers: Mutex<Subscribers>,
}

/// Observable, subscribable cancellation signal.
///
/// Cancellation is cooperative: cancelling a token makes every primitive
/// waiting on it resolve with [`Error::Cancelled`], it never terminates the
/// underlying external operation. Clones share the same signal.
///
/// Subscriptions registered with [`on_cancelled`](Self::on_cancelled) run
/// exactly once: either on the thread that calls [`cancel`](Self::cancel),
/// or immediately at subscription time if the token is already cancelled.
///
/// [`Error::Cancelled`]: crate::Error::Cancelled
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        CancellationToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                subscribers: Mutex::new(Subscribers::default()),
            }),
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the token, running every pending subscription on this thread.
    /// Returns `false` if the token was already cancelled (a no-op).
    pub fn cancel(&self) -> bool {
        let drained = {
            let mut subs = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            // The flag flips under the subscriber lock so a concurrent
            // subscribe either lands in this drain or observes `cancelled`
            // and runs immediately; a callback can never be lost or doubled.
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut subs.entries)
        };

        for (_, cont) in drained {
            cont.run();
        }
        true
    }

    /// Subscribes `cont` to run when the token is cancelled. If the token is
    /// already cancelled, `cont` runs synchronously before this returns.
    ///
    /// The subscription lives until the returned guard is dropped or
    /// [`revoked`](CancelGuard::revoke); after either, the continuation is
    /// guaranteed not to run (unless it already has).
    #[must_use = "dropping the guard revokes the subscription"]
    pub fn on_cancelled(&self, cont: Continuation) -> CancelGuard {
        let id = {
            let mut subs = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if self.inner.cancelled.load(Ordering::Acquire) {
                drop(subs);
                cont.run();
                return CancelGuard { inner: None, id: 0 };
            }
            let id = subs.next_id;
            subs.next_id += 1;
            subs.entries.push((id, cont));
            id
        };

        CancelGuard {
            inner: Some(Arc::clone(&self.inner)),
            id,
        }
    }

    /// Number of live subscriptions. Meant for resource-leak assertions in
    /// tests; not a synchronization primitive.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        CancellationToken::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Revocable handle to one cancellation subscription.
pub struct CancelGuard {
    /// `None` for inert guards (the continuation already ran).
    inner: Option<Arc<TokenInner>>,
    id: u64,
}

impl CancelGuard {
    /// Removes the subscription. The continuation will not run after this
    /// returns, unless it has already run. Idempotent.
    pub fn revoke(&mut self) {
        if let Some(inner) = self.inner.take() {
            let mut subs = inner
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            subs.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for CancelGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelGuard")
            .field("live", &self.inner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counter_cont(counter: &Arc<AtomicU32>) -> Continuation {
        let counter = Arc::clone(counter);
        Continuation::detached(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn cancel_runs_each_subscription_once() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));

        let _a = token.on_cancelled(counter_cont(&counter));
        let _b = token.on_cancelled(counter_cont(&counter));
        assert_eq!(token.subscriber_count(), 2);

        assert!(token.cancel());
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        // Second cancel is a no-op.
        assert!(!token.cancel());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(token.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_after_cancel_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let counter = Arc::new(AtomicU32::new(0));
        let _guard = token.on_cancelled(counter_cont(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(token.subscriber_count(), 0);
    }

    #[test]
    fn revoked_subscription_never_runs() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));

        let mut guard = token.on_cancelled(counter_cont(&counter));
        guard.revoke();
        assert_eq!(token.subscriber_count(), 0);

        token.cancel();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_guard_revokes() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));

        drop(token.on_cancelled(counter_cont(&counter)));
        token.cancel();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_races_with_subscription_from_other_threads() {
        for _ in 0..64 {
            let token = CancellationToken::new();
            let counter = Arc::new(AtomicU32::new(0));

            let subscriber = {
                let token = token.clone();
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    // Leak the guard so the subscription stays live.
                    std::mem::forget(token.on_cancelled(counter_cont(&counter)));
                })
            };
            let canceller = {
                let token = token.clone();
                std::thread::spawn(move || {
                    token.cancel();
                })
            };

            subscriber.join().unwrap();
            canceller.join().unwrap();
            // Whichever side won, the callback ran exactly once.
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }
}
