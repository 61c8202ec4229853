//! The three-operation suspension contract every awaitable implements.
//!
//! An *awaitable* in this crate is a plain configuration value; suspending on
//! it produces an *awaiter*, a live single-use suspension point. Awaiters all
//! obey the same contract, captured by [`Suspend`]:
//!
//! 1. [`is_ready`](Suspend::is_ready): non-blocking, side-effect-free test
//!    for "no suspension needed".
//! 2. [`register`](Suspend::register): schedule a [`Continuation`] to run
//!    exactly once when the underlying condition becomes true. At most one
//!    registration per awaiter.
//! 3. [`take`](Suspend::take): consume the outcome. Calling it before the
//!    awaiter completed is a caller bug; the surrounding suspension machinery
//!    (not this trait) is responsible for never doing so.
//!
//! [`Await`] drives that contract from a [`Future`], which is how every
//! awaitable here supports `.await`. The contract is also usable directly,
//! e.g. to hook a completion into a foreign callback system.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

mod scope;
pub use scope::{Scope, ScopeGuard};

/// Single-shot work item scheduled by an awaiter registration.
///
/// A continuation optionally carries the [`Scope`] that was current when it
/// was created. [`Continuation::new`] captures it, so the continuation runs
/// with the caller's ambient diagnostic scope re-entered;
/// [`Continuation::detached`] skips the capture, which is cheaper and the
/// right choice when the continuation is pure scheduler plumbing.
pub struct Continuation {
    f: Box<dyn FnOnce() + Send + 'static>,
    scope: Option<Arc<Scope>>,
}

impl Continuation {
    /// Creates a continuation that captures the current ambient [`Scope`]
    /// and re-enters it for the duration of [`run`](Self::run).
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Continuation {
            f: Box::new(f),
            scope: Scope::current(),
        }
    }

    /// Creates a continuation with no ambient scope attached.
    pub fn detached<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Continuation {
            f: Box::new(f),
            scope: None,
        }
    }

    /// Builds a continuation with or without scope capture, per `detach`.
    pub(crate) fn with_policy<F: FnOnce() + Send + 'static>(detach: bool, f: F) -> Self {
        if detach {
            Continuation::detached(f)
        } else {
            Continuation::new(f)
        }
    }

    /// Runs the continuation, inside its captured scope if it has one.
    pub fn run(self) {
        match self.scope {
            Some(scope) => {
                let _guard = Scope::enter(scope);
                (self.f)();
            }
            None => (self.f)(),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// A live, single-use suspension point.
///
/// See the [module docs](self) for the full contract. Implementations must
/// tolerate [`register`](Self::register) racing against the underlying
/// condition becoming true on another thread: the continuation must still
/// run, exactly once.
pub trait Suspend {
    /// Value produced when the suspension completes.
    type Output;

    /// Returns `true` if suspending is unnecessary and [`take`](Self::take)
    /// may be called immediately. Never blocks, never has side effects.
    fn is_ready(&self) -> bool;

    /// Schedules `cont` to run exactly once when the underlying condition
    /// becomes true. Must be called at most once per awaiter.
    fn register(&mut self, cont: Continuation);

    /// Consumes the outcome. Only valid once the awaiter has completed
    /// (`is_ready` returned `true`, or the registered continuation ran).
    fn take(&mut self) -> Self::Output;
}

/// State shared between an [`Await`] and the continuation it registered.
///
/// The waker slot is refreshed on every poll, so a task that migrates between
/// wakers before the condition fires is still woken through its latest one.
#[derive(Debug)]
struct FireState {
    fired: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl FireState {
    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        let waker = self.waker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Adapter driving the [`Suspend`] contract from [`Future::poll`].
///
/// First poll takes the `is_ready` fast path or registers a waker-firing
/// continuation; later polls refresh the waker until the continuation fires.
#[derive(Debug)]
pub struct Await<S: Suspend> {
    awaiter: S,
    detach: bool,
    shared: Option<Arc<FireState>>,
    done: bool,
}

impl<S: Suspend> Await<S> {
    /// Wraps `awaiter`, propagating the ambient scope into the continuation.
    pub fn new(awaiter: S) -> Self {
        Await {
            awaiter,
            detach: false,
            shared: None,
            done: false,
        }
    }

    /// Wraps `awaiter` without ambient-scope propagation.
    pub fn detached(awaiter: S) -> Self {
        Await {
            awaiter,
            detach: true,
            shared: None,
            done: false,
        }
    }

    /// Builds the adapter with the propagation policy given by `detach`.
    pub(crate) fn with_policy(awaiter: S, detach: bool) -> Self {
        Await {
            awaiter,
            detach,
            shared: None,
            done: false,
        }
    }
}

impl<S: Suspend + Unpin> Future for Await<S> {
    type Output = S::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.done, "awaiter polled after completion");

        match &this.shared {
            None => {
                if this.awaiter.is_ready() {
                    this.done = true;
                    return Poll::Ready(this.awaiter.take());
                }

                let shared = Arc::new(FireState {
                    fired: AtomicBool::new(false),
                    waker: Mutex::new(Some(cx.waker().clone())),
                });
                let for_cont = Arc::clone(&shared);
                this.shared = Some(shared);

                this.awaiter
                    .register(Continuation::with_policy(this.detach, move || {
                        for_cont.fire()
                    }));

                Poll::Pending
            }
            Some(shared) => {
                if shared.fired.load(Ordering::Acquire) {
                    this.done = true;
                    return Poll::Ready(this.awaiter.take());
                }

                // Publish the latest waker, then re-check: the continuation
                // may have fired in between and missed the new waker.
                *shared.waker.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(cx.waker().clone());
                if shared.fired.load(Ordering::Acquire) {
                    this.done = true;
                    return Poll::Ready(this.awaiter.take());
                }

                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::block_on;
    use std::sync::atomic::AtomicU32;

    /// Completes after `remaining` registrations, counting them.
    struct Countdown {
        remaining: u32,
        registered: Arc<AtomicU32>,
    }

    impl Suspend for Countdown {
        type Output = u32;

        fn is_ready(&self) -> bool {
            self.remaining == 0
        }

        fn register(&mut self, cont: Continuation) {
            self.remaining -= 1;
            self.registered.fetch_add(1, Ordering::SeqCst);
            cont.run();
        }

        fn take(&mut self) -> u32 {
            assert!(self.is_ready());
            self.registered.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn ready_fast_path_skips_registration() {
        let registered = Arc::new(AtomicU32::new(0));
        let out = block_on(Await::new(Countdown {
            remaining: 0,
            registered: Arc::clone(&registered),
        }));
        assert_eq!(out, 0);
        assert_eq!(registered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pending_path_registers_exactly_once() {
        let registered = Arc::new(AtomicU32::new(0));
        let out = block_on(Await::new(Countdown {
            remaining: 1,
            registered: Arc::clone(&registered),
        }));
        assert_eq!(out, 1);
    }

    #[test]
    fn continuation_runs_inside_captured_scope() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_cont = Arc::clone(&seen);
        let cont = {
            let _guard = Scope::enter(Arc::new(Scope::new("request-17")));
            Continuation::new(move || {
                *seen_in_cont.lock().unwrap() =
                    Scope::current().map(|s| s.label().to_owned());
            })
        };
        // Run outside the scope; the capture must carry it over.
        cont.run();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("request-17"));
    }

    #[test]
    fn detached_continuation_drops_ambient_scope() {
        let seen = Arc::new(Mutex::new(Some("sentinel".to_owned())));
        let seen_in_cont = Arc::clone(&seen);
        let cont = {
            let _guard = Scope::enter(Arc::new(Scope::new("request-17")));
            Continuation::detached(move || {
                *seen_in_cont.lock().unwrap() =
                    Scope::current().map(|s| s.label().to_owned());
            })
        };
        cont.run();
        assert_eq!(*seen.lock().unwrap(), None);
    }
}
