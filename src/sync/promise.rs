use std::cell::Cell;
use std::fmt;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::exec::{Executor, default_pool};
use crate::suspend::{Await, Continuation, Suspend};

thread_local! {
    /// Depth of inline continuation dispatch on the current thread. Bounds
    /// the call stack when chained completions resolve each other inline.
    static INLINE_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Inline dispatch beyond this depth is offloaded to the default pool.
const MAX_INLINE_DEPTH: u32 = 32;

/// Latched outcome of a completion source.
#[derive(Debug, Clone)]
enum Outcome<T> {
    Value(T),
    /// One or more concurrent failure causes. Never empty.
    Faults(Vec<Error>),
    Cancelled,
}

/// A registered waiter and how it wants to be dispatched at resolution time.
struct Waiter {
    cont: Continuation,
    inline: bool,
}

struct PromiseState<T> {
    outcome: Option<Outcome<T>>,
    waiters: Vec<Waiter>,
}

struct PromiseShared<T> {
    /// Fast-path mirror of `state.outcome.is_some()`.
    done: AtomicBool,
    state: Mutex<PromiseState<T>>,
}

impl<T> PromiseShared<T> {
    /// Latches `outcome` if nothing was latched before. First resolution
    /// wins; later calls return `false` and change nothing.
    fn resolve(&self, outcome: Outcome<T>) -> bool {
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            self.done.store(true, Ordering::Release);
            std::mem::take(&mut state.waiters)
        };

        for waiter in waiters {
            dispatch(waiter);
        }
        true
    }
}

/// Runs or offloads one waiter on the resolving thread.
///
/// Inline waiters run synchronously here unless the per-thread inline depth
/// budget is exhausted, in which case they fall back to the pool. The
/// inline preference is best-effort, not a guarantee.
fn dispatch(waiter: Waiter) {
    if waiter.inline {
        let depth = INLINE_DEPTH.with(|d| d.get());
        if depth < MAX_INLINE_DEPTH {
            // Restore on drop so a panicking continuation cannot leave the
            // thread's budget shrunk.
            struct DepthGuard(u32);
            impl Drop for DepthGuard {
                fn drop(&mut self) {
                    INLINE_DEPTH.with(|d| d.set(self.0));
                }
            }
            let _restore = DepthGuard(depth);
            INLINE_DEPTH.with(|d| d.set(depth + 1));
            waiter.cont.run();
            return;
        }
    }
    default_pool().enqueue(waiter.cont);
}

/// Producer half of a completion source.
///
/// Exactly one of [`complete`](Self::complete), [`fault`](Self::fault),
/// [`fault_all`](Self::fault_all), or [`cancel`](Self::cancel) takes effect;
/// the rest are no-ops returning `false`. Dropping an unresolved promise
/// faults it, so waiters are never stranded.
pub struct Promise<T> {
    shared: Arc<PromiseShared<T>>,
}

impl<T> Promise<T> {
    /// Creates a connected producer/consumer pair.
    pub fn new() -> (Promise<T>, Completion<T>) {
        let shared = Arc::new(PromiseShared {
            done: AtomicBool::new(false),
            state: Mutex::new(PromiseState {
                outcome: None,
                waiters: Vec::new(),
            }),
        });
        (
            Promise {
                shared: Arc::clone(&shared),
            },
            Completion { shared },
        )
    }

    /// Resolves with a value.
    pub fn complete(&self, value: T) -> bool {
        self.shared.resolve(Outcome::Value(value))
    }

    /// Resolves with a single failure cause.
    pub fn fault(&self, error: Error) -> bool {
        self.shared.resolve(Outcome::Faults(vec![error]))
    }

    /// Resolves with multiple concurrent failure causes, all preserved.
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty: a fault outcome needs a cause.
    pub fn fault_all(&self, errors: Vec<Error>) -> bool {
        assert!(!errors.is_empty(), "fault_all requires at least one cause");
        self.shared.resolve(Outcome::Faults(errors))
    }

    /// Resolves in the cancelled state.
    pub fn cancel(&self) -> bool {
        self.shared.resolve(Outcome::Cancelled)
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        self.shared.resolve(Outcome::Faults(vec![Error::Faulted(
            "promise dropped without resolution".to_owned(),
        )]));
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("done", &self.shared.done.load(Ordering::Acquire))
            .finish()
    }
}

/// Consumer half of a completion source. Cloneable; every clone observes the
/// same latched outcome.
///
/// Awaiting a completion directly surfaces only the *first* failure cause of
/// a fault set and dispatches the continuation to the default pool. The
/// decorators in [`task`](crate::task) change either choice.
pub struct Completion<T> {
    shared: Arc<PromiseShared<T>>,
}

impl<T> Completion<T> {
    /// Whether an outcome has been latched.
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    /// Attaches a waiter, or dispatches it right away when already resolved.
    /// Attachment and resolution share the state lock, so a waiter is never
    /// lost to a concurrent resolve.
    pub(crate) fn attach(&self, cont: Continuation, inline: bool) {
        let waiter = Waiter { cont, inline };
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if state.outcome.is_none() {
                state.waiters.push(waiter);
                return;
            }
        }
        dispatch(waiter);
    }
}

impl<T: Clone> Completion<T> {
    /// The latched outcome with first-fault semantics, or `None` while
    /// pending.
    pub fn try_outcome(&self) -> Option<Result<T>> {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.outcome.as_ref().map(|outcome| match outcome {
            Outcome::Value(v) => Ok(v.clone()),
            Outcome::Faults(causes) => Err(causes[0].clone()),
            Outcome::Cancelled => Err(Error::Cancelled),
        })
    }

    /// The latched outcome with every failure cause preserved, or `None`
    /// while pending. Basis of [`task::preserve_faults`].
    ///
    /// [`task::preserve_faults`]: crate::task::preserve_faults
    pub(crate) fn try_outcome_all(&self) -> Option<Result<T>> {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.outcome.as_ref().map(|outcome| match outcome {
            Outcome::Value(v) => Ok(v.clone()),
            Outcome::Faults(causes) => Err(Error::Aggregate(causes.clone())),
            Outcome::Cancelled => Err(Error::Cancelled),
        })
    }

    /// Produces the single-use awaiter for one await of this completion.
    pub fn awaiter(&self) -> CompletionAwaiter<T> {
        CompletionAwaiter {
            completion: self.clone(),
        }
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Completion {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T: Clone> IntoFuture for Completion<T> {
    type Output = Result<T>;
    type IntoFuture = Await<CompletionAwaiter<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Await::new(self.awaiter())
    }
}

/// Ordinary awaiter over a [`Completion`]: pool dispatch, first-fault
/// surfacing.
#[derive(Debug)]
pub struct CompletionAwaiter<T> {
    completion: Completion<T>,
}

impl<T: Clone> Suspend for CompletionAwaiter<T> {
    type Output = Result<T>;

    fn is_ready(&self) -> bool {
        self.completion.is_done()
    }

    fn register(&mut self, cont: Continuation) {
        self.completion.attach(cont, false);
    }

    fn take(&mut self) -> Result<T> {
        self.completion
            .try_outcome()
            .expect("completion awaiter consumed before resolution")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::block_on;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn first_resolution_wins_and_later_ones_are_noops() {
        let (promise, completion) = Promise::new();
        assert!(promise.complete(1));
        assert!(!promise.complete(2));
        assert!(!promise.fault(Error::Cancelled));
        assert!(!promise.cancel());
        assert_eq!(completion.try_outcome(), Some(Ok(1)));
    }

    #[test]
    fn await_resolved_completion_returns_value() {
        let (promise, completion) = Promise::new();
        promise.complete("done");
        assert_eq!(block_on(completion), Ok("done"));
    }

    #[test]
    fn await_pending_completion_wakes_on_resolution() {
        let (promise, completion) = Promise::new();
        let resolver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.complete(42);
        });
        assert_eq!(block_on(completion), Ok(42));
        resolver.join().unwrap();
    }

    #[test]
    fn ordinary_await_surfaces_only_the_first_fault() {
        let (promise, completion) = Promise::<()>::new();
        promise.fault_all(vec![
            Error::Faulted("a".into()),
            Error::Faulted("b".into()),
        ]);
        assert_eq!(block_on(completion), Err(Error::Faulted("a".into())));
    }

    #[test]
    fn cancelled_outcome_is_distinct() {
        let (promise, completion) = Promise::<()>::new();
        promise.cancel();
        assert_eq!(block_on(completion), Err(Error::Cancelled));
    }

    #[test]
    fn dropping_unresolved_promise_faults_waiters() {
        let (promise, completion) = Promise::<()>::new();
        drop(promise);
        assert!(matches!(block_on(completion), Err(Error::Faulted(_))));
    }

    #[test]
    fn clones_observe_the_same_outcome() {
        let (promise, completion) = Promise::new();
        let other = completion.clone();
        promise.complete(5);
        assert_eq!(completion.try_outcome(), Some(Ok(5)));
        assert_eq!(other.try_outcome(), Some(Ok(5)));
    }

    #[test]
    fn panicking_inline_waiter_does_not_shrink_the_inline_budget() {
        use std::panic::{AssertUnwindSafe, catch_unwind};
        use std::sync::mpsc;

        // Burn through what would be the whole budget if a panic leaked the
        // depth increment.
        for _ in 0..MAX_INLINE_DEPTH {
            let (promise, completion) = Promise::new();
            completion.attach(
                Continuation::detached(|| panic!("waiter failed")),
                true,
            );
            assert!(catch_unwind(AssertUnwindSafe(|| promise.complete(()))).is_err());
        }

        // Still within budget: an inline waiter runs on the resolving thread.
        let (promise, completion) = Promise::new();
        let (tx, rx) = mpsc::channel();
        completion.attach(
            Continuation::detached(move || {
                tx.send(thread::current().id()).unwrap();
            }),
            true,
        );
        promise.complete(());
        assert_eq!(rx.recv().unwrap(), thread::current().id());
    }

    #[test]
    fn concurrent_resolution_latches_exactly_once() {
        for _ in 0..64 {
            let (promise, completion) = Promise::new();
            let promise = Arc::new(promise);

            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let promise = Arc::clone(&promise);
                    thread::spawn(move || promise.complete(i))
                })
                .collect();
            let winners: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(winners.iter().filter(|&&won| won).count(), 1);
            assert!(matches!(completion.try_outcome(), Some(Ok(_))));
        }
    }
}
