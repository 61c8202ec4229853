use std::future::IntoFuture;

use crate::error::Result;
use crate::suspend::{Await, Continuation, Suspend};
use crate::sync::Completion;

/// Awaitable over a [`Completion`] that prefers resuming synchronously on
/// the thread that resolves it.
///
/// Ordinary awaiting dispatches the continuation to the default pool, which
/// costs a hop. This decorator asks for the continuation to run inline on
/// the resolving call stack instead. The preference is best-effort: once the
/// resolving thread's inline-depth budget is exhausted the continuation is
/// offloaded to the pool anyway, so chains of inline completions cannot
/// overflow the stack. Completion testing and result retrieval are exactly
/// those of the wrapped completion.
pub fn continue_inline<T>(completion: &Completion<T>) -> InlineContinue<T> {
    InlineContinue {
        completion: completion.clone(),
        detach: false,
    }
}

/// Configuration value for an inline-preferring await. See
/// [`continue_inline`].
#[derive(Debug, Clone)]
pub struct InlineContinue<T> {
    completion: Completion<T>,
    detach: bool,
}

impl<T> InlineContinue<T> {
    /// Skips ambient-scope propagation into the continuation.
    pub fn detach_scope(mut self) -> Self {
        self.detach = true;
        self
    }

    /// Produces the single-use awaiter for this await.
    pub fn suspend(&self) -> InlineAwaiter<T> {
        InlineAwaiter {
            completion: self.completion.clone(),
        }
    }
}

impl<T: Clone> IntoFuture for InlineContinue<T> {
    type Output = Result<T>;
    type IntoFuture = Await<InlineAwaiter<T>>;

    fn into_future(self) -> Self::IntoFuture {
        let detach = self.detach;
        Await::with_policy(self.suspend(), detach)
    }
}

/// Live suspension point for one inline-preferring await.
#[derive(Debug)]
pub struct InlineAwaiter<T> {
    completion: Completion<T>,
}

impl<T: Clone> Suspend for InlineAwaiter<T> {
    type Output = Result<T>;

    fn is_ready(&self) -> bool {
        self.completion.is_done()
    }

    fn register(&mut self, cont: Continuation) {
        self.completion.attach(cont, true);
    }

    fn take(&mut self) -> Result<T> {
        self.completion
            .try_outcome()
            .expect("inline awaiter consumed before resolution")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::block_on;
    use crate::sync::Promise;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn continuation_runs_on_the_resolving_thread() {
        let (promise, completion) = Promise::new();
        let (tx, rx) = mpsc::channel();

        let mut awaiter = continue_inline(&completion).suspend();
        awaiter.register(Continuation::detached(move || {
            tx.send(thread::current().id()).unwrap();
        }));

        let resolver = thread::spawn(move || {
            promise.complete(1);
            thread::current().id()
        });
        let resolving_thread = resolver.join().unwrap();

        assert_eq!(rx.recv().unwrap(), resolving_thread);
    }

    #[test]
    fn result_matches_ordinary_await() {
        let (promise, completion) = Promise::new();
        promise.complete(9);
        assert_eq!(block_on(continue_inline(&completion)), Ok(9));
        assert_eq!(block_on(completion), Ok(9));
    }

    #[test]
    fn already_resolved_completion_is_ready() {
        let (promise, completion) = Promise::new();
        assert!(!continue_inline(&completion).suspend().is_ready());
        promise.complete(());
        assert!(continue_inline(&completion).suspend().is_ready());
    }
}
