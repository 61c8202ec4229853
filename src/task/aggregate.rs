use std::future::IntoFuture;

use crate::error::{Error, Result};
use crate::suspend::{Await, Continuation, Suspend};
use crate::sync::Completion;

/// Awaitable over a [`Completion`] that surfaces *every* concurrent failure
/// cause.
///
/// Ordinary awaiting of a completion that faulted with several independent
/// causes yields only the first one; the rest are silently dropped, which
/// loses diagnostics exactly when several sub-operations fail at once. This
/// decorator yields [`Error::Aggregate`] carrying the full cause set
/// instead. Success and cancellation behave identically to ordinary
/// awaiting.
pub fn preserve_faults<T>(completion: &Completion<T>) -> PreserveFaults<T> {
    PreserveFaults {
        completion: completion.clone(),
        detach: false,
    }
}

/// Configuration value for a failure-preserving await. See
/// [`preserve_faults`].
#[derive(Debug, Clone)]
pub struct PreserveFaults<T> {
    completion: Completion<T>,
    detach: bool,
}

impl<T> PreserveFaults<T> {
    /// Skips ambient-scope propagation into the continuation.
    pub fn detach_scope(mut self) -> Self {
        self.detach = true;
        self
    }

    /// Produces the single-use awaiter for this await.
    pub fn suspend(&self) -> AggregateAwaiter<T> {
        AggregateAwaiter {
            completion: self.completion.clone(),
        }
    }
}

impl<T: Clone> IntoFuture for PreserveFaults<T> {
    type Output = Result<T>;
    type IntoFuture = Await<AggregateAwaiter<T>>;

    fn into_future(self) -> Self::IntoFuture {
        let detach = self.detach;
        Await::with_policy(self.suspend(), detach)
    }
}

/// Live suspension point for one failure-preserving await.
#[derive(Debug)]
pub struct AggregateAwaiter<T> {
    completion: Completion<T>,
}

impl<T: Clone> Suspend for AggregateAwaiter<T> {
    type Output = Result<T>;

    fn is_ready(&self) -> bool {
        self.completion.is_done()
    }

    fn register(&mut self, cont: Continuation) {
        self.completion.attach(cont, false);
    }

    fn take(&mut self) -> Result<T> {
        self.completion
            .try_outcome_all()
            .expect("aggregate awaiter consumed before resolution")
    }
}
