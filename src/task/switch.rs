use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

use crate::exec::{self, Executor, default_pool, on_default_worker};
use crate::suspend::{Await, Continuation, Suspend};

/// Where a [`SwitchTo`] sends its continuation.
#[derive(Clone)]
enum Target {
    Shared(Arc<dyn Executor>),
    Static(&'static dyn Executor),
}

impl Target {
    fn executor(&self) -> &dyn Executor {
        match self {
            Target::Shared(e) => e.as_ref(),
            Target::Static(e) => *e,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Target").field(&self.executor().id()).finish()
    }
}

/// Awaitable that resumes the caller on `executor`.
///
/// The registered continuation is enqueued as new work on the target, so
/// driving the awaiter through the [`Suspend`] contract runs the
/// continuation on a target worker, guaranteed. If the caller is already
/// running there the switch completes synchronously with no hop, unless
/// [`always_yield`](SwitchTo::always_yield) is set.
///
/// Through `.await` the enqueued work item is the task *wake*: the wake is
/// issued from the target executor, but where the task body resumes is
/// decided by whichever executor owns the task. A library awaitable cannot
/// migrate a task it does not own; tasks that are themselves run by the
/// target executor resume there.
pub fn switch_to(executor: Arc<dyn Executor>) -> SwitchTo {
    SwitchTo {
        target: Target::Shared(executor),
        always_yield: false,
        detach: false,
    }
}

/// [`switch_to`] targeting the process-wide default pool.
pub fn switch_to_pool() -> SwitchTo {
    SwitchTo {
        target: Target::Static(default_pool()),
        always_yield: false,
        detach: false,
    }
}

/// Configuration value for an executor switch. See [`switch_to`].
#[derive(Debug, Clone)]
pub struct SwitchTo {
    target: Target,
    always_yield: bool,
    detach: bool,
}

impl SwitchTo {
    /// Forces a hop even when the caller is already on the target executor.
    /// Useful as a deterministic fairness point inside a long computation.
    pub fn always_yield(mut self) -> Self {
        self.always_yield = true;
        self
    }

    /// Skips ambient-scope propagation into the continuation.
    pub fn detach_scope(mut self) -> Self {
        self.detach = true;
        self
    }

    /// Produces the single-use awaiter for this switch.
    pub fn suspend(&self) -> SwitchAwaiter {
        SwitchAwaiter {
            target: self.target.clone(),
            always_yield: self.always_yield,
        }
    }
}

impl IntoFuture for SwitchTo {
    type Output = ();
    type IntoFuture = Await<SwitchAwaiter>;

    fn into_future(self) -> Self::IntoFuture {
        let detach = self.detach;
        Await::with_policy(self.suspend(), detach)
    }
}

/// Live suspension point for one executor switch.
#[derive(Debug)]
pub struct SwitchAwaiter {
    target: Target,
    always_yield: bool,
}

impl SwitchAwaiter {
    /// Whether the current thread already runs work for the target.
    ///
    /// Exact executor identity is the general rule. The default pool gets a
    /// wider match: *any* default-pool worker qualifies, so code already on
    /// the pool never pays a redundant requeue to reach "the pool".
    fn on_target(&self) -> bool {
        let target_id = self.target.executor().id();
        if exec::current() == Some(target_id) {
            return true;
        }
        on_default_worker() && target_id == default_pool().id()
    }
}

impl Suspend for SwitchAwaiter {
    type Output = ();

    fn is_ready(&self) -> bool {
        !self.always_yield && self.on_target()
    }

    fn register(&mut self, cont: Continuation) {
        self.target.executor().enqueue(cont);
    }

    fn take(&mut self) {}
}
