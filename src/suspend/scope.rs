use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

thread_local! {
    /// Ambient scope of the current thread. Set only through [`Scope::enter`]
    /// and restored when the returned guard drops, so nesting behaves like a
    /// stack.
    static CURRENT_SCOPE: RefCell<Option<Arc<Scope>>> = const { RefCell::new(None) };
}

/// Ambient diagnostic scope carried across suspension points.
///
/// A scope is a label describing the logical operation in flight (a request
/// id, a job name). Continuations created with [`Continuation::new`] capture
/// the current scope and re-enter it when they run, so diagnostics keep their
/// association with the originating operation even when the continuation runs
/// on a different thread. [`Continuation::detached`] opts out.
///
/// [`Continuation::new`]: super::Continuation::new
/// [`Continuation::detached`]: super::Continuation::detached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    label: String,
}

impl Scope {
    /// Creates a scope with the given diagnostic label.
    pub fn new(label: impl Into<String>) -> Self {
        Scope {
            label: label.into(),
        }
    }

    /// The diagnostic label this scope was created with.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the current thread's ambient scope, if one is entered.
    pub fn current() -> Option<Arc<Scope>> {
        CURRENT_SCOPE.with(|c| c.borrow().clone())
    }

    /// Makes `scope` the current thread's ambient scope until the returned
    /// guard is dropped, at which point the previous scope is restored.
    #[must_use = "dropping the guard immediately restores the previous scope"]
    pub fn enter(scope: Arc<Scope>) -> ScopeGuard {
        let previous = CURRENT_SCOPE.with(|c| c.borrow_mut().replace(scope));
        ScopeGuard { previous }
    }
}

/// Restores the previously ambient [`Scope`] on drop.
pub struct ScopeGuard {
    previous: Option<Arc<Scope>>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_SCOPE.with(|c| *c.borrow_mut() = previous);
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard").finish_non_exhaustive()
    }
}
