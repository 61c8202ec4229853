//! Cooperative-cancellation and completion-source primitives.
//!
//! [`CancellationToken`] is the cancellation collaborator every OS bridge
//! accepts: observable, subscribable, with revocable subscriptions.
//! [`Promise`]/[`Completion`] form a latched completion source, the
//! "existing future" the continuation-execution decorators in [`task`] wrap.
//!
//! [`task`]: crate::task

mod cancel;
pub use cancel::{CancelGuard, CancellationToken};

mod promise;
pub use promise::{Completion, CompletionAwaiter, Promise};
