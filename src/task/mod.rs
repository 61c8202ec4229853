//! Suspension-point awaitables: where and how a task resumes.
//!
//! Everything here is a plain configuration value implementing `IntoFuture`;
//! nothing happens until the value is awaited (or its awaiter is driven
//! through the [`Suspend`](crate::suspend::Suspend) contract directly).
//!
//! - [`switch_to`] / [`switch_to_pool`]: resume on a chosen executor,
//!   skipping the hop when already there.
//! - [`post_to`]: resume by posting to a captured dispatch context; always
//!   asynchronous.
//! - [`yield_now`]: unconditionally give up the current tick.
//! - [`continue_inline`]: await a completion preferring synchronous
//!   resumption on the resolving thread.
//! - [`preserve_faults`]: await a completion surfacing every concurrent
//!   failure cause.
//!
//! Every awaitable has a `detach_scope()` flag choosing whether the ambient
//! [`Scope`](crate::suspend::Scope) is propagated into the continuation.

mod switch;
pub use switch::{SwitchAwaiter, SwitchTo, switch_to, switch_to_pool};

mod post;
pub use post::{PostAwaiter, PostTo, post_to};

mod yield_now;
pub use yield_now::{YieldAwaiter, YieldNow, yield_now};

mod inline;
pub use inline::{InlineAwaiter, InlineContinue, continue_inline};

mod aggregate;
pub use aggregate::{AggregateAwaiter, PreserveFaults, preserve_faults};
