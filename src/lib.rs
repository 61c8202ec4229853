//! Low-level suspension primitives for cooperative scheduling.
//!
//! Rust's `async`/`await` gives a task exactly one way to pause: return
//! `Poll::Pending` and wait for a wake. This crate is about controlling
//! everything around that pause: *where* the continuation runs, *whether*
//! resumption is allowed to happen synchronously, and *how* blocking OS
//! synchronization objects become non-blocking awaitable values.
//!
//! The primitives split into three groups:
//!
//! - **Affinity awaitables** ([`task`]): resume on a chosen [`Executor`],
//!   post to a captured [`DispatchContext`], or force a yield point with
//!   [`task::yield_now`].
//! - **Continuation decorators** ([`task`]): wrap a [`Completion`] to prefer
//!   running the continuation inline on the resolving thread
//!   ([`task::continue_inline`]), or to surface every concurrent failure
//!   cause instead of just the first ([`task::preserve_faults`]).
//! - **OS bridges** ([`os`], feature `os`): adapt a raw wait handle, a child
//!   process exit, or a configuration-key change notification into a future,
//!   with cancellation and exactly-once resource release on every path.
//!
//! All of them share one contract, [`Suspend`]: a non-blocking completion
//! test, an at-most-once continuation registration, and a consume-once
//! result. The [`Await`] adapter turns any [`Suspend`] into a future, which
//! is how every awaitable here supports `.await`.
//!
//! No scheduler of consequence lives here: the primitives sit on top of
//! whatever executor substrate the caller already has, abstracted as
//! [`Executor`] plus [`CancellationToken`]. The small pool behind
//! [`exec::default_pool`] exists so the crate is usable stand-alone.
//!
//! [`Executor`]: exec::Executor
//! [`DispatchContext`]: exec::DispatchContext
//! [`CancellationToken`]: sync::CancellationToken
//! [`Completion`]: sync::Completion
//! [`Suspend`]: suspend::Suspend
//! [`Await`]: suspend::Await

#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unused_must_use)]

pub mod error;
pub mod exec;
pub mod suspend;
pub mod sync;
pub mod task;

#[cfg(feature = "os")]
pub mod os;

pub use error::Error;
