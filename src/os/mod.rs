//! Bridges from blocking OS synchronization objects to futures.
//!
//! Blocking on an OS object from an async context wedges a worker; these
//! bridges convert the blocking wait into an asynchronous registration
//! against a process-wide `epoll(7)` reactor instead. Each bridge hands out
//! a future backed by a [`WaitSubscription`]: the exclusive owner of one OS
//! handle and, optionally, one cancellation subscription, both released
//! exactly once on the first of signal, cancellation, or drop.
//!
//! The wait and process bridges are Linux-specific (`epoll`, `eventfd`,
//! `pidfd`). The configuration-key bridge compiles everywhere and reports
//! [`Error::Unsupported`](crate::Error::Unsupported) on hosts without a
//! native change-notification facility.
//!
//! [`WaitSubscription`]: wait::Wait

#[cfg(target_os = "linux")]
pub(crate) mod reactor;

#[cfg(target_os = "linux")]
mod wait;
#[cfg(target_os = "linux")]
pub use wait::{Wait, WaitHandle};

#[cfg(target_os = "linux")]
mod process;
#[cfg(target_os = "linux")]
pub use process::{ChildExit, on_exit};

mod config;
pub use config::{ChangeKinds, KeyWatch, watch_key};
