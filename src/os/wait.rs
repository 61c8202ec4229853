use std::fmt;
use std::future::Future;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::error::{Error, Result};
use crate::os::reactor::reactor;
use crate::suspend::Continuation;
use crate::sync::{CancelGuard, CancellationToken};

/// An owned OS wait object: a pollable file descriptor.
///
/// Any descriptor that signals readability can back one; the process and
/// configuration bridges feed in `pidfd` and `inotify` descriptors.
/// [`WaitHandle::event`] creates a free-standing `eventfd(2)`-backed handle
/// that can be signaled manually.
#[derive(Debug)]
pub struct WaitHandle {
    fd: OwnedFd,
}

impl WaitHandle {
    /// Creates a manually signalable wait handle backed by `eventfd(2)`.
    pub fn event() -> Result<WaitHandle> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd == -1 {
            return Err(Error::last_os("eventfd"));
        }
        Ok(WaitHandle {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Signals an event-backed handle, releasing a pending [`Wait`].
    pub fn signal(&self) -> Result<()> {
        let one: u64 = 1;
        let n = unsafe { libc::write(self.fd.as_raw_fd(), (&raw const one).cast(), 8) };
        if n != 8 {
            return Err(Error::last_os("write"));
        }
        Ok(())
    }
}

impl From<OwnedFd> for WaitHandle {
    fn from(fd: OwnedFd) -> Self {
        WaitHandle { fd }
    }
}

impl AsRawFd for WaitHandle {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.fd.as_raw_fd()
    }
}

// Resolution states latched into `WaitShared::state`.
const PENDING: u8 = 0;
const SIGNALED: u8 = 1;
const CANCELLED: u8 = 2;

/// State shared with the reactor and cancellation continuations.
///
/// Deliberately free of OS resources: the continuations that hold it may run
/// after the owning future was dropped and its resources released.
#[derive(Debug)]
struct WaitShared {
    state: AtomicU8,
    waker: Mutex<Option<Waker>>,
}

impl WaitShared {
    /// Latches `outcome` if still pending and wakes the waiter. First
    /// resolution wins; the losing path is a no-op.
    fn resolve(&self, outcome: u8) {
        if self
            .state
            .compare_exchange(PENDING, outcome, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let waker = self.waker.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

/// Exclusive owner of one wait handle, its reactor registration, and the
/// optional cancellation subscription. All three are released together,
/// exactly once, on the first of signal, cancellation, or drop.
struct WaitSubscription {
    fd: Option<OwnedFd>,
    token: u64,
    cancel_guard: Option<CancelGuard>,
    released: bool,
}

impl WaitSubscription {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(fd) = self.fd.take() {
            if let Ok(reactor) = reactor() {
                reactor.deregister(fd.as_raw_fd(), self.token);
            }
            // Closing the fd evicts it from the epoll interest list; close
            // failures are swallowed after this best-effort release.
        }
        self.cancel_guard = None;
    }
}

impl fmt::Debug for WaitSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSubscription")
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

/// Future that completes when its wait handle is signaled, or resolves
/// `Err(Cancelled)` if the cancellation token fires first. Whichever
/// happens first wins, exactly once.
///
/// The handle is owned by the future; no other component may close it.
/// Dropping an unresolved `Wait` deregisters and closes everything: no
/// leak, no dangling reactor entry.
#[derive(Debug)]
pub struct Wait {
    shared: Arc<WaitShared>,
    sub: WaitSubscription,
}

impl Wait {
    /// Adapts `handle` into a future. A failed native registration surfaces
    /// here, synchronously, and closes the handle.
    ///
    /// If `cancel` is already cancelled the returned future resolves
    /// `Err(Cancelled)` on first poll without waiting.
    pub fn new(handle: WaitHandle, cancel: Option<&CancellationToken>) -> Result<Wait> {
        let shared = Arc::new(WaitShared {
            state: AtomicU8::new(PENDING),
            waker: Mutex::new(None),
        });

        let on_signal = {
            let shared = Arc::clone(&shared);
            Continuation::detached(move || shared.resolve(SIGNALED))
        };
        // On failure `handle` drops here, closing the fd: nothing leaks.
        let token = reactor()?.register(handle.fd.as_raw_fd(), on_signal)?;

        let cancel_guard = cancel.map(|cancel| {
            let shared = Arc::clone(&shared);
            cancel.on_cancelled(Continuation::detached(move || shared.resolve(CANCELLED)))
        });

        Ok(Wait {
            shared,
            sub: WaitSubscription {
                fd: Some(handle.fd),
                token,
                cancel_guard,
                released: false,
            },
        })
    }

    #[cfg(test)]
    pub(crate) fn reactor_token(&self) -> u64 {
        self.sub.token
    }
}

impl Future for Wait {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // Publish the waker before re-reading the state so a resolution
        // racing with this poll either sees the waker or is seen by us.
        *this.shared.waker.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(cx.waker().clone());

        match this.shared.state.load(Ordering::Acquire) {
            PENDING => Poll::Pending,
            SIGNALED => {
                this.sub.release();
                Poll::Ready(Ok(()))
            }
            _ => {
                this.sub.release();
                Poll::Ready(Err(Error::Cancelled))
            }
        }
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        self.sub.release();
    }
}
