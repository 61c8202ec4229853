use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Once, OnceLock};
use std::thread;

use crate::error::{Error, Result};
use crate::suspend::Continuation;

/// Process-wide `epoll(7)` reactor.
///
/// One lazily started thread blocks in `epoll_wait`; bridges register a file
/// descriptor plus a continuation and get back a token. Every registration
/// is one-shot: on the first event the entry is removed under the reactor
/// lock and its continuation runs on the reactor thread, so dispatch and
/// deregistration cannot both claim the same entry.
///
/// The reactor never closes a registered descriptor; descriptors stay
/// exclusively owned by the subscription that registered them.
#[derive(Debug)]
pub(crate) struct Reactor {
    epoll_fd: RawFd,
    entries: Mutex<HashMap<u64, Continuation>>,
    next_token: AtomicU64,
}

/// Returns the reactor, initializing it and its thread on first use.
/// Initialization failure is sticky: every caller sees the same OS error.
pub(crate) fn reactor() -> Result<&'static Reactor> {
    static REACTOR: OnceLock<Result<Reactor>> = OnceLock::new();
    static START: Once = Once::new();

    let reactor = REACTOR
        .get_or_init(Reactor::init)
        .as_ref()
        .map_err(Error::clone)?;

    START.call_once(|| {
        thread::Builder::new()
            .name("repose-reactor".to_owned())
            .spawn(move || reactor.run())
            .expect("failed to spawn reactor thread");
    });

    Ok(reactor)
}

impl Reactor {
    /// Events fetched per `epoll_wait` round.
    const MAX_EVENTS: i32 = 64;

    fn init() -> Result<Reactor> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd == -1 {
            return Err(Error::last_os("epoll_create1"));
        }

        Ok(Reactor {
            epoll_fd,
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        })
    }

    /// Registers `fd` for readability, scheduling `cont` to run once on the
    /// first event. A failed native registration surfaces immediately and
    /// leaves no entry behind.
    pub(crate) fn register(&self, fd: RawFd, cont: Continuation) -> Result<u64> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        self.lock_entries().insert(token, cont);

        let mut ev = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLONESHOT) as u32,
            u64: token,
        };
        if unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut ev) } == -1 {
            let err = Error::last_os("epoll_ctl");
            self.lock_entries().remove(&token);
            return Err(err);
        }

        Ok(token)
    }

    /// Removes a registration that has not fired. A no-op if the event
    /// already dispatched (the one-shot removal won the race). Callers close
    /// the descriptor afterwards, which evicts it from the interest list.
    pub(crate) fn deregister(&self, fd: RawFd, token: u64) {
        if self.lock_entries().remove(&token).is_some() {
            // Best-effort: the fd may be gone already.
            let mut ev = libc::epoll_event { events: 0, u64: 0 };
            unsafe {
                libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, &mut ev);
            }
        }
    }

    /// Whether a registration is still pending, for leak assertions in
    /// tests. Token-keyed so concurrent tests cannot disturb each other.
    #[cfg(test)]
    pub(crate) fn is_registered(&self, token: u64) -> bool {
        self.lock_entries().contains_key(&token)
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Continuation>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self) -> ! {
        let mut events =
            [libc::epoll_event { events: 0, u64: 0 }; Self::MAX_EVENTS as usize];

        loop {
            let ready = unsafe {
                libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), Self::MAX_EVENTS, -1)
            };
            if ready == -1 {
                let errno = std::io::Error::last_os_error();
                if errno.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                panic!("epoll_wait failed: {errno}");
            }

            for ev in events.iter().take(ready as usize) {
                // Copy out of the packed struct before taking a reference.
                let token = ev.u64;
                // A stale event for an entry that was deregistered (or
                // already dispatched) finds nothing and is discarded.
                let cont = self.lock_entries().remove(&token);
                if let Some(cont) = cont {
                    cont.run();
                }
            }
        }
    }
}
