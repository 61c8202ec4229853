use std::fmt;
use std::future::Future;
use std::os::unix::io::{FromRawFd, OwnedFd};
use std::pin::Pin;
use std::process::Child;
use std::task::{Context, Poll};

use crate::error::{Error, Result};
use crate::os::wait::{Wait, WaitHandle};
use crate::sync::CancellationToken;

/// Produces a future that resolves with `child`'s exit code once it exits.
///
/// The subscription is a `pidfd_open(2)` descriptor, readable on exit, also
/// for a child that already exited before this call (it stays a zombie until
/// reaped, and the pidfd of a zombie signals immediately), so the
/// exited-before-subscribing race cannot miss the notification.
///
/// The exit status is read with `WNOWAIT`, leaving the child reapable:
/// `Child::wait` still works afterwards, and remains the caller's job.
/// Cancelling resolves the future `Err(Cancelled)` and does **not** touch
/// the process.
pub fn on_exit(child: &Child, cancel: Option<&CancellationToken>) -> Result<ChildExit> {
    let pid = child.id() as libc::pid_t;

    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) };
    if fd == -1 {
        return Err(Error::last_os("pidfd_open"));
    }
    let handle = WaitHandle::from(unsafe { OwnedFd::from_raw_fd(fd as i32) });

    Ok(ChildExit {
        wait: Wait::new(handle, cancel)?,
        pid,
    })
}

/// Future resolving with a child process's exit code. See [`on_exit`].
pub struct ChildExit {
    wait: Wait,
    pid: libc::pid_t,
}

impl ChildExit {
    /// Reads the exit status of the now-zombie child without reaping it.
    fn exit_code(&self) -> Result<i32> {
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                self.pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
            )
        };
        if rc == -1 {
            return Err(Error::last_os("waitid"));
        }

        let status = unsafe { info.si_status() };
        match info.si_code {
            libc::CLD_EXITED => Ok(status),
            // Terminated by signal: report the conventional 128 + signo.
            _ => Ok(128 + status),
        }
    }
}

impl Future for ChildExit {
    type Output = Result<i32>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.wait).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => Poll::Ready(self.exit_code()),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
        }
    }
}

impl fmt::Debug for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildExit").field("pid", &self.pid).finish()
    }
}
