//! Configuration-key change notifications.
//!
//! A "configuration key" here is a node in a file-backed configuration
//! store: a file holding one key's value, or a directory holding a key's
//! children. The bridge arms a native one-shot change notification against
//! the node and hands back a future that completes on the first qualifying
//! change, on cancellation, or when the node disappears.
//!
//! Platform-restricted: Linux backs it with `inotify(7)`. On other hosts
//! [`watch_key`] fails with [`Error::Unsupported`] before attempting any
//! native call.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{Error, Result};
use crate::sync::CancellationToken;

/// Filter describing which kinds of change complete a [`KeyWatch`].
///
/// Combine with `|`. Kinds that do not apply to the watched node (entry
/// changes on a plain file, say) simply never fire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChangeKinds(u32);

impl ChangeKinds {
    /// The key's value changed (contents written).
    pub const CONTENTS: ChangeKinds = ChangeKinds(1);
    /// Child keys appeared, disappeared, or were renamed. Only observed
    /// when watching with `watch_children`.
    pub const ENTRIES: ChangeKinds = ChangeKinds(1 << 1);
    /// Metadata changed (permissions, ownership, timestamps).
    pub const ATTRIBUTES: ChangeKinds = ChangeKinds(1 << 2);
    /// The key itself was deleted or moved away.
    pub const REMOVAL: ChangeKinds = ChangeKinds(1 << 3);
    /// Every kind of change.
    pub const ANY: ChangeKinds = ChangeKinds((1 << 4) - 1);

    /// Whether every kind in `other` is included in `self`.
    pub fn contains(self, other: ChangeKinds) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ChangeKinds {
    type Output = ChangeKinds;

    fn bitor(self, rhs: ChangeKinds) -> ChangeKinds {
        ChangeKinds(self.0 | rhs.0)
    }
}

/// Arms a one-shot change notification on the configuration key at `path`.
///
/// `watch_children` extends the watch to the key's direct children (entry
/// creation, deletion, renames); without it only the key node itself is
/// observed. `kinds` filters which changes qualify.
///
/// Fails with [`Error::Unsupported`] on platforms without a native change
/// notification facility (checked before any OS call), and with
/// [`Error::Os`] when the native registration itself reports a non-zero
/// status (key missing, descriptor exhaustion).
///
/// On success the future completes `Ok(())` on the first qualifying change,
/// `Err(Cancelled)` if `cancel` fires first, and also completes when the
/// watched node is removed from under the watch (the notification handle is
/// signaled on eviction).
pub fn watch_key(
    path: &Path,
    watch_children: bool,
    kinds: ChangeKinds,
    cancel: Option<&CancellationToken>,
) -> Result<KeyWatch> {
    imp::watch_key(path, watch_children, kinds, cancel)
}

/// Future produced by [`watch_key`].
pub struct KeyWatch {
    inner: imp::Inner,
}

impl Future for KeyWatch {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        imp::poll(&mut self.inner, cx)
    }
}

impl fmt::Debug for KeyWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyWatch").finish_non_exhaustive()
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use super::ChangeKinds;
    use crate::error::{Error, Result};
    use crate::os::wait::{Wait, WaitHandle};
    use crate::sync::CancellationToken;
    use std::ffi::CString;
    use std::future::Future;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
    use std::path::Path;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    pub(super) type Inner = Wait;

    /// Maps the abstract filter onto an inotify mask. `IN_ONESHOT` keeps
    /// the native semantics aligned with the future's: one change, one
    /// completion.
    fn mask_for(kinds: ChangeKinds, watch_children: bool) -> u32 {
        let mut mask = libc::IN_ONESHOT;
        if kinds.contains(ChangeKinds::CONTENTS) {
            mask |= libc::IN_MODIFY | libc::IN_CLOSE_WRITE;
        }
        if watch_children && kinds.contains(ChangeKinds::ENTRIES) {
            mask |= libc::IN_CREATE | libc::IN_DELETE | libc::IN_MOVED_FROM | libc::IN_MOVED_TO;
        }
        if kinds.contains(ChangeKinds::ATTRIBUTES) {
            mask |= libc::IN_ATTRIB;
        }
        if kinds.contains(ChangeKinds::REMOVAL) {
            mask |= libc::IN_DELETE_SELF | libc::IN_MOVE_SELF;
        }
        mask
    }

    pub(super) fn watch_key(
        path: &Path,
        watch_children: bool,
        kinds: ChangeKinds,
        cancel: Option<&CancellationToken>,
    ) -> Result<super::KeyWatch> {
        let fd = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if fd == -1 {
            return Err(Error::last_os("inotify_init1"));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::Os {
            op: "inotify_add_watch",
            code: libc::EINVAL,
        })?;
        let wd = unsafe {
            libc::inotify_add_watch(
                fd.as_raw_fd(),
                c_path.as_ptr(),
                mask_for(kinds, watch_children),
            )
        };
        if wd == -1 {
            // `fd` drops and closes here.
            return Err(Error::last_os("inotify_add_watch"));
        }

        Ok(super::KeyWatch {
            inner: Wait::new(WaitHandle::from(fd), cancel)?,
        })
    }

    pub(super) fn poll(inner: &mut Inner, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(inner).poll(cx)
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::ChangeKinds;
    use crate::error::{Error, Result};
    use crate::sync::CancellationToken;
    use std::path::Path;
    use std::task::{Context, Poll};

    /// Uninhabited: no `KeyWatch` is ever constructed on this platform.
    pub(super) enum Inner {}

    pub(super) fn watch_key(
        _path: &Path,
        _watch_children: bool,
        _kinds: ChangeKinds,
        _cancel: Option<&CancellationToken>,
    ) -> Result<super::KeyWatch> {
        Err(Error::Unsupported(
            "configuration-key change notification",
        ))
    }

    pub(super) fn poll(inner: &mut Inner, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        match *inner {}
    }
}

#[cfg(all(test, not(target_os = "linux")))]
mod tests {
    use super::*;

    #[test]
    fn unsupported_platform_fails_before_any_native_call() {
        let err = watch_key(Path::new("key"), false, ChangeKinds::ANY, None).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::exec::block_on;
    use std::fs;
    use std::thread;
    use std::time::Duration;

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "repose-keywatch-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn completes_when_key_contents_change() {
        let dir = scratch_dir("contents");
        let key = dir.join("endpoint");
        fs::write(&key, "v1").unwrap();

        let watch = watch_key(&key, false, ChangeKinds::CONTENTS, None).unwrap();
        let writer = {
            let key = key.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                fs::write(&key, "v2").unwrap();
            })
        };

        assert_eq!(block_on(watch), Ok(()));
        writer.join().unwrap();
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn completes_when_child_keys_change() {
        let dir = scratch_dir("entries");

        let watch = watch_key(&dir, true, ChangeKinds::ENTRIES, None).unwrap();
        let writer = {
            let dir = dir.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                fs::write(dir.join("new-key"), "v").unwrap();
            })
        };

        assert_eq!(block_on(watch), Ok(()));
        writer.join().unwrap();
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_key_fails_with_structured_os_error() {
        let err = watch_key(
            Path::new("/nonexistent/repose/key"),
            false,
            ChangeKinds::ANY,
            None,
        )
        .unwrap_err();
        match err {
            Error::Os { op, code } => {
                assert_eq!(op, "inotify_add_watch");
                assert_eq!(code, libc::ENOENT);
            }
            other => panic!("expected os error, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_wins_over_a_quiet_key() {
        let dir = scratch_dir("cancel");
        let token = CancellationToken::new();

        let watch = watch_key(&dir, true, ChangeKinds::ANY, Some(&token)).unwrap();
        token.cancel();
        assert_eq!(block_on(watch), Err(Error::Cancelled));
        assert_eq!(token.subscriber_count(), 0);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn filter_excludes_unselected_kinds() {
        let dir = scratch_dir("filter");
        let key = dir.join("endpoint");
        fs::write(&key, "v1").unwrap();

        // Watch attributes only, then change contents: must stay pending,
        // then complete once attributes do change.
        let watch = watch_key(&key, false, ChangeKinds::ATTRIBUTES, None).unwrap();
        let writer = {
            let key = key.clone();
            thread::spawn(move || {
                fs::write(&key, "v2").unwrap();
                thread::sleep(Duration::from_millis(50));
                let perms = fs::metadata(&key).unwrap().permissions();
                fs::set_permissions(&key, perms).unwrap();
            })
        };

        assert_eq!(block_on(watch), Ok(()));
        writer.join().unwrap();
        fs::remove_dir_all(&dir).unwrap();
    }
}
