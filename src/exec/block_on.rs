use std::future::{Future, IntoFuture};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

/// Waker that unparks the thread that created it.
///
/// The `notified` flag absorbs wakes that arrive between a `Pending` poll and
/// the park, so a wake is never lost to the park/unpark race.
#[derive(Debug)]
struct Unparker {
    thread: Thread,
    notified: AtomicBool,
}

impl Wake for Unparker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if !self.notified.swap(true, Ordering::AcqRel) {
            self.thread.unpark();
        }
    }
}

/// Runs `future` to completion on the current thread, parking between polls.
///
/// This is the crate's synchronous edge: tests, demos, and `main` functions
/// drive awaitables through it. It polls exactly one future and is safe to
/// nest (each call parks on its own flag). Accepts anything awaitable, so
/// the crate's `IntoFuture` configuration values can be passed directly.
pub fn block_on<F: IntoFuture>(future: F) -> F::Output {
    let mut future = pin!(future.into_future());

    let unparker = Arc::new(Unparker {
        thread: thread::current(),
        notified: AtomicBool::new(false),
    });
    let waker = Waker::from(Arc::clone(&unparker));
    let mut cx = Context::from_waker(&waker);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        while !unparker.notified.swap(false, Ordering::AcqRel) {
            thread::park();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ready_future_completes_without_parking() {
        assert_eq!(block_on(async { 7 }), 7);
    }

    #[test]
    fn wake_from_another_thread_resumes() {
        struct CrossThread {
            started: bool,
            done: Arc<AtomicBool>,
        }

        impl Future for CrossThread {
            type Output = ();

            fn poll(
                mut self: std::pin::Pin<&mut Self>,
                cx: &mut Context<'_>,
            ) -> Poll<()> {
                if self.done.load(Ordering::Acquire) {
                    return Poll::Ready(());
                }
                if !self.started {
                    self.started = true;
                    let done = Arc::clone(&self.done);
                    let waker = cx.waker().clone();
                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(20));
                        done.store(true, Ordering::Release);
                        waker.wake();
                    });
                }
                Poll::Pending
            }
        }

        block_on(CrossThread {
            started: false,
            done: Arc::new(AtomicBool::new(false)),
        });
    }
}
