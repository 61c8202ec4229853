use std::fmt;
use std::sync::{Mutex, mpsc};
use std::thread;

use crate::suspend::Continuation;

/// A captured dispatch target: a single-threaded message-loop-like sink for
/// posted continuations.
///
/// Unlike [`Executor`](super::Executor), a dispatch context has no identity:
/// posting is *always* asynchronous, even from inside the context itself, so
/// identity is never consulted. Implementations must accept posts from any
/// thread.
pub trait DispatchContext: Send + Sync {
    /// Queues `work` to run on the context. Must not run it synchronously.
    /// A context that has stopped may drop `work` instead of running it;
    /// posting to a stopped context is not an error.
    fn post(&self, work: Continuation);
}

/// A dedicated single-threaded message loop implementing [`DispatchContext`].
///
/// Continuations run strictly in post order on one owned thread. Dropping the
/// loop stops accepting work, drains what was already queued, and joins the
/// thread.
pub struct MessageLoop {
    tx: Mutex<Option<mpsc::Sender<Continuation>>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MessageLoop {
    /// Starts the loop thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<Continuation>();
        let worker = thread::Builder::new()
            .name("repose-loop".to_owned())
            .spawn(move || {
                for work in rx {
                    work.run();
                }
            })
            .expect("failed to spawn message loop thread");

        MessageLoop {
            tx: Mutex::new(Some(tx)),
            worker: Some(worker),
        }
    }
}

impl DispatchContext for MessageLoop {
    fn post(&self, work: Continuation) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = tx.as_ref() {
            // Send only fails once the loop has shut down; posted work is
            // dropped then, matching a stopped message loop.
            let _ = tx.send(work);
        }
    }
}

impl Default for MessageLoop {
    fn default() -> Self {
        MessageLoop::new()
    }
}

impl Drop for MessageLoop {
    fn drop(&mut self) {
        // Closing the channel lets the loop thread drain and exit.
        self.tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl fmt::Debug for MessageLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLoop").finish_non_exhaustive()
    }
}
