use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

use crate::exec::DispatchContext;
use crate::suspend::{Await, Continuation, Suspend};

/// Awaitable that resumes by posting to a captured dispatch context.
///
/// Unlike an executor switch there is no fast path: the post is asynchronous
/// *even when the caller is already inside the context*. Completing
/// synchronously there would let an await-in-a-loop recurse unboundedly and
/// starve every other item queued on the loop, so the awaiter always
/// suspends.
pub fn post_to(context: Arc<dyn DispatchContext>) -> PostTo {
    PostTo {
        context,
        detach: false,
    }
}

/// Configuration value for a context post. See [`post_to`].
#[derive(Clone)]
pub struct PostTo {
    context: Arc<dyn DispatchContext>,
    detach: bool,
}

impl PostTo {
    /// Skips ambient-scope propagation into the continuation.
    pub fn detach_scope(mut self) -> Self {
        self.detach = true;
        self
    }

    /// Produces the single-use awaiter for this post.
    pub fn suspend(&self) -> PostAwaiter {
        PostAwaiter {
            context: Arc::clone(&self.context),
        }
    }
}

impl fmt::Debug for PostTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostTo")
            .field("detach", &self.detach)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for PostTo {
    type Output = ();
    type IntoFuture = Await<PostAwaiter>;

    fn into_future(self) -> Self::IntoFuture {
        let detach = self.detach;
        Await::with_policy(self.suspend(), detach)
    }
}

/// Live suspension point for one context post.
pub struct PostAwaiter {
    context: Arc<dyn DispatchContext>,
}

impl Suspend for PostAwaiter {
    type Output = ();

    /// Always `false`: posting must stay asynchronous regardless of the
    /// calling thread.
    fn is_ready(&self) -> bool {
        false
    }

    fn register(&mut self, cont: Continuation) {
        self.context.post(cont);
    }

    fn take(&mut self) {}
}

impl fmt::Debug for PostAwaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostAwaiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MessageLoop;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn never_ready_from_any_thread() {
        let message_loop = Arc::new(MessageLoop::new());
        let post = post_to(Arc::clone(&message_loop) as Arc<dyn DispatchContext>);

        // Off the loop thread.
        assert!(!post.suspend().is_ready());

        // On the loop thread itself.
        let (tx, rx) = mpsc::channel();
        let probe = post.clone();
        message_loop.post(Continuation::detached(move || {
            tx.send(probe.suspend().is_ready()).unwrap();
        }));
        assert!(!rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn registered_continuation_runs_on_the_loop_thread() {
        let message_loop = Arc::new(MessageLoop::new());
        let (tx, rx) = mpsc::channel();

        // Learn the loop's thread id.
        let (id_tx, id_rx) = mpsc::channel();
        message_loop.post(Continuation::detached(move || {
            id_tx.send(std::thread::current().id()).unwrap();
        }));
        let loop_thread = id_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let mut awaiter =
            post_to(Arc::clone(&message_loop) as Arc<dyn DispatchContext>).suspend();
        awaiter.register(Continuation::detached(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), loop_thread);
    }
}
