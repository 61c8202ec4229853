//! Executor affinity in action: hop to the default pool, observe the
//! fast path, and force yield points.

use repose::exec::{self, block_on};
use repose::suspend::{Continuation, Suspend};
use repose::task::{switch_to_pool, yield_now};

fn main() {
    block_on(async {
        // Off the pool: a switch must suspend.
        assert!(!switch_to_pool().suspend().is_ready());
        println!("main thread: not on the pool, switching...");

        switch_to_pool().await;
        println!("resumed after the pool wake (executor: {:?})", exec::current());

        // Forced yield: always suspends, resumes right away.
        yield_now().await;
        println!("back after a forced yield");
    });

    // The contract can also be driven by hand: the continuation itself runs
    // on a pool worker.
    let (tx, rx) = std::sync::mpsc::channel();
    let mut awaiter = switch_to_pool().suspend();
    awaiter.register(Continuation::new(move || {
        tx.send(exec::current()).unwrap();
    }));
    println!("continuation ran on executor {:?}", rx.recv().unwrap());
}
