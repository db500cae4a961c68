use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use pooled_task::{Automaton, Cx, Step};

// Creates a void automaton type with event counters.
//
// Usage: `automaton!(Name, ADVANCE, DROP)`
//
// The automaton `Name(n)` yields `n` times and then completes.
// When it gets advanced, `ADVANCE` is incremented.
// When it gets dropped, `DROP` is incremented.
macro_rules! automaton {
    ($name:ident, $advance:ident, $drop:ident) => {
        static $advance: AtomicUsize = AtomicUsize::new(0);
        static $drop: AtomicUsize = AtomicUsize::new(0);

        struct $name(usize);

        impl Automaton for $name {
            type Output = ();

            fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
                $advance.fetch_add(1, Ordering::SeqCst);
                if self.0 == 0 {
                    Step::Complete(())
                } else {
                    self.0 -= 1;
                    Step::Yield
                }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                $drop.fetch_add(1, Ordering::SeqCst);
            }
        }
    };
}

fn resident(needle: &str) -> usize {
    pooled_task::pool_size_of(needle).unwrap().size
}

#[test]
fn completes_and_returns() {
    automaton!(Once, ADVANCE, DROP);

    let advance = pooled_task::spawn_void(Once(0));
    assert_eq!(resident("Once"), 0);

    assert!(advance.run());
    assert_eq!(ADVANCE.load(Ordering::SeqCst), 1);
    assert_eq!(DROP.load(Ordering::SeqCst), 1);
    assert_eq!(resident("Once"), 1);

    assert!(!advance.run());
    assert_eq!(ADVANCE.load(Ordering::SeqCst), 1);
}

#[test]
fn runner_is_reused() {
    automaton!(Again, ADVANCE, DROP);

    let first = pooled_task::spawn_void(Again(0));
    first.run();

    let second = pooled_task::spawn_void(Again(0));
    assert!(first.ptr_eq(&second));
    assert_eq!(resident("Again"), 0);

    second.run();
    assert_eq!(resident("Again"), 1);
    assert_eq!(DROP.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_operations_use_distinct_runners() {
    automaton!(Pair, ADVANCE, DROP);

    let a = pooled_task::spawn_void(Pair(1));
    let b = pooled_task::spawn_void(Pair(1));
    assert!(!a.ptr_eq(&b));

    a.run();
    b.run();
    assert_eq!(DROP.load(Ordering::SeqCst), 0);

    a.run();
    b.run();
    assert_eq!(DROP.load(Ordering::SeqCst), 2);
    assert_eq!(resident("Pair"), 2);
}

#[test]
fn channel_scheduler() {
    automaton!(Queued, ADVANCE, DROP);

    let (sender, receiver) = flume::unbounded();
    let advance = pooled_task::spawn_void(Queued(4));

    sender.send(advance).unwrap();
    while let Ok(advance) = receiver.try_recv() {
        if advance.run() && DROP.load(Ordering::SeqCst) == 0 {
            sender.send(advance).unwrap();
        }
    }

    assert_eq!(ADVANCE.load(Ordering::SeqCst), 5);
    assert_eq!(DROP.load(Ordering::SeqCst), 1);
    assert_eq!(resident("Queued"), 1);
}

#[test]
fn fault_is_logged_and_runner_returned() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    struct Exploding;

    impl Automaton for Exploding {
        type Output = ();

        fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
            Step::Fault("boom".into())
        }
    }

    let advance = pooled_task::spawn_void(Exploding);
    assert!(advance.run());
    assert_eq!(resident("Exploding"), 1);

    assert!(!advance.run());
}

#[test]
fn canceled_returns_runner() {
    struct Abandon;

    impl Automaton for Abandon {
        type Output = ();

        fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
            Step::Canceled
        }
    }

    let advance = pooled_task::spawn_void(Abandon);
    advance.run();
    assert_eq!(resident("Abandon"), 1);
}

#[test]
fn old_advance_is_ignored_by_next_operation() {
    automaton!(Shared, ADVANCE, DROP);

    let old = pooled_task::spawn_void(Shared(0));
    assert!(old.run());

    // The runner is reused, but the old handle belongs to the finished operation.
    let new = pooled_task::spawn_void(Shared(0));
    assert!(old.ptr_eq(&new));
    assert!(!old.run());
    assert_eq!(ADVANCE.load(Ordering::SeqCst), 1);
    assert_eq!(DROP.load(Ordering::SeqCst), 1);

    assert!(new.run());
    assert_eq!(ADVANCE.load(Ordering::SeqCst), 2);
    assert_eq!(DROP.load(Ordering::SeqCst), 2);
}

#[test]
fn panic_returns_runner() {
    static ADVANCE: AtomicUsize = AtomicUsize::new(0);

    struct Shattered;

    impl Automaton for Shattered {
        type Output = ();

        fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
            ADVANCE.fetch_add(1, Ordering::SeqCst);
            panic!("automaton failure");
        }
    }

    let advance = pooled_task::spawn_void(Shattered);
    assert!(catch_unwind(AssertUnwindSafe(|| advance.run())).is_err());
    assert_eq!(resident("Shattered"), 1);

    assert!(!advance.run());
    assert_eq!(ADVANCE.load(Ordering::SeqCst), 1);
}
