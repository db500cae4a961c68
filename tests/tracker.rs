use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use pooled_task::{Automaton, Cx, OperationId, Step, Tracked, Tracker};

static LIVE: Lazy<Mutex<HashMap<OperationId, Tracked>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static PANIC: AtomicBool = AtomicBool::new(false);

struct Recorder;

impl Tracker for Recorder {
    fn track(&self, op: &Tracked, skip_depth: usize) {
        assert!(skip_depth > 0);
        LIVE.lock().insert(op.id, *op);
        if PANIC.load(Ordering::SeqCst) {
            panic!("tracker failure");
        }
    }

    fn untrack(&self, id: OperationId) {
        LIVE.lock().remove(&id);
    }
}

struct Traced;

impl Automaton for Traced {
    type Output = ();

    fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
        Step::Complete(())
    }
}

struct Fired;

impl Automaton for Fired {
    type Output = ();

    fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
        Step::Complete(())
    }
}

fn live_of(shape: &str) -> Vec<Tracked> {
    LIVE.lock()
        .values()
        .filter(|op| op.shape.contains(shape))
        .copied()
        .collect()
}

// Trackers are process-wide, so everything runs in a single test.
#[test]
fn tracks_acquire_and_return() {
    assert!(pooled_task::set_tracker(Recorder).is_ok());
    assert!(pooled_task::set_tracker(Recorder).is_err());

    // Result runners carry their version token.
    let (advance, task) = pooled_task::spawn(Traced);
    let tracked = live_of("Traced");
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].token, Some(task.token()));

    advance.run();
    task.result().unwrap();
    assert!(live_of("Traced").is_empty());

    // Abandoned operations are untracked when reclaimed.
    let (advance, task) = pooled_task::spawn(Traced);
    assert_eq!(live_of("Traced").len(), 1);
    drop((advance, task));
    assert!(live_of("Traced").is_empty());

    // Void runners have no token.
    let advance = pooled_task::spawn_void(Fired);
    let tracked = live_of("Fired");
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].token, None);
    advance.run();
    assert!(live_of("Fired").is_empty());

    // A panicking tracker does not disturb the runners.
    PANIC.store(true, Ordering::SeqCst);
    let (advance, task) = pooled_task::spawn(Traced);
    PANIC.store(false, Ordering::SeqCst);
    advance.run();
    task.result().unwrap();
    assert!(live_of("Traced").is_empty());
}
