//! A single-threaded scheduler fed through a channel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use once_cell::sync::Lazy;
use pooled_task::{Advance, Automaton, Cx, Status, Step, Task};
use smol::future;

/// Hands an advance callback to the scheduler thread.
fn schedule(advance: Advance) {
    // A channel that holds scheduled callbacks.
    static QUEUE: Lazy<flume::Sender<Advance>> = Lazy::new(|| {
        let (sender, receiver) = flume::unbounded::<Advance>();

        // Start the scheduler thread.
        thread::spawn(|| {
            for advance in receiver {
                // Ignore panics for simplicity.
                let _ignore_panic = catch_unwind(AssertUnwindSafe(|| advance.run()));
            }
        });

        sender
    });

    QUEUE.send(advance).unwrap();
}

/// Counts down, rescheduling itself after every step.
struct Countdown(u32);

impl Automaton for Countdown {
    type Output = u32;

    fn advance(&mut self, cx: &mut Cx<'_>) -> Step<u32> {
        if self.0 == 0 {
            return Step::Complete(42);
        }
        println!("countdown: {}", self.0);
        self.0 -= 1;
        schedule(cx.advance());
        Step::Yield
    }
}

/// Waits for a countdown and reports its result.
struct Report {
    task: Option<Task<u32>>,
    done: flume::Sender<u32>,
}

impl Automaton for Report {
    type Output = ();

    fn advance(&mut self, cx: &mut Cx<'_>) -> Step<()> {
        let task = match &self.task {
            Some(task) => task,
            None => {
                let (advance, task) = pooled_task::spawn(Countdown(3));
                if let Err(err) = task.on_completed(cx.advance()) {
                    return Step::Fault(err.into());
                }
                schedule(advance);
                self.task = Some(task);
                return Step::Yield;
            }
        };

        match task.status() {
            Ok(Status::Pending) => Step::Yield,
            Ok(_) => match task.result() {
                Ok(value) => {
                    let _ = self.done.send(value);
                    Step::Complete(())
                }
                Err(err) => Step::Fault(err.into()),
            },
            Err(err) => Step::Fault(err.into()),
        }
    }
}

fn main() {
    // Await a result from the main thread.
    let (advance, task) = pooled_task::spawn(Countdown(2));
    schedule(advance);
    println!("first countdown: {}", future::block_on(task).unwrap());

    // The second operation reuses the runner the first one returned.
    let (advance, task) = pooled_task::spawn(Countdown(1));
    schedule(advance);
    println!("second countdown: {}", future::block_on(task).unwrap());

    // A fire-and-forget operation waiting on another one.
    let (done, finished) = flume::bounded(1);
    schedule(pooled_task::spawn_void(Report { task: None, done }));
    println!("reported countdown: {}", finished.recv().unwrap());

    println!("pools: {:?}", pooled_task::pool_sizes());
}
