use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use intrusive_collections::intrusive_adapter;
use parking_lot::Mutex;

use crate::automaton::{Advance, Automaton, RawAdvance, Slot, Step};
use crate::config::Config;
use crate::error::{BoxError, Error};
use crate::intrusive::{Link, PoolNode};
use crate::registry;
use crate::source::{CompletionSourceCore, Continuation, Source};
use crate::status::Status;
use crate::task::Task;
use crate::tracker::{self, OperationId, Tracked};
use crate::utils::shape_name;

/// Creates an operation whose result can be awaited.
///
/// A pooled runner is bound to `automaton`. The returned [`Advance`] steps the automaton and goes
/// to a scheduler; the returned [`Task`] retrieves the outcome.
///
/// Retrieving the outcome returns the runner to its pool. If that never happens, the runner is
/// returned once every `Advance` and `Task` of the operation has been dropped. An automaton that
/// stores its own `Task` or `Advance` past completion therefore keeps its runner forever.
///
/// # Examples
///
/// ```
/// use pooled_task::{Automaton, Cx, Step};
///
/// struct Add(u32, u32);
///
/// impl Automaton for Add {
///     type Output = u32;
///
///     fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<u32> {
///         Step::Complete(self.0 + self.1)
///     }
/// }
///
/// let (advance, task) = pooled_task::spawn(Add(7, 11));
/// advance.run();
/// assert_eq!(task.result().unwrap(), 18);
/// ```
pub fn spawn<A: Automaton>(automaton: A) -> (Advance, Task<A::Output>) {
    let pool = registry::pool::<Runner<A>>(shape_name::<A>());

    if let Some(prewarm) = Config::current().get_prewarm() {
        pool.prewarm(prewarm.threshold, prewarm.target, || Arc::new(Runner::new()));
    }

    let runner = match pool.try_acquire() {
        Some(runner) => runner,
        None => {
            tracing::trace!(shape = shape_name::<A>(), "creating runner");
            Arc::new(Runner::new())
        }
    };

    let token = runner.core.version();
    tracker::track(Tracked {
        id: OperationId::of(&*runner),
        token: Some(token),
        shape: shape_name::<A>(),
    });
    runner.slot.bind(automaton);

    let net = Arc::new(SafetyNet { runner, token });
    let advance = Advance::new(net.clone(), token);
    (advance, Task::new(net, token))
}

/// Runner for automatons with a result.
pub(crate) struct Runner<A: Automaton> {
    link: Link,
    slot: Slot<A>,
    core: CompletionSourceCore<A::Output>,

    /// Version of the last operation handed back to the pool. Starts one behind version 0.
    last_version_returned: AtomicU32,

    /// Replacement value for a canceled outcome, set when the consumer silenced cancellation.
    silence: Mutex<Option<fn() -> A::Output>>,
}

impl<A: Automaton> Runner<A> {
    fn new() -> Runner<A> {
        Runner {
            link: Link::new(),
            slot: Slot::new(),
            core: CompletionSourceCore::new(),
            last_version_returned: AtomicU32::new(u32::MAX),
            silence: Mutex::new(None),
        }
    }

    fn is_live(&self, token: u32) -> bool {
        self.core.version() == token && self.core.unsafe_status() == Status::Pending
    }

    /// Finalizes the operation identified by `token` and offers the runner to its pool.
    ///
    /// Returns `true` if this call performed the return. A full pool simply drops the runner.
    ///
    /// Only the operation identified by `token` can be returned: the watermark moves from
    /// `token - 1` to `token` exactly once, so a duplicate or stale attempt fails the exchange.
    fn try_return(self: &Arc<Self>, token: u32) -> bool {
        if self
            .last_version_returned
            .compare_exchange(
                token.wrapping_sub(1),
                token,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        tracker::untrack(OperationId::of(&**self));
        let automaton = self.slot.clear();
        *self.silence.lock() = None;
        self.core.reset();
        drop(automaton);

        tracing::trace!(shape = shape_name::<A>(), token, "returning runner");
        let pool = registry::pool::<Runner<A>>(shape_name::<A>());
        pool.try_release(self.clone());
        true
    }

    fn result(self: &Arc<Self>, token: u32) -> Result<A::Output, Error> {
        let status = self.core.status(token)?;
        if status == Status::Pending {
            return Err(Error::NotReady);
        }

        let silenced = *self.silence.lock();
        let outcome = match silenced {
            Some(fallback) if status == Status::Canceled => Ok(fallback()),
            _ => self.core.result(token),
        };

        self.try_return(token);
        outcome
    }
}

intrusive_adapter!(
    pub(crate) RunnerAdapter<A> = Arc<Runner<A>>: Runner<A> { link: Link } where A: Automaton
);

impl<A: Automaton> PoolNode for Runner<A> {
    type Adapter = RunnerAdapter<A>;

    fn link(&self) -> &Link {
        &self.link
    }
}

impl<A: Automaton> fmt::Debug for Runner<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("shape", &shape_name::<A>())
            .field("core", &self.core)
            .field(
                "last_version_returned",
                &self.last_version_returned.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// Per-operation guard shared by every [`Advance`] and [`Task`] of one operation.
///
/// Dropping the last of them without the result having been retrieved returns the runner.
struct SafetyNet<A: Automaton> {
    runner: Arc<Runner<A>>,
    token: u32,
}

impl<A: Automaton> Drop for SafetyNet<A> {
    fn drop(&mut self) {
        if self.runner.core.version() != self.token {
            return;
        }

        if let Some(error) = self.runner.core.take_unobserved() {
            tracing::warn!(shape = shape_name::<A>(), %error, "fault was never observed");
        }
        if self.runner.try_return(self.token) {
            tracing::debug!(
                shape = shape_name::<A>(),
                token = self.token,
                "reclaimed abandoned operation"
            );
        }
    }
}

impl<A: Automaton> RawAdvance for SafetyNet<A> {
    fn run(self: Arc<Self>, advance: &Advance) -> bool {
        let runner = &self.runner;
        let token = self.token;

        if !runner.is_live(token) {
            tracing::debug!(shape = shape_name::<A>(), token, "ignoring stale advance");
            return false;
        }

        // Faults the operation if the automaton panics, before the panic propagates.
        let guard = Guard(&runner.core);
        let step = runner.slot.drive(advance, || runner.is_live(token));
        mem::forget(guard);

        let step = match step {
            Some(step) => step,
            None => return false,
        };

        // The slot lock is released here, so a continuation that retrieves the result inline
        // can return the runner.
        match step {
            Step::Yield => {}
            Step::Complete(value) => {
                runner.core.try_set_result(value);
            }
            Step::Fault(error) => {
                runner.core.try_set_exception(error);
            }
            Step::Canceled => {
                runner.core.try_set_canceled();
            }
        }
        true
    }

    fn shape(&self) -> &'static str {
        shape_name::<A>()
    }
}

/// A guard that faults the operation if stepping its automaton panics.
struct Guard<'a, T>(&'a CompletionSourceCore<T>);

impl<T> Drop for Guard<'_, T> {
    fn drop(&mut self) {
        tracing::error!("automaton panicked; faulting the operation");
        self.0.try_set_exception(BoxError::from("automaton panicked"));
    }
}

impl<A: Automaton> Source for SafetyNet<A> {
    type Output = A::Output;

    fn status(&self, token: u32) -> Result<Status, Error> {
        self.runner.core.status(token)
    }

    fn unsafe_status(&self) -> Status {
        self.runner.core.unsafe_status()
    }

    fn on_completed(&self, continuation: Continuation, token: u32) -> Result<(), Error> {
        self.runner.core.on_completed(continuation, token)
    }

    fn result(&self, token: u32) -> Result<A::Output, Error> {
        self.runner.result(token)
    }

    fn silence_cancellation(&self, token: u32, fallback: fn() -> A::Output) -> Result<(), Error> {
        let mut silence = self.runner.silence.lock();
        self.runner.core.status(token)?;
        *silence = Some(fallback);
        Ok(())
    }
}
