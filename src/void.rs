use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use intrusive_collections::intrusive_adapter;

use crate::automaton::{Advance, Automaton, RawAdvance, Slot, Step};
use crate::intrusive::{Link, PoolNode};
use crate::registry;
use crate::tracker::{self, OperationId, Tracked};
use crate::utils::shape_name;

/// Creates a fire-and-forget operation.
///
/// A pooled runner is bound to `automaton` and its [`Advance`] callback is returned. Hand it to a
/// scheduler; the automaton is stepped each time it runs. When the automaton completes the runner
/// goes back to its pool. Faults have nobody to observe them and are logged at error level.
///
/// The same runner is handed out again for a later operation of the same automaton type. Every
/// operation gets a new generation, so an old `Advance` kept past its operation never steps the
/// later one.
///
/// # Examples
///
/// ```
/// use pooled_task::{Automaton, Cx, Step};
///
/// struct Hello;
///
/// impl Automaton for Hello {
///     type Output = ();
///
///     fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
///         println!("Hello, world!");
///         Step::Complete(())
///     }
/// }
///
/// let advance = pooled_task::spawn_void(Hello);
/// assert!(advance.run());
/// assert!(!advance.run());
/// ```
///
/// A panic raised by the automaton propagates out of [`Advance::run`] after the runner has gone
/// back to its pool.
pub fn spawn_void<A>(automaton: A) -> Advance
where
    A: Automaton<Output = ()>,
{
    let pool = registry::pool::<VoidRunner<A>>(shape_name::<A>());

    let runner = match pool.try_acquire() {
        Some(runner) => runner,
        None => {
            tracing::trace!(shape = shape_name::<A>(), "creating void runner");
            Arc::new(VoidRunner::new())
        }
    };

    tracker::track(Tracked {
        id: OperationId::of(&*runner),
        token: None,
        shape: shape_name::<A>(),
    });
    runner.slot.bind(automaton);

    let generation = runner.generation.load(Ordering::Acquire);
    Advance::new(runner, generation)
}

/// Runner for automatons without a result.
pub(crate) struct VoidRunner<A> {
    link: Link,
    slot: Slot<A>,

    /// Bumped every time the runner goes back to its pool.
    generation: AtomicU32,
}

impl<A: Automaton<Output = ()>> VoidRunner<A> {
    fn new() -> VoidRunner<A> {
        VoidRunner {
            link: Link::new(),
            slot: Slot::new(),
            generation: AtomicU32::new(0),
        }
    }

    fn is_live(&self, generation: u32) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn return_to_pool(self: Arc<Self>) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        tracker::untrack(OperationId::of(&*self));
        let automaton = self.slot.clear();
        drop(automaton);

        let pool = registry::pool::<VoidRunner<A>>(shape_name::<A>());
        pool.try_release(self);
    }
}

intrusive_adapter!(
    pub(crate) VoidRunnerAdapter<A> = Arc<VoidRunner<A>>: VoidRunner<A> { link: Link }
);

impl<A> PoolNode for VoidRunner<A> {
    type Adapter = VoidRunnerAdapter<A>;

    fn link(&self) -> &Link {
        &self.link
    }
}

impl<A: Automaton<Output = ()>> RawAdvance for VoidRunner<A> {
    fn run(self: Arc<Self>, advance: &Advance) -> bool {
        let generation = advance.token();
        if !self.is_live(generation) {
            tracing::debug!(shape = shape_name::<A>(), generation, "ignoring stale advance");
            return false;
        }

        // Returns the runner if the automaton panics, before the panic propagates.
        let guard = Guard(&self);
        let step = self.slot.drive(advance, || self.is_live(generation));
        mem::forget(guard);

        let step = match step {
            Some(step) => step,
            None => return false,
        };

        match step {
            Step::Yield => return true,
            Step::Complete(()) => {}
            Step::Fault(error) => {
                tracing::error!(shape = shape_name::<A>(), %error, "unobserved fault in void operation");
            }
            Step::Canceled => {
                tracing::debug!(shape = shape_name::<A>(), "void operation canceled");
            }
        }

        self.return_to_pool();
        true
    }

    fn shape(&self) -> &'static str {
        shape_name::<A>()
    }
}

/// A guard that returns the runner if stepping its automaton panics.
struct Guard<'a, A: Automaton<Output = ()>>(&'a Arc<VoidRunner<A>>);

impl<A: Automaton<Output = ()>> Drop for Guard<'_, A> {
    fn drop(&mut self) {
        tracing::error!(shape = shape_name::<A>(), "void automaton panicked");
        self.0.clone().return_to_pool();
    }
}

impl<A> fmt::Debug for VoidRunner<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoidRunner")
            .field("pooled", &self.link.is_linked())
            .field("slot", &self.slot)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}
