use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BoxError;

/// A resumable unit of work, advanced one step at a time.
///
/// This is the only capability a runner needs from the work it drives. Hand-written state
/// machines implement it directly:
///
/// ```
/// use pooled_task::{Automaton, Cx, Step};
///
/// struct Countdown(u32);
///
/// impl Automaton for Countdown {
///     type Output = &'static str;
///
///     fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<&'static str> {
///         if self.0 == 0 {
///             return Step::Complete("liftoff");
///         }
///         self.0 -= 1;
///         Step::Yield
///     }
/// }
/// ```
///
/// An automaton that yields must arrange to be advanced again, usually by handing
/// [`Cx::advance`] to whatever it is waiting on. Automatons must also tolerate spurious
/// advances: a step may run even though nothing it waits on has changed.
pub trait Automaton: Send + 'static {
    /// Value produced when the automaton completes.
    type Output: Send + 'static;

    /// Runs one step.
    fn advance(&mut self, cx: &mut Cx<'_>) -> Step<Self::Output>;
}

/// Outcome of one [`Automaton::advance`] call.
#[derive(Debug)]
pub enum Step<T> {
    /// Suspended; will be advanced again later.
    Yield,
    /// Finished with a value.
    Complete(T),
    /// Finished with a fault.
    Fault(BoxError),
    /// Finished by cancellation.
    Canceled,
}

impl<T> Step<T> {
    /// Returns `true` unless this is [`Step::Yield`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Step::Yield)
    }
}

/// Context passed to [`Automaton::advance`].
pub struct Cx<'a> {
    advance: &'a Advance,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(advance: &'a Advance) -> Cx<'a> {
        Cx { advance }
    }

    /// Returns the callback that advances this automaton again.
    pub fn advance(&self) -> Advance {
        self.advance.clone()
    }
}

impl fmt::Debug for Cx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx").field("advance", self.advance).finish()
    }
}

/// The type-erased half of a runner that an [`Advance`] points at.
pub(crate) trait RawAdvance: Send + Sync {
    /// Steps the bound automaton once. `advance` is the handle being run; its token names the
    /// operation it was created for.
    fn run(self: Arc<Self>, advance: &Advance) -> bool;

    /// Name of the automaton type, for logs.
    fn shape(&self) -> &'static str;
}

/// The callback that steps an automaton.
///
/// This is what a scheduler receives: push it into a queue, defer it to the next frame, or run it
/// on the spot. Clones refer to the same operation, and a handle kept after its operation has
/// finished does nothing, even once the runner serves another operation.
///
/// [`run`] never blocks on a step already in progress on another thread, nor recurses into one
/// in progress on this thread. Instead the running step is repeated once it returns.
///
/// [`run`]: Advance::run
#[derive(Clone)]
pub struct Advance {
    raw: Arc<dyn RawAdvance>,
    token: u32,
}

impl Advance {
    pub(crate) fn new(raw: Arc<dyn RawAdvance>, token: u32) -> Advance {
        Advance { raw, token }
    }

    pub(crate) fn token(&self) -> u32 {
        self.token
    }

    /// Steps the automaton.
    ///
    /// Returns `true` if a step actually ran on this call. Returns `false` if the operation has
    /// already completed or been returned to its pool, or if the step was handed over to a run
    /// already in progress.
    pub fn run(&self) -> bool {
        self.raw.clone().run(self)
    }

    /// Returns `true` if both handles point at the same runner, whichever operation they belong
    /// to.
    pub fn ptr_eq(&self, other: &Advance) -> bool {
        Arc::as_ptr(&self.raw) as *const () == Arc::as_ptr(&other.raw) as *const ()
    }
}

impl fmt::Debug for Advance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advance")
            .field("shape", &self.raw.shape())
            .field("token", &self.token)
            .finish()
    }
}

/// The automaton slot shared by both runner kinds.
pub(crate) struct Slot<A> {
    automaton: Mutex<Option<A>>,
    rerun: AtomicBool,

    /// Set under the lock once the automaton has taken a terminal step.
    finished: AtomicBool,
}

impl<A: Automaton> Slot<A> {
    pub(crate) const fn new() -> Slot<A> {
        Slot {
            automaton: parking_lot::const_mutex(None),
            rerun: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    pub(crate) fn bind(&self, automaton: A) {
        let mut slot = self.automaton.lock();
        self.rerun.store(false, Ordering::Relaxed);
        self.finished.store(false, Ordering::Relaxed);
        *slot = Some(automaton);
    }

    /// Removes the automaton. The caller drops it outside of any lock.
    pub(crate) fn clear(&self) -> Option<A> {
        let mut slot = self.automaton.lock();
        self.rerun.store(false, Ordering::Relaxed);
        self.finished.store(true, Ordering::Relaxed);
        slot.take()
    }

    /// Steps the automaton until it stops asking to be rerun.
    ///
    /// `live` is checked under the slot lock before every step; once it reports `false` nothing
    /// runs. Nothing runs after a terminal step either, even before the runner has recorded it.
    /// Returns `None` if no step ran, otherwise the last step taken.
    pub(crate) fn drive(
        &self,
        advance: &Advance,
        live: impl Fn() -> bool,
    ) -> Option<Step<A::Output>> {
        // Announce the request before trying the lock, so that a holder about to release it
        // notices and steps again on our behalf.
        self.rerun.store(true, Ordering::Release);

        let mut last = None;
        loop {
            let step = {
                let mut guard = match self.automaton.try_lock() {
                    Some(guard) => guard,
                    None => return last,
                };
                self.rerun.store(false, Ordering::Release);

                if self.finished.load(Ordering::Relaxed) || !live() {
                    return last;
                }
                let automaton = match guard.as_mut() {
                    Some(automaton) => automaton,
                    None => return last,
                };
                // A panicking automaton is never stepped again.
                let on_panic = Guard(&self.finished);
                let step = automaton.advance(&mut Cx::new(advance));
                mem::forget(on_panic);

                if step.is_terminal() {
                    self.finished.store(true, Ordering::Relaxed);
                }
                step
            };

            if step.is_terminal() {
                return Some(step);
            }
            last = Some(step);

            if !self.rerun.swap(false, Ordering::AcqRel) {
                return last;
            }
        }
    }
}

/// A guard that marks the slot finished if stepping its automaton panics.
struct Guard<'a>(&'a AtomicBool);

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl<A> fmt::Debug for Slot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("bound", &self.automaton.try_lock().map(|a| a.is_some()))
            .finish()
    }
}
