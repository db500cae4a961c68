//! Hooks for diagnostic tracking of in-flight operations.
//!
//! The crate reports every acquire and return to an optional process-wide [`Tracker`]. Tracking is
//! advisory: a tracker that panics is logged and ignored, and the runners behave the same with or
//! without one.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::utils::advisory;

/// Identity of a pooled runner.
///
/// Runners are reused, so an id is only unique together with the operation's version token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(usize);

impl OperationId {
    pub(crate) fn of<T>(runner: &T) -> OperationId {
        OperationId(runner as *const T as usize)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Description of an operation that has just been bound to a runner.
#[derive(Clone, Copy, Debug)]
pub struct Tracked {
    /// The runner.
    pub id: OperationId,
    /// Version token of the operation, `None` for fire-and-forget runners.
    pub token: Option<u32>,
    /// Type name of the automaton.
    pub shape: &'static str,
}

/// Receives acquire and return notifications.
pub trait Tracker: Send + Sync + 'static {
    /// An operation started. `skip_depth` is the number of crate-internal frames above the caller,
    /// for trackers that capture backtraces.
    fn track(&self, op: &Tracked, skip_depth: usize);

    /// The runner went back to its pool (or was dropped).
    fn untrack(&self, id: OperationId);
}

static TRACKER: OnceCell<Box<dyn Tracker>> = OnceCell::new();

/// Installs the process-wide tracker.
///
/// Only the first call succeeds; later calls hand the tracker back.
pub fn set_tracker(tracker: impl Tracker) -> Result<(), Box<dyn Tracker>> {
    TRACKER.set(Box::new(tracker))
}

/// Frames between the user's spawn call and the tracker.
pub(crate) const SKIP_DEPTH: usize = 3;

pub(crate) fn track(op: Tracked) {
    if let Some(tracker) = TRACKER.get() {
        advisory("track", || tracker.track(&op, SKIP_DEPTH));
    }
}

pub(crate) fn untrack(id: OperationId) {
    if let Some(tracker) = TRACKER.get() {
        advisory("untrack", || tracker.untrack(id));
    }
}
