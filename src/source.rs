use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::Waker;

use parking_lot::Mutex;

use crate::automaton::Advance;
use crate::error::{BoxError, Error};
use crate::status::Status;
use crate::task::Task;
use crate::utils::abort_on_panic;

/// Something to resume once an operation completes.
///
/// This is the callback-plus-state pair of a completion source: either a [`Waker`] belonging to
/// an async executor, or the [`Advance`] handle of an automaton waiting on the operation.
pub enum Continuation {
    /// Wakes an async task.
    Waker(Waker),
    /// Steps an automaton.
    Advance(Advance),
}

impl Continuation {
    /// Wakes the waker, or steps the automaton.
    ///
    /// A panicking waker aborts. A panicking automaton has already faulted its own operation and
    /// the panic propagates to whoever completed this one.
    fn invoke(self) {
        match self {
            Continuation::Waker(w) => abort_on_panic(|| w.wake()),
            Continuation::Advance(a) => {
                a.run();
            }
        }
    }
}

impl From<Waker> for Continuation {
    fn from(waker: Waker) -> Continuation {
        Continuation::Waker(waker)
    }
}

impl From<&Waker> for Continuation {
    fn from(waker: &Waker) -> Continuation {
        Continuation::Waker(waker.clone())
    }
}

impl From<Advance> for Continuation {
    fn from(advance: Advance) -> Continuation {
        Continuation::Advance(advance)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Waker(_) => f.write_str("Continuation::Waker"),
            Continuation::Advance(a) => f.debug_tuple("Continuation::Advance").field(a).finish(),
        }
    }
}

/// The token-checked protocol a [`Task`] speaks to whatever produces its result.
///
/// Every method takes the version token the handle was created with. Sources compare it with
/// their current version and answer [`Error::StaleToken`] on mismatch.
pub trait Source: Send + Sync {
    /// Value produced on success.
    type Output;

    /// Returns the status of the operation identified by `token`.
    fn status(&self, token: u32) -> Result<Status, Error>;

    /// Returns the current status without validating any token.
    ///
    /// Only meant for diagnostics; the answer may belong to a later operation.
    fn unsafe_status(&self) -> Status;

    /// Registers the continuation of the operation identified by `token`.
    ///
    /// If the operation has already completed the continuation runs immediately.
    fn on_completed(&self, continuation: Continuation, token: u32) -> Result<(), Error>;

    /// Takes the outcome of the operation identified by `token`.
    fn result(&self, token: u32) -> Result<Self::Output, Error>;

    /// Asks the source to yield `fallback()` instead of [`Error::Canceled`].
    ///
    /// Sources without discard semantics only validate the token.
    fn silence_cancellation(
        &self,
        token: u32,
        fallback: fn() -> Self::Output,
    ) -> Result<(), Error> {
        let _ = fallback;
        self.status(token).map(|_| ())
    }
}

struct Inner<T> {
    status: Status,
    result: Option<T>,
    error: Option<BoxError>,
    continuation: Option<Continuation>,
}

impl<T> Inner<T> {
    const fn new() -> Inner<T> {
        Inner {
            status: Status::Pending,
            result: None,
            error: None,
            continuation: None,
        }
    }
}

/// A versioned, reusable promise.
///
/// Holds the outcome of one operation at a time together with a single continuation. Each
/// [`reset`] bumps the version, so handles created for an earlier operation are rejected
/// instead of observing a later one.
///
/// Completion is first-writer-wins: every `try_set_*` after the first returns `false` and changes
/// nothing. Completing may happen on any thread. The continuation is always invoked after the
/// internal lock has been released.
///
/// [`reset`]: CompletionSourceCore::reset
pub struct CompletionSourceCore<T> {
    version: AtomicU32,
    inner: Mutex<Inner<T>>,
}

impl<T> CompletionSourceCore<T> {
    /// Creates a pending core at version 0.
    pub fn new() -> CompletionSourceCore<T> {
        CompletionSourceCore {
            version: AtomicU32::new(0),
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Current version token.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Completes the operation with a value.
    pub fn try_set_result(&self, value: T) -> bool {
        self.complete(Status::Succeeded, |inner| inner.result = Some(value))
    }

    /// Completes the operation with a fault.
    pub fn try_set_exception(&self, error: impl Into<BoxError>) -> bool {
        let error = error.into();
        self.complete(Status::Faulted, |inner| inner.error = Some(error))
    }

    /// Completes the operation by cancellation.
    pub fn try_set_canceled(&self) -> bool {
        self.complete(Status::Canceled, |_| {})
    }

    fn complete(&self, status: Status, store: impl FnOnce(&mut Inner<T>)) -> bool {
        let continuation = {
            let mut inner = self.inner.lock();
            if inner.status != Status::Pending {
                return false;
            }
            store(&mut inner);
            inner.status = status;
            inner.continuation.take()
        };

        if let Some(c) = continuation {
            c.invoke();
        }
        true
    }

    /// Returns the status of the operation identified by `token`.
    pub fn status(&self, token: u32) -> Result<Status, Error> {
        let inner = self.inner.lock();
        self.validate(token)?;
        Ok(inner.status)
    }

    /// Returns the current status without validating a token.
    pub fn unsafe_status(&self) -> Status {
        self.inner.lock().status
    }

    /// Registers the single continuation of the current operation.
    ///
    /// A newer registration replaces an older one. When the operation has already completed the
    /// continuation is invoked right away instead of being stored.
    pub fn on_completed(
        &self,
        continuation: impl Into<Continuation>,
        token: u32,
    ) -> Result<(), Error> {
        let continuation = continuation.into();
        let replaced = {
            let mut inner = self.inner.lock();
            self.validate(token)?;
            if inner.status == Status::Pending {
                inner.continuation.replace(continuation)
            } else {
                drop(inner);
                continuation.invoke();
                return Ok(());
            }
        };
        // Dropping an `Advance` may return another runner; keep that outside the lock.
        drop(replaced);
        Ok(())
    }

    /// Takes the outcome of the operation identified by `token`.
    ///
    /// A value or fault is moved out, so a second call for the same operation reports
    /// [`Error::NotReady`]. Cancellation is reported every time.
    pub fn result(&self, token: u32) -> Result<T, Error> {
        let mut inner = self.inner.lock();
        self.validate(token)?;

        match inner.status {
            Status::Pending => Err(Error::NotReady),
            Status::Succeeded => inner.result.take().ok_or(Error::NotReady),
            Status::Faulted => match inner.error.take() {
                Some(error) => Err(Error::Faulted(error)),
                None => Err(Error::NotReady),
            },
            Status::Canceled => Err(Error::Canceled),
        }
    }

    /// Starts the next operation: clears the outcome and the continuation, returns to
    /// [`Status::Pending`] and bumps the version.
    ///
    /// Only the owner may call this, and only once nobody expects the previous version anymore.
    pub fn reset(&self) {
        let stale = {
            let mut inner = self.inner.lock();
            self.version.fetch_add(1, Ordering::AcqRel);
            mem::replace(&mut *inner, Inner::new())
        };
        // Drop the old outcome outside the lock; its destructor may do anything.
        drop(stale);
    }

    /// Takes a fault nobody retrieved, for reporting before a reset.
    pub(crate) fn take_unobserved(&self) -> Option<BoxError> {
        let mut inner = self.inner.lock();
        if inner.status == Status::Faulted {
            inner.error.take()
        } else {
            None
        }
    }

    fn validate(&self, token: u32) -> Result<(), Error> {
        let version = self.version();
        if token != version {
            return Err(Error::StaleToken { token, version });
        }
        Ok(())
    }
}

impl<T: Send + 'static> CompletionSourceCore<T> {
    /// Creates a handle to the current operation.
    pub fn task(self: &Arc<Self>) -> Task<T> {
        let token = self.version();
        Task::new(self.clone(), token)
    }
}

impl<T> Default for CompletionSourceCore<T> {
    fn default() -> CompletionSourceCore<T> {
        CompletionSourceCore::new()
    }
}

impl<T: Send> Source for CompletionSourceCore<T> {
    type Output = T;

    fn status(&self, token: u32) -> Result<Status, Error> {
        CompletionSourceCore::status(self, token)
    }

    fn unsafe_status(&self) -> Status {
        CompletionSourceCore::unsafe_status(self)
    }

    fn on_completed(&self, continuation: Continuation, token: u32) -> Result<(), Error> {
        CompletionSourceCore::on_completed(self, continuation, token)
    }

    fn result(&self, token: u32) -> Result<T, Error> {
        CompletionSourceCore::result(self, token)
    }
}

impl<T> fmt::Debug for CompletionSourceCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CompletionSourceCore")
            .field("version", &self.version())
            .field("status", &inner.status)
            .field("continuation", &inner.continuation.is_some())
            .finish()
    }
}
