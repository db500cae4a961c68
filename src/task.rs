use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::Error;
use crate::source::{Continuation, Source};
use crate::status::Status;

/// A handle to the outcome of one operation.
///
/// The handle pairs a [`Source`] with the version token of the operation it was created for.
/// Everything it does is checked against that token, so a handle kept past its operation fails
/// with [`Error::StaleToken`] instead of seeing whatever the pooled source does next.
///
/// Awaiting the task resolves to the outcome. For a task returned by [`spawn`], retrieving the
/// outcome returns the runner to its pool; clones of the handle then report a stale token.
///
/// [`spawn`]: crate::spawn
#[must_use = "dropping every handle abandons the result; the runner is reclaimed without it"]
pub struct Task<T> {
    source: Arc<dyn Source<Output = T>>,
    token: u32,
}

impl<T> Task<T> {
    pub(crate) fn new(source: Arc<dyn Source<Output = T>>, token: u32) -> Task<T> {
        Task { source, token }
    }

    /// Version token this handle was created with.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Status of the operation.
    pub fn status(&self) -> Result<Status, Error> {
        self.source.status(self.token)
    }

    /// Status of whatever the underlying source is doing now, without token validation.
    pub fn unsafe_status(&self) -> Status {
        self.source.unsafe_status()
    }

    /// Takes the outcome without waiting.
    ///
    /// Fails with [`Error::NotReady`] while the operation is pending.
    pub fn result(&self) -> Result<T, Error> {
        self.source.result(self.token)
    }

    /// Registers what to resume when the operation completes.
    ///
    /// Automatons waiting on a task pass their [`Cx::advance`](crate::Cx::advance) here.
    pub fn on_completed(&self, continuation: impl Into<Continuation>) -> Result<(), Error> {
        self.source.on_completed(continuation.into(), self.token)
    }

    /// Makes a canceled outcome resolve to `T::default()` instead of [`Error::Canceled`].
    ///
    /// Applies to this operation only.
    pub fn silence_cancellation(&self) -> Result<(), Error>
    where
        T: Default,
    {
        self.source.silence_cancellation(self.token, T::default)
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Task<T> {
        Task {
            source: self.source.clone(),
            token: self.token,
        }
    }
}

impl<T> Unpin for Task<T> {}

impl<T> Future for Task<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.source.status(this.token) {
            Err(err) => return Poll::Ready(Err(err)),
            Ok(Status::Pending) => {
                if let Err(err) = this.source.on_completed(cx.waker().into(), this.token) {
                    return Poll::Ready(Err(err));
                }

                // Completion may have raced with registration.
                match this.source.status(this.token) {
                    Ok(Status::Pending) => return Poll::Pending,
                    Ok(_) => {}
                    Err(err) => return Poll::Ready(Err(err)),
                }
            }
            Ok(_) => {}
        }

        Poll::Ready(this.source.result(this.token))
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("token", &self.token)
            .field("status", &self.source.unsafe_status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CompletionSourceCore;

    #[test]
    fn awaits_core_result() {
        let core = Arc::new(CompletionSourceCore::new());
        let task = core.task();

        let producer = core.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer.try_set_result("done");
        });

        assert_eq!(smol::future::block_on(task).unwrap(), "done");
        handle.join().unwrap();
    }

    #[test]
    fn stale_after_reset() {
        let core = Arc::new(CompletionSourceCore::<u8>::new());
        let task = core.task();
        core.try_set_result(1);
        assert_eq!(task.result().unwrap(), 1);

        core.reset();
        assert!(task.status().unwrap_err().is_stale());
        assert!(smol::future::block_on(task).unwrap_err().is_stale());
    }

    #[test]
    fn silence_is_ignored_by_plain_core() {
        let core = Arc::new(CompletionSourceCore::<u8>::new());
        let task = core.task();
        task.silence_cancellation().unwrap();
        core.try_set_canceled();
        assert!(task.result().unwrap_err().is_canceled());
    }
}
