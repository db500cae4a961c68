use thiserror::Error;

/// A fault raised by an automaton, stored verbatim until it is retrieved.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by completion sources, tasks and configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The handle's token belongs to an operation that has already been finalized.
    ///
    /// The pooled object behind the handle may now be serving a different operation. This is
    /// always a bug in the caller.
    #[error("stale handle: token {token} does not match current version {version}")]
    StaleToken {
        /// Token carried by the handle.
        token: u32,
        /// Version of the operation currently bound to the object.
        version: u32,
    },

    /// The result was requested while the operation is still pending, or it has already been
    /// taken.
    #[error("operation result is not available: still pending or already retrieved")]
    NotReady,

    /// The operation failed with the given fault.
    #[error("operation faulted: {0}")]
    Faulted(#[source] BoxError),

    /// The operation was canceled.
    #[error("operation was canceled")]
    Canceled,

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl Error {
    /// Returns `true` for [`Error::StaleToken`].
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::StaleToken { .. })
    }

    /// Returns `true` for [`Error::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// Extracts the automaton's own fault, if this is one.
    pub fn into_fault(self) -> Option<BoxError> {
        match self {
            Error::Faulted(fault) => Some(fault),
            _ => None,
        }
    }
}
