/// Lifecycle state of one operation on a completion source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not completed yet.
    #[default]
    Pending,
    /// Completed with a value.
    Succeeded,
    /// Completed with a fault.
    Faulted,
    /// Completed by cancellation.
    Canceled,
}

impl Status {
    /// Returns `true` for every state except [`Status::Pending`].
    pub fn is_completed(self) -> bool {
        self != Status::Pending
    }

    /// Returns `true` for [`Status::Succeeded`].
    pub fn is_completed_successfully(self) -> bool {
        self == Status::Succeeded
    }

    /// Returns `true` for [`Status::Faulted`].
    pub fn is_faulted(self) -> bool {
        self == Status::Faulted
    }

    /// Returns `true` for [`Status::Canceled`].
    pub fn is_canceled(self) -> bool {
        self == Status::Canceled
    }
}
