use std::mem;
use std::panic::{self, AssertUnwindSafe};

/// Aborts the process.
///
/// Panicking while a panic is already unwinding aborts, which works without `std::process`.
pub(crate) fn abort() -> ! {
    struct Panic;

    impl Drop for Panic {
        fn drop(&mut self) {
            panic!("aborting the process");
        }
    }

    let _panic = Panic;
    panic!("aborting the process");
}

/// Calls a function and aborts if it panics.
///
/// Used around continuations: a panicking waker would otherwise unwind through a runner that
/// is half way through a state transition.
#[inline]
pub(crate) fn abort_on_panic<T>(f: impl FnOnce() -> T) -> T {
    struct Bomb;

    impl Drop for Bomb {
        fn drop(&mut self) {
            abort();
        }
    }

    let bomb = Bomb;
    let t = f();
    mem::forget(bomb);
    t
}

/// Runs an advisory hook, swallowing and logging any panic it raises.
pub(crate) fn advisory(hook: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(hook, "advisory hook panicked; ignoring");
    }
}

/// Short name of a type for logs and pool reports.
pub(crate) fn shape_name<T: ?Sized>() -> &'static str {
    std::any::type_name::<T>()
}
