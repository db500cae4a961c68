//! Pooled task runners for driving resumable automatons.
//!
//! An *automaton* is a unit of work that advances step by step until it produces a value, a fault
//! or a cancellation. This crate drives automatons through pooled runners, so starting an
//! operation reuses a runner left behind by an earlier operation of the same automaton type
//! instead of allocating a new one.
//!
//! # Spawning
//!
//! An operation is created with either [`spawn`] or [`spawn_void`]:
//!
//! ```
//! use pooled_task::{Automaton, Cx, Step};
//!
//! struct Double(u64);
//!
//! impl Automaton for Double {
//!     type Output = u64;
//!
//!     fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<u64> {
//!         Step::Complete(self.0 * 2)
//!     }
//! }
//!
//! // The advance callback goes to a scheduler; the task retrieves the result.
//! let (advance, task) = pooled_task::spawn(Double(21));
//! ```
//!
//! # Execution
//!
//! Schedulers are whatever holds [`Advance`] callbacks. Most keep a queue and run each callback
//! in order:
//!
//! ```
//! # use pooled_task::{Automaton, Cx, Step};
//! # struct Double(u64);
//! # impl Automaton for Double {
//! #     type Output = u64;
//! #     fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<u64> {
//! #         Step::Complete(self.0 * 2)
//! #     }
//! # }
//! let (sender, receiver) = flume::unbounded();
//!
//! let (advance, task) = pooled_task::spawn(Double(21));
//! sender.send(advance).unwrap();
//!
//! while let Ok(advance) = receiver.try_recv() {
//!     advance.run();
//! }
//!
//! assert_eq!(smol::future::block_on(task).unwrap(), 42);
//! ```
//!
//! An automaton that has to wait hands [`Cx::advance`] to whatever it waits on, for example
//! through [`Task::on_completed`], and returns [`Step::Yield`].
//!
//! # Versions
//!
//! Every runner carries a [`CompletionSourceCore`] whose version is bumped each time the runner
//! goes back to its pool. A [`Task`] remembers the version it was created for, so a handle used
//! after its operation has been finalized fails with [`Error::StaleToken`] instead of observing a
//! later operation on the same runner.
//!
//! # Reclamation
//!
//! Retrieving the outcome of a task returns its runner to the pool. If nobody ever retrieves it,
//! the runner is returned when the last [`Advance`] and [`Task`] of the operation are dropped.
//! Both paths race through a single compare-exchange, so a runner is returned exactly once.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(test(attr(allow(unused_extern_crates, unused_variables))))]

mod automaton;
mod config;
mod error;
mod intrusive;
mod pool;
mod registry;
mod runner;
mod source;
mod status;
mod task;
mod tracker;
mod utils;
mod void;

pub use crate::automaton::{Advance, Automaton, Cx, Step};
pub use crate::config::{set_max_pool_size, Config, Prewarm};
pub use crate::error::{BoxError, Error};
pub use crate::intrusive::{Link, PoolNode};
pub use crate::pool::Pool;
pub use crate::registry::{pool_size_of, pool_sizes, PoolReport};
pub use crate::runner::spawn;
pub use crate::source::{CompletionSourceCore, Continuation, Source};
pub use crate::status::Status;
pub use crate::task::Task;
pub use crate::tracker::{set_tracker, OperationId, Tracked, Tracker};
pub use crate::void::spawn_void;

#[doc(no_inline)]
pub use intrusive_collections::intrusive_adapter;
