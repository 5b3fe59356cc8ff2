//! Watch scheduling for pipewatch.
//!
//! Every watch gets its own periodic tick stream on the [`TickEngine`].
//! The [`Scheduler`] owns the mapping from watch key to tick registration,
//! [`WatchJob`] runs the per-tick status diff, and the [`Dispatcher`]
//! delivers the outcome.

pub mod dispatcher;
pub mod job;
pub mod registry;
pub mod ticker;
pub mod tracker;

pub use dispatcher::{DispatchError, Dispatcher};
pub use job::WatchJob;
pub use registry::{Scheduler, SchedulerConfig};
pub use ticker::{TickEngine, TickHandle, TickJob};
pub use tracker::Tracker;
