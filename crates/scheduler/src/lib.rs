//! Generic priority task scheduler (§4.3): two independent slot pools,
//! priority ordering with monotone promotion, key-based coalescing,
//! dependency-ordered preparation dispatch, and cooperative cancellation.
//!
//! This crate knows nothing about build systems or index stores — it
//! drives work supplied by a [`SchedulerHost`] implementation. The
//! `semantic-index-core` crate is the only consumer in this workspace.

mod host;
mod ops;
mod state;
#[cfg(test)]
mod tests;
pub mod types;

pub use host::{BoxFuture, SchedulerHost};
pub use ops::Subscription;
pub use state::{Scheduler, SchedulerConfig};
pub use types::{FileId, Priority, TargetId, TaskError, TaskKey, TaskOutcome, TaskState};
