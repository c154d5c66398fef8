//! chime-core
//!
//! An in-process cron-style task scheduler. A host program registers tasks
//! with a time spec (five-field cron or `@descriptor`) and an action; the
//! scheduler fires each task at its next wall-clock moment, gates execution
//! on prerequisite tasks, and contains panics and per-run timeouts.
//!
//! Module map:
//! - domain: ids, states, actions, task records, specs, results
//! - schedule: spec parsing + next-fire computation
//! - clock: time source port (swappable for deterministic tests)
//! - scheduler: the public surface and the coordinator loop
//! - registry: task map + dependency gating (internal)
//! - worker: worker pool + single-execution semantics (internal)
//! - observability: state-count snapshots
//! - error: crate-level error types

pub mod clock;
pub mod domain;
pub mod error;
pub mod observability;
pub mod schedule;
pub mod scheduler;

mod heap;
mod registry;
mod worker;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use domain::{
    Action, BoxError, DependEdge, EdgePolicy, TaskId, TaskResult, TaskSpec, TaskState, TaskView,
};
pub use error::{ChimeError, ParseError, TaskError};
pub use observability::StateCounts;
pub use schedule::Schedule;
pub use scheduler::{Config, Scheduler, StopToken};
