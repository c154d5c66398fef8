//! Domain model (ids, states, actions, task records, results).

pub mod action;
pub mod ids;
pub mod state;
pub mod task;

pub use action::{Action, BoxError};
pub use ids::TaskId;
pub use state::TaskState;
pub use task::{DependEdge, EdgePolicy, TaskResult, TaskSpec, TaskView};

pub(crate) use task::Task;
