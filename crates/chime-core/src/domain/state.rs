//! Task state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// Transitions:
/// - Pending -> Running at dispatch
/// - Running -> Completed on successful return
/// - Running -> Failed on error, panic, or timeout (fallible actions only;
///   a void action is always Completed after dispatch)
/// - Completed / Failed -> Pending when the next firing is dispatched
///
/// A task that is still Running when its next firing arrives stays Running
/// and that firing is dropped (overlapping executions are suppressed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    /// Has the most recent execution finished (either way)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}
