//! Domain identifiers (strongly-typed IDs).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a registered task.
///
/// IDs are assigned monotonically starting at 1 and are never reused, so
/// they double as registration order: a prerequisite always has a smaller
/// ID than its dependents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}
