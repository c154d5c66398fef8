use std::time::Duration;

use thiserror::Error;

use crate::domain::TaskId;

/// Errors surfaced synchronously by the public API (`add`).
#[derive(Debug, Error)]
pub enum ChimeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("dependency support requires a fallible action")]
    VoidActionWithDependencies,

    #[error("unknown prerequisite task: {0}")]
    UnknownDependency(TaskId),

    #[error("prerequisite task {0} has no return value")]
    VoidDependencyTarget(TaskId),
}

/// Errors from the spec grammar (five-field cron or `@descriptor`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty spec")]
    Empty,

    #[error("unknown descriptor: {0}")]
    UnknownDescriptor(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("minimum interval is 30s, got {0:?}")]
    BelowMinimumInterval(Duration),

    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("{field}: value {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field}: invalid step {text:?}")]
    InvalidStep { field: &'static str, text: String },

    #[error("{field}: invalid range {text:?}")]
    InvalidRange { field: &'static str, text: String },

    #[error("{field}: invalid list {text:?}")]
    InvalidList { field: &'static str, text: String },

    #[error("{field}: invalid value {text:?}")]
    InvalidValue { field: &'static str, text: String },
}

/// Runtime failures recorded into a task's last result. These never
/// propagate to the caller; they are logged and kept on the task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("action failed: {0}")]
    Action(String),

    #[error("action panicked: {0}")]
    Panic(String),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("prerequisite task not found: {0}")]
    DependencyNotFound(TaskId),

    #[error("prerequisite task failed: {0}")]
    DependencyFailed(TaskId),

    #[error("timed out waiting for prerequisites: {0:?}")]
    DependencyTimeout(Vec<TaskId>),
}
