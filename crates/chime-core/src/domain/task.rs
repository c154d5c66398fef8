//! Task records and the input spec used to register them.
//!
//! Design:
//! - `TaskSpec` is what callers hand to `add`: an action plus options.
//! - `Task` is the registered record, owned by the registry as `Arc<Task>`.
//!   Identity and configuration are immutable; the mutable part (state,
//!   fire times, last result) lives in an interior `RwLock` cell because
//!   both the coordinator and the workers touch it.
//! - Heap entries hold `Arc<Task>` clones, never copies of the record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{Action, TaskId, TaskState};
use crate::error::TaskError;
use crate::schedule::Schedule;

/// Failure policy of a single prerequisite edge.
///
/// `Stop` fails the dependent task when the prerequisite failed; `Skip`
/// treats a failed prerequisite as satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgePolicy {
    Stop,
    Skip,
}

/// A directed dependency: the owning task runs only after `task` completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependEdge {
    pub task: TaskId,
    pub policy: EdgePolicy,
}

/// Input spec for one task: the action plus options.
///
/// ```ignore
/// let spec = TaskSpec::fallible(|| { sync_feeds()?; Ok(()) })
///     .description("sync feeds")
///     .timeout(Duration::from_secs(30))
///     .after(warmup_id, EdgePolicy::Stop);
/// let id = scheduler.add("*/5 * * * *", spec).await?;
/// ```
pub struct TaskSpec {
    pub(crate) description: String,
    pub(crate) action: Action,
    pub(crate) timeout: Option<Duration>,
    pub(crate) on_timeout: Option<Arc<dyn Fn() + Send + Sync>>,
    pub(crate) after: Vec<DependEdge>,
}

impl TaskSpec {
    /// A task whose action cannot report failure.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::from_action(Action::void(f))
    }

    /// A task whose action returns a `Result`. Required for tasks that
    /// declare prerequisites.
    pub fn fallible(
        f: impl Fn() -> Result<(), super::BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::from_action(Action::fallible(f))
    }

    pub fn from_action(action: Action) -> Self {
        Self {
            description: String::new(),
            action,
            timeout: None,
            on_timeout: None,
            after: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Per-run deadline. A run exceeding it is marked failed and the
    /// `on_timeout` callback (if any) fires; the action itself keeps
    /// running in the background. Also bounds the prerequisite wait.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_timeout(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(f));
        self
    }

    /// Add a prerequisite edge. The prerequisite must already be registered.
    pub fn after(mut self, task: TaskId, policy: EdgePolicy) -> Self {
        self.after.push(DependEdge { task, policy });
        self
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: TaskId,
    pub state: TaskState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub error: Option<TaskError>,
}

/// Read-only snapshot of a task, as returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub description: String,
    pub state: TaskState,
    pub next: Option<DateTime<Utc>>,
    pub prev: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Mutable part of a task record.
struct Cell {
    state: TaskState,
    enabled: bool,
    next: Option<DateTime<Utc>>,
    prev: Option<DateTime<Utc>>,
    last_result: Option<TaskResult>,
}

/// A registered task. Owned by the registry; referenced from the heap.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) description: String,
    pub(crate) schedule: Schedule,
    pub(crate) action: Action,
    pub(crate) timeout: Option<Duration>,
    pub(crate) on_timeout: Option<Arc<dyn Fn() + Send + Sync>>,
    pub(crate) after: Vec<DependEdge>,
    cell: RwLock<Cell>,
}

impl Task {
    pub(crate) fn new(id: TaskId, schedule: Schedule, spec: TaskSpec) -> Self {
        Self {
            id,
            description: spec.description,
            schedule,
            action: spec.action,
            timeout: spec.timeout,
            on_timeout: spec.on_timeout,
            after: spec.after,
            cell: RwLock::new(Cell {
                state: TaskState::Pending,
                enabled: true,
                next: None,
                prev: None,
                last_result: None,
            }),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.cell.read().state
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.cell.read().enabled
    }

    pub(crate) fn disable(&self) {
        self.cell.write().enabled = false;
    }

    pub(crate) fn set_next(&self, next: Option<DateTime<Utc>>) {
        self.cell.write().next = next;
    }

    /// Record a firing: the old `next` becomes `prev`, the recomputed
    /// `next` takes its place.
    pub(crate) fn advance(&self, prev: DateTime<Utc>, next: Option<DateTime<Utc>>) {
        let mut cell = self.cell.write();
        cell.prev = Some(prev);
        cell.next = next;
    }

    /// Reset a finished task to `Pending` for re-dispatch. A task still
    /// `Running` from the previous firing is left untouched; the worker-side
    /// guard will then drop the overlapping firing.
    pub(crate) fn prepare_fire(&self) {
        let mut cell = self.cell.write();
        if cell.state != TaskState::Running {
            cell.state = TaskState::Pending;
        }
    }

    /// Atomically transition to `Running`. Returns false when an execution
    /// is already in flight, in which case the caller must not run the
    /// action.
    pub(crate) fn begin_run(&self) -> bool {
        let mut cell = self.cell.write();
        if cell.state == TaskState::Running {
            return false;
        }
        cell.state = TaskState::Running;
        true
    }

    pub(crate) fn record(&self, result: TaskResult) {
        let mut cell = self.cell.write();
        cell.state = result.state;
        cell.last_result = Some(result);
    }

    pub(crate) fn last_result(&self) -> Option<TaskResult> {
        self.cell.read().last_result.clone()
    }

    pub(crate) fn view(&self) -> TaskView {
        let cell = self.cell.read();
        TaskView {
            id: self.id,
            description: self.description.clone(),
            state: cell.state,
            next: cell.next,
            prev: cell.prev,
            last_error: cell
                .last_result
                .as_ref()
                .and_then(|r| r.error.as_ref())
                .map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;

    fn task(id: i64) -> Task {
        Task::new(
            TaskId::new(id),
            Schedule::parse("@every 30s").unwrap(),
            TaskSpec::new(|| {}).description("test"),
        )
    }

    #[test]
    fn begin_run_rejects_overlapping_execution() {
        let t = task(1);

        assert!(t.begin_run());
        assert_eq!(t.state(), TaskState::Running);
        assert!(!t.begin_run(), "second run must be rejected while Running");
    }

    #[test]
    fn prepare_fire_resets_terminal_states_only() {
        let t = task(1);

        assert!(t.begin_run());
        t.prepare_fire();
        assert_eq!(t.state(), TaskState::Running, "Running is never reset");

        t.record(TaskResult {
            task: t.id,
            state: TaskState::Failed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration: Duration::ZERO,
            error: Some(TaskError::Action("boom".into())),
        });
        t.prepare_fire();
        assert_eq!(t.state(), TaskState::Pending);
    }

    #[test]
    fn view_exposes_last_error() {
        let t = task(7);
        t.record(TaskResult {
            task: t.id,
            state: TaskState::Failed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration: Duration::ZERO,
            error: Some(TaskError::Action("disk full".into())),
        });

        let view = t.view();
        assert_eq!(view.id, TaskId::new(7));
        assert_eq!(view.state, TaskState::Failed);
        assert_eq!(view.last_error.as_deref(), Some("action failed: disk full"));
    }
}
