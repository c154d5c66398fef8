//! Task registry + dependency gating.
//!
//! The registry is the single owner of task records. The scheduler's heap
//! and the workers hold `Arc<Task>` handles into it, but every state
//! transition is recorded here so that dependency waiters can be woken.
//!
//! Waiting is event-driven: `record` wakes all waiters through a single
//! registry-level `Notify`, and each waiter re-runs `check` against its own
//! prerequisite edges.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::debug;

use crate::domain::{EdgePolicy, Task, TaskId, TaskResult, TaskState, TaskView};
use crate::error::TaskError;
use crate::observability::StateCounts;

/// Outcome of one prerequisite check.
pub(crate) enum Check {
    /// All prerequisites completed (or failed with a Skip edge).
    Done,
    /// A prerequisite is missing or failed with a Stop edge.
    Failed(TaskError),
    /// Still waiting on these prerequisites.
    Waiting(Vec<TaskId>),
}

pub(crate) struct Registry {
    tasks: RwLock<HashMap<TaskId, Arc<Task>>>,
    done: Notify,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            done: Notify::new(),
        }
    }

    pub(crate) fn insert(&self, task: Arc<Task>) {
        self.tasks.write().insert(task.id, task);
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.read().get(&id).cloned()
    }

    /// Handles to every enabled task, for heap rebuilds.
    pub(crate) fn enabled(&self) -> Vec<Arc<Task>> {
        self.tasks
            .read()
            .values()
            .filter(|t| t.is_enabled())
            .cloned()
            .collect()
    }

    /// Snapshot of enabled tasks, sorted by ID.
    pub(crate) fn views(&self) -> Vec<TaskView> {
        let mut views: Vec<TaskView> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.is_enabled())
            .map(|t| t.view())
            .collect();
        views.sort_by_key(|v| v.id);
        views
    }

    pub(crate) fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for task in self.tasks.read().values() {
            if !task.is_enabled() {
                continue;
            }
            match task.state() {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub(crate) fn disable(&self, id: TaskId) {
        if let Some(task) = self.get(id) {
            task.disable();
            debug!(task = %id, "task disabled");
        }
    }

    pub(crate) fn disable_all(&self) {
        for task in self.tasks.read().values() {
            task.disable();
        }
    }

    /// Check `task`'s prerequisite edges against current states.
    pub(crate) fn check(&self, task: &Task) -> Check {
        let tasks = self.tasks.read();
        let mut waiting = Vec::new();

        for edge in &task.after {
            let Some(dep) = tasks.get(&edge.task) else {
                return Check::Failed(TaskError::DependencyNotFound(edge.task));
            };
            match dep.state() {
                TaskState::Failed => match edge.policy {
                    EdgePolicy::Stop => {
                        return Check::Failed(TaskError::DependencyFailed(edge.task))
                    }
                    // A Skip edge treats the failure as satisfied.
                    EdgePolicy::Skip => {}
                },
                TaskState::Completed => {}
                TaskState::Pending | TaskState::Running => waiting.push(edge.task),
            }
        }

        if waiting.is_empty() {
            Check::Done
        } else {
            Check::Waiting(waiting)
        }
    }

    /// Block until `task`'s prerequisites are satisfied, a prerequisite
    /// fails with a Stop edge, or `timeout` elapses.
    pub(crate) async fn wait(&self, task: &Task, timeout: Duration) -> Result<(), TaskError> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            // Arm the waiter before checking, so a completion recorded
            // between check and select is not lost.
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.check(task) {
                Check::Done => return Ok(()),
                Check::Failed(err) => return Err(err),
                Check::Waiting(pending) => {
                    tokio::select! {
                        _ = &mut deadline => return Err(TaskError::DependencyTimeout(pending)),
                        _ = &mut notified => {}
                    }
                }
            }
        }
    }

    /// Record an execution outcome and wake dependency waiters.
    pub(crate) fn record(&self, task: &Task, result: TaskResult) {
        task.record(result);
        self.done.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskSpec;
    use crate::schedule::Schedule;
    use chrono::Utc;

    fn register(registry: &Registry, id: i64, spec: TaskSpec) -> Arc<Task> {
        let task = Arc::new(Task::new(
            TaskId::new(id),
            Schedule::parse("@every 30s").unwrap(),
            spec,
        ));
        registry.insert(task.clone());
        task
    }

    fn finish(registry: &Registry, task: &Task, state: TaskState, error: Option<TaskError>) {
        let now = Utc::now();
        task.begin_run();
        registry.record(
            task,
            TaskResult {
                task: task.id,
                state,
                started_at: now,
                finished_at: now,
                duration: Duration::ZERO,
                error,
            },
        );
    }

    #[test]
    fn check_reports_missing_prerequisites() {
        let registry = Registry::new();
        let dependent = register(
            &registry,
            2,
            TaskSpec::fallible(|| Ok(())).after(TaskId::new(99), EdgePolicy::Stop),
        );

        assert!(matches!(
            registry.check(&dependent),
            Check::Failed(TaskError::DependencyNotFound(id)) if id == TaskId::new(99)
        ));
    }

    #[test]
    fn check_distinguishes_stop_and_skip_edges() {
        let registry = Registry::new();
        let dep = register(&registry, 1, TaskSpec::fallible(|| Ok(())));
        finish(&registry, &dep, TaskState::Failed, Some(TaskError::Action("boom".into())));

        let stop = register(
            &registry,
            2,
            TaskSpec::fallible(|| Ok(())).after(dep.id, EdgePolicy::Stop),
        );
        assert!(matches!(
            registry.check(&stop),
            Check::Failed(TaskError::DependencyFailed(id)) if id == dep.id
        ));

        let skip = register(
            &registry,
            3,
            TaskSpec::fallible(|| Ok(())).after(dep.id, EdgePolicy::Skip),
        );
        assert!(matches!(registry.check(&skip), Check::Done));
    }

    #[test]
    fn check_waits_on_unfinished_prerequisites() {
        let registry = Registry::new();
        let dep = register(&registry, 1, TaskSpec::fallible(|| Ok(())));
        let dependent = register(
            &registry,
            2,
            TaskSpec::fallible(|| Ok(())).after(dep.id, EdgePolicy::Stop),
        );

        assert!(matches!(
            registry.check(&dependent),
            Check::Waiting(ref pending) if pending == &vec![dep.id]
        ));

        finish(&registry, &dep, TaskState::Completed, None);
        assert!(matches!(registry.check(&dependent), Check::Done));
    }

    #[tokio::test]
    async fn wait_wakes_on_completion() {
        let registry = Arc::new(Registry::new());
        let dep = register(&registry, 1, TaskSpec::fallible(|| Ok(())));
        let dependent = register(
            &registry,
            2,
            TaskSpec::fallible(|| Ok(())).after(dep.id, EdgePolicy::Stop),
        );

        let completer = {
            let registry = Arc::clone(&registry);
            let dep = Arc::clone(&dep);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                finish(&registry, &dep, TaskState::Completed, None);
            })
        };

        registry
            .wait(&dependent, Duration::from_secs(5))
            .await
            .expect("wait should resolve once the prerequisite completes");
        completer.await.unwrap();
    }

    #[tokio::test]
    async fn wait_times_out_with_the_pending_set() {
        let registry = Registry::new();
        let dep = register(&registry, 1, TaskSpec::fallible(|| Ok(())));
        let dependent = register(
            &registry,
            2,
            TaskSpec::fallible(|| Ok(())).after(dep.id, EdgePolicy::Stop),
        );

        let err = registry
            .wait(&dependent, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::DependencyTimeout(vec![dep.id]));
    }
}
