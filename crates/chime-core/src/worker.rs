//! Worker pool.
//!
//! A fixed set of workers consumes the dispatch queue filled by the
//! coordinator. Each worker gates its task on prerequisite completion, runs
//! the action on the blocking pool with panic containment and an optional
//! deadline, and records the outcome into the registry.
//!
//! Shutdown stops taking new firings; it does not cancel in-flight
//! executions, and `shutdown_and_join` resolves only once they return.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::domain::{BoxError, Task, TaskId, TaskResult, TaskState};
use crate::error::TaskError;
use crate::registry::Registry;

/// Bound on the prerequisite wait when the task has no timeout of its own.
const DEFAULT_DEPENDENCY_WAIT: Duration = Duration::from_secs(60);

/// Worker group handle. Dropping `shutdown_tx` (via `shutdown_and_join`)
/// stops every worker after its current task.
pub(crate) struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers sharing one dispatch queue.
    pub(crate) fn spawn(
        n: usize,
        queue: mpsc::Receiver<TaskId>,
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue = Arc::new(Mutex::new(queue));

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let queue = Arc::clone(&queue);
            let registry = Arc::clone(&registry);
            let clock = Arc::clone(&clock);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, registry, clock, &mut rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    /// Stop workers and wait for in-flight executions to finish. Queued
    /// firings that no worker has picked up yet are dropped.
    pub(crate) async fn shutdown_and_join(self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<TaskId>>>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let id = tokio::select! {
            res = shutdown_rx.changed() => {
                if res.is_err() {
                    break;
                }
                continue;
            }
            id = async { queue.lock().await.recv().await } => match id {
                Some(id) => id,
                // Coordinator dropped the sender: nothing left to dispatch.
                None => break,
            },
        };

        debug!(worker = worker_id, task = %id, "firing picked up");
        run_gated(&registry, clock.as_ref(), id).await;
    }
}

/// Gate one firing on its prerequisites, then execute it.
async fn run_gated(registry: &Registry, clock: &dyn Clock, id: TaskId) {
    let Some(task) = registry.get(id) else {
        error!(task = %id, "task not found");
        return;
    };

    // The task may have been removed after this firing was queued.
    if !task.is_enabled() {
        debug!(task = %id, "firing dropped, task disabled");
        return;
    }

    // Duplicate-dispatch guard: still running from a previous firing, or
    // already completed for this cycle.
    let state = task.state();
    if state == TaskState::Running || state == TaskState::Completed {
        debug!(task = %id, ?state, "firing dropped");
        return;
    }

    if !task.after.is_empty() {
        let timeout = task.timeout.unwrap_or(DEFAULT_DEPENDENCY_WAIT);
        if let Err(err) = registry.wait(&task, timeout).await {
            let now = clock.now();
            error!(task = %id, error = %err, "prerequisite wait failed");
            registry.record(
                &task,
                TaskResult {
                    task: id,
                    state: TaskState::Failed,
                    started_at: now,
                    finished_at: now,
                    duration: Duration::ZERO,
                    error: Some(err),
                },
            );
            return;
        }
    }

    execute(registry, clock, &task).await;
}

/// Run one execution: transition to Running, run the action on the blocking
/// pool, race an optional deadline, record the result.
async fn execute(registry: &Registry, clock: &dyn Clock, task: &Arc<Task>) {
    if !task.begin_run() {
        debug!(task = %task.id, "execution already in flight");
        return;
    }

    info!(task = %task.id, description = %task.description, "task started");
    let started_at = clock.now();

    let action = task.action.clone();
    let handle = tokio::task::spawn_blocking(move || action.call());

    let mut error = match task.timeout {
        Some(timeout) => {
            tokio::select! {
                res = handle => outcome(res),
                _ = tokio::time::sleep(timeout) => {
                    // The action is not cancelled: it keeps running in the
                    // background while this firing is marked failed.
                    if let Some(on_timeout) = &task.on_timeout {
                        on_timeout();
                    }
                    warn!(task = %task.id, ?timeout, "task timed out");
                    Some(TaskError::Timeout(timeout))
                }
            }
        }
        None => outcome(handle.await),
    };

    // A void action has no way to report failure: it is always Completed
    // after dispatch. A panic or timeout is still contained and logged,
    // just never surfaced as a failed state.
    if !task.action.is_fallible() {
        if let Some(err) = error.take() {
            warn!(task = %task.id, error = %err, "error in void action contained");
        }
    }

    let finished_at = clock.now();
    let duration = (finished_at - started_at).to_std().unwrap_or_default();
    let state = if error.is_none() {
        TaskState::Completed
    } else {
        TaskState::Failed
    };

    match &error {
        None => info!(task = %task.id, ?duration, "task completed"),
        Some(err) => error!(task = %task.id, ?duration, error = %err, "task failed"),
    }

    registry.record(
        task,
        TaskResult {
            task: task.id,
            state,
            started_at,
            finished_at,
            duration,
            error,
        },
    );
}

/// Map a blocking-task join result onto a task error, containing panics.
fn outcome(res: Result<Result<(), BoxError>, JoinError>) -> Option<TaskError> {
    match res {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(TaskError::Action(err.to_string())),
        Err(join) if join.is_panic() => Some(TaskError::Panic(panic_message(join.into_panic()))),
        Err(join) => Some(TaskError::Action(join.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
