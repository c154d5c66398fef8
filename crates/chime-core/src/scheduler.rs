//! The public scheduler surface and the coordinator loop.
//!
//! Design:
//! - One coordinator task owns the fire-time heap and the single armed
//!   timer. External mutation reaches it only through control channels
//!   (add / remove / remove-all / stop), or touches the registry directly
//!   while the scheduler is stopped.
//! - Control channels have capacity 1, so callers feel back-pressure while
//!   the coordinator is busy dispatching; the dispatch queue to the worker
//!   pool is buffered to smooth bursts.
//! - Exactly one control event is handled per loop iteration before the
//!   timer deadline is recomputed, so a stale timer is never left armed.

use std::future::pending;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::domain::{Task, TaskId, TaskResult, TaskSpec, TaskView};
use crate::error::ChimeError;
use crate::heap::{FireEntry, TaskHeap};
use crate::observability::StateCounts;
use crate::registry::Registry;
use crate::schedule::Schedule;
use crate::worker::WorkerPool;

/// Buffer of the coordinator -> worker-pool dispatch queue.
const DISPATCH_QUEUE_DEPTH: usize = 1024;

/// Scheduler configuration.
pub struct Config<Tz: TimeZone = Local> {
    pub timezone: Tz,
    pub clock: Arc<dyn Clock>,
    pub workers: usize,
}

impl Default for Config<Local> {
    fn default() -> Self {
        Self::new(Local)
    }
}

impl<Tz: TimeZone> Config<Tz> {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            clock: Arc::new(SystemClock),
            workers: default_workers(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .max(2)
}

/// Completion token returned by [`Scheduler::stop`]. Resolves once the
/// coordinator has exited and every in-flight execution has returned.
pub struct StopToken {
    rx: oneshot::Receiver<()>,
}

impl StopToken {
    pub async fn done(self) {
        let _ = self.rx.await;
    }
}

/// Control handles that exist only while the scheduler is running.
struct Controls {
    add_tx: mpsc::Sender<Arc<Task>>,
    remove_tx: mpsc::Sender<TaskId>,
    remove_all_tx: mpsc::Sender<()>,
    stop_tx: watch::Sender<bool>,
    coordinator: JoinHandle<()>,
    pool: WorkerPool,
}

struct Inner {
    running: bool,
    controls: Option<Controls>,
}

/// An in-process cron-style task scheduler.
///
/// ```ignore
/// let scheduler = Scheduler::new();
/// let id = scheduler.add("@every 5m", TaskSpec::new(|| refresh_cache())).await?;
/// scheduler.start();
/// // ...
/// scheduler.stop().done().await;
/// ```
pub struct Scheduler<Tz: TimeZone = Local> {
    registry: Arc<Registry>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    workers: usize,
    inner: Mutex<Inner>,
}

impl Scheduler<Local> {
    /// A scheduler in the local time zone with the default worker count.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }
}

impl Default for Scheduler<Local> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz> Scheduler<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    pub fn with_config(config: Config<Tz>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            next_id: AtomicI64::new(1),
            clock: config.clock,
            timezone: config.timezone,
            workers: config.workers.max(1),
            inner: Mutex::new(Inner {
                running: false,
                controls: None,
            }),
        }
    }

    /// Register a task. Returns its ID (>= 1, strictly increasing), or an
    /// error when the spec does not parse or the task spec is invalid; a
    /// rejected task is not registered.
    pub async fn add(&self, expr: &str, spec: TaskSpec) -> Result<TaskId, ChimeError> {
        let schedule = Schedule::parse(expr).map_err(|err| {
            error!(spec = expr, error = %err, "failed to parse time spec");
            err
        })?;

        if !spec.after.is_empty() && !spec.action.is_fallible() {
            return Err(ChimeError::VoidActionWithDependencies);
        }
        for edge in &spec.after {
            // A prerequisite must exist and must itself be fallible: a void
            // action is always Completed after dispatch and cannot gate
            // dependents.
            match self.registry.get(edge.task) {
                None => return Err(ChimeError::UnknownDependency(edge.task)),
                Some(dep) if !dep.action.is_fallible() => {
                    return Err(ChimeError::VoidDependencyTarget(edge.task));
                }
                Some(_) => {}
            }
        }

        info!(spec = expr, description = %spec.description, "adding task");

        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let task = Arc::new(Task::new(id, schedule, spec));
        self.registry.insert(Arc::clone(&task));
        debug!(task = %id, "task created");

        // While running, hand the task to the coordinator, which computes
        // its first fire time and inserts the heap entry. While stopped the
        // heap is rebuilt from the registry on the next start.
        let add_tx = self
            .inner
            .lock()
            .controls
            .as_ref()
            .map(|c| c.add_tx.clone());
        if let Some(add_tx) = add_tx {
            let _ = add_tx.send(task).await;
        }

        Ok(id)
    }

    /// Remove a task. Unknown IDs are a silent no-op.
    pub async fn remove(&self, id: TaskId) {
        self.registry.disable(id);

        let remove_tx = self
            .inner
            .lock()
            .controls
            .as_ref()
            .map(|c| c.remove_tx.clone());
        if let Some(remove_tx) = remove_tx {
            let _ = remove_tx.send(id).await;
        }
    }

    /// Drop every task.
    pub async fn remove_all(&self) {
        self.registry.disable_all();

        let remove_all_tx = self
            .inner
            .lock()
            .controls
            .as_ref()
            .map(|c| c.remove_all_tx.clone());
        if let Some(remove_all_tx) = remove_all_tx {
            let _ = remove_all_tx.send(()).await;
        }
    }

    /// Snapshot of enabled tasks, sorted by ID.
    pub fn list(&self) -> Vec<TaskView> {
        self.registry.views()
    }

    /// Per-state totals over enabled tasks.
    pub fn counts(&self) -> StateCounts {
        self.registry.counts()
    }

    /// The last recorded execution result of a task, if it has run.
    pub fn last_result(&self, id: TaskId) -> Option<TaskResult> {
        self.registry.get(id).and_then(|task| task.last_result())
    }

    /// Begin firing. Idempotent. Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.running {
            return;
        }
        inner.running = true;

        let (add_tx, add_rx) = mpsc::channel(1);
        let (remove_tx, remove_rx) = mpsc::channel(1);
        let (remove_all_tx, remove_all_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_QUEUE_DEPTH);

        let pool = WorkerPool::spawn(
            self.workers,
            dispatch_rx,
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
        );

        let coordinator = Coordinator {
            registry: Arc::clone(&self.registry),
            clock: Arc::clone(&self.clock),
            timezone: self.timezone.clone(),
            dispatch_tx,
            add_rx,
            remove_rx,
            remove_all_rx,
            stop_rx,
        };
        let coordinator = tokio::spawn(coordinator.run());

        inner.controls = Some(Controls {
            add_tx,
            remove_tx,
            remove_all_tx,
            stop_tx,
            coordinator,
            pool,
        });
        info!("scheduler started");
    }

    /// Halt firing. Idempotent; when called before `start` the returned
    /// token resolves immediately. In-flight executions drain in the
    /// background and the token resolves once they have returned.
    pub fn stop(&self) -> StopToken {
        let (done_tx, done_rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        match inner.controls.take() {
            Some(controls) => {
                inner.running = false;
                let _ = controls.stop_tx.send(true);
                info!("scheduler stopping");

                tokio::spawn(async move {
                    let _ = controls.coordinator.await;
                    controls.pool.shutdown_and_join().await;
                    info!("scheduler stopped");
                    let _ = done_tx.send(());
                });
            }
            None => {
                let _ = done_tx.send(());
            }
        }

        StopToken { rx: done_rx }
    }
}

/// The coordinator: sole owner of the heap and the armed timer.
struct Coordinator<Tz: TimeZone> {
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    dispatch_tx: mpsc::Sender<TaskId>,
    add_rx: mpsc::Receiver<Arc<Task>>,
    remove_rx: mpsc::Receiver<TaskId>,
    remove_all_rx: mpsc::Receiver<()>,
    stop_rx: watch::Receiver<bool>,
}

impl<Tz> Coordinator<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    async fn run(self) {
        let Coordinator {
            registry,
            clock,
            timezone,
            dispatch_tx,
            mut add_rx,
            mut remove_rx,
            mut remove_all_rx,
            mut stop_rx,
        } = self;

        // Recompute every fire time relative to now and rebuild the heap;
        // tasks may have been registered (or fired) during a previous run.
        let mut heap = TaskHeap::new();
        let now = clock.now();
        for task in registry.enabled() {
            let next = task.schedule.next_after(now, &timezone);
            task.set_next(next);
            if let Some(next) = next {
                heap.push(FireEntry { next, task });
            }
        }

        loop {
            // Evict tombstoned roots so the timer is never armed for a
            // removed task.
            while heap.peek().is_some_and(|e| !e.task.is_enabled()) {
                heap.pop();
            }
            let deadline = heap.peek().map(|e| e.next);

            tokio::select! {
                _ = wait_for(deadline, clock.as_ref()) => {
                    fire_due(&mut heap, clock.as_ref(), &timezone, &dispatch_tx).await;
                }
                Some(task) = add_rx.recv() => {
                    let now = clock.now();
                    let next = task.schedule.next_after(now, &timezone);
                    task.set_next(next);
                    if let Some(next) = next {
                        heap.push(FireEntry { next, task });
                    }
                }
                Some(id) = remove_rx.recv() => {
                    debug!(task = %id, "task removed");
                    heap.retain(|e| e.task.is_enabled());
                }
                Some(()) = remove_all_rx.recv() => {
                    debug!("all tasks removed");
                    heap.clear();
                }
                res = stop_rx.changed() => {
                    if res.is_err() || *stop_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

/// Sleep until `deadline`, or forever when there is nothing to fire (a
/// control event interrupts either way).
async fn wait_for(deadline: Option<DateTime<Utc>>, clock: &dyn Clock) {
    match deadline {
        Some(at) => {
            let dur = (at - clock.now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(dur).await;
        }
        None => pending().await,
    }
}

/// Pop everything due, dispatch it to the worker pool, and re-insert each
/// task at its recomputed next fire time.
async fn fire_due<Tz: TimeZone>(
    heap: &mut TaskHeap,
    clock: &dyn Clock,
    timezone: &Tz,
    dispatch_tx: &mpsc::Sender<TaskId>,
) {
    let now = clock.now();

    while heap.peek().is_some_and(|e| e.next <= now) {
        let Some(FireEntry { next: fired_at, task }) = heap.pop() else {
            break;
        };
        if !task.is_enabled() {
            continue;
        }

        // Reset a finished task to Pending and hand the firing to the pool.
        task.prepare_fire();
        debug!(task = %task.id, "task dispatched");
        if dispatch_tx.send(task.id).await.is_err() {
            // Workers are gone; the scheduler is shutting down.
            return;
        }

        let next = task.schedule.next_after(now, timezone);
        task.advance(fired_at, next);
        if let Some(next) = next {
            heap.push(FireEntry { next, task });
        }
    }
}
