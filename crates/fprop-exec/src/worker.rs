#![forbid(unsafe_code)]

//! Dedicated worker thread with immediate and delayed tasks.
//!
//! A [`WorkerThread`] owns one named OS thread running an event loop. The
//! thread installs its own [`ThreadContext`] on startup, so code running on
//! it (including property listeners registered from it) sees the worker as
//! its current executor and scheduler.
//!
//! # Loop Rules
//!
//! - Immediate tasks run in submission order.
//! - Delayed tasks run once their deadline passes, ordered by deadline and
//!   then by submission; canceled ones are dropped unrun.
//! - A panicking task is logged and does not stop the loop.
//! - Shutdown drops delayed tasks that are not yet due.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle, ThreadId};

use web_time::{Duration, Instant};

use crate::config::WorkerConfig;
use crate::context::{self, Executor, ScheduledTask, Scheduler, Task, ThreadContext};
use crate::error::{ExecError, Result};

/// Messages sent from handles to the worker loop.
enum Msg {
    Run(Task),
    Schedule {
        due: Instant,
        handle: ScheduledTask,
        task: Task,
    },
    Shutdown,
}

/// Shared, cloneable side of a worker: implements [`Executor`] and
/// [`Scheduler`] by posting to the loop.
struct WorkerHandle {
    name: String,
    tx: mpsc::Sender<Msg>,
}

impl WorkerHandle {
    fn post(&self, msg: Msg) {
        if self.tx.send(msg).is_err() {
            tracing::warn!(worker = %self.name, "task dropped: worker has shut down");
        }
    }
}

impl Executor for WorkerHandle {
    fn execute(&self, task: Task) {
        self.post(Msg::Run(task));
    }
}

impl Scheduler for WorkerHandle {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let handle = ScheduledTask::new();
        self.post(Msg::Schedule {
            due: Instant::now() + delay,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

/// A delayed task waiting in the loop's timer heap.
struct Timer {
    due: Instant,
    order: u64,
    handle: ScheduledTask,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.order == other.order
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.order.cmp(&other.order))
    }
}

/// Handle to a running worker thread.
///
/// Dropping the handle shuts the thread down and joins it.
pub struct WorkerThread {
    shared: Arc<WorkerHandle>,
    thread_id: ThreadId,
    join: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("name", &self.shared.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

impl WorkerThread {
    /// Spawn a worker with the default configuration.
    pub fn spawn() -> Result<Self> {
        Self::start(WorkerConfig::default())
    }

    /// Spawn a worker thread.
    pub fn start(config: WorkerConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Msg>();
        let shared = Arc::new(WorkerHandle {
            name: config.name.clone(),
            tx,
        });

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }

        let loop_shared = Arc::clone(&shared);
        let join = builder
            .spawn(move || {
                let executor: Arc<dyn Executor> = loop_shared.clone();
                let scheduler: Arc<dyn Scheduler> = loop_shared.clone();
                let name = loop_shared.name.clone();
                drop(loop_shared);
                let _ctx = context::enter(ThreadContext::new(executor).with_scheduler(scheduler));
                worker_loop(&name, rx);
            })
            .map_err(|source| ExecError::Spawn {
                name: config.name.clone(),
                source,
            })?;

        let thread_id = join.thread().id();
        tracing::debug!(worker = %config.name, ?thread_id, "worker started");
        Ok(Self {
            shared,
            thread_id,
            join: Some(join),
        })
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The worker's OS thread id.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Executor that runs tasks on this worker.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn Executor> {
        self.shared.clone()
    }

    /// Scheduler that runs delayed tasks on this worker.
    #[must_use]
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.shared.clone()
    }

    /// The context the worker installs on its own thread.
    #[must_use]
    pub fn context(&self) -> ThreadContext {
        ThreadContext::new(self.executor()).with_scheduler(self.scheduler())
    }

    /// Run `f` on the worker and wait for its result.
    ///
    /// Must not be called from the worker itself (it would wait on itself).
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<R>(1);
        self.shared.post(Msg::Run(Box::new(move || {
            let _ = tx.send(f());
        })));
        rx.recv()
            .map_err(|_| ExecError::shut_down(self.shared.name.clone()))
    }

    /// Gracefully shut down: pending immediate tasks run, then the thread
    /// exits and is joined.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shared.tx.send(Msg::Shutdown);
        if let Some(join) = self.join.take() {
            if join.thread().id() == thread::current().id() {
                return;
            }
            let _ = join.join();
            tracing::debug!(worker = %self.shared.name, "worker stopped");
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The worker's event loop.
fn worker_loop(name: &str, rx: mpsc::Receiver<Msg>) {
    let mut timers: BinaryHeap<Reverse<Timer>> = BinaryHeap::new();
    let mut order: u64 = 0;

    loop {
        // Run every timer that is due.
        let now = Instant::now();
        while timers.peek().is_some_and(|Reverse(t)| t.due <= now) {
            let Some(Reverse(timer)) = timers.pop() else {
                break;
            };
            if !timer.handle.is_canceled() {
                run_task(name, timer.task);
            }
        }

        let msg = match timers.peek() {
            Some(Reverse(next)) => {
                let wait = next.due.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => return,
            },
        };

        match msg {
            Msg::Run(task) => run_task(name, task),
            Msg::Schedule { due, handle, task } => {
                order += 1;
                timers.push(Reverse(Timer {
                    due,
                    order,
                    handle,
                    task,
                }));
            }
            Msg::Shutdown => {
                // Finish immediate work that was queued before the request.
                while let Ok(msg) = rx.try_recv() {
                    if let Msg::Run(task) = msg {
                        run_task(name, task);
                    }
                }
                if !timers.is_empty() {
                    tracing::debug!(worker = %name, dropped = timers.len(), "dropping delayed tasks on shutdown");
                }
                return;
            }
        }
    }
}

fn run_task(name: &str, task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!(worker = %name, "task panicked");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
