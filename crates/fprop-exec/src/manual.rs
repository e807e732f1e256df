#![forbid(unsafe_code)]

//! A manually pumped executor with a virtual clock.
//!
//! [`ManualExecutor`] queues every submitted task until the test calls
//! [`run_pending`](ManualExecutor::run_pending), and keeps delayed tasks on
//! a virtual timeline advanced with [`advance`](ManualExecutor::advance).
//! Nothing ever runs on its own, which makes dispatch and debounce behavior
//! fully deterministic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use web_time::Duration;

use crate::context::{Executor, ScheduledTask, Scheduler, Task, ThreadContext};

struct Delayed {
    due: Duration,
    order: u64,
    handle: ScheduledTask,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    order: u64,
    ready: VecDeque<Task>,
    delayed: Vec<Delayed>,
}

/// Queue-backed [`Executor`] + [`Scheduler`] driven by the caller.
#[derive(Default)]
pub struct ManualExecutor {
    state: Mutex<ManualState>,
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualExecutor")
            .field("now", &state.now)
            .field("ready", &state.ready.len())
            .field("delayed", &state.delayed.len())
            .finish()
    }
}

impl ManualExecutor {
    /// Create a new executor at virtual time zero.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A [`ThreadContext`] using this executor as both executor and scheduler.
    #[must_use]
    pub fn context(self: &Arc<Self>) -> ThreadContext {
        let executor: Arc<dyn Executor> = self.clone();
        let scheduler: Arc<dyn Scheduler> = self.clone();
        ThreadContext::new(executor).with_scheduler(scheduler)
    }

    /// This executor as a trait object.
    #[must_use]
    pub fn as_executor(self: &Arc<Self>) -> Arc<dyn Executor> {
        self.clone()
    }

    /// This executor as a scheduler trait object.
    #[must_use]
    pub fn as_scheduler(self: &Arc<Self>) -> Arc<dyn Scheduler> {
        self.clone()
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of tasks ready to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().ready.len()
    }

    /// Number of delayed tasks not yet due (canceled ones included until
    /// their deadline passes).
    #[must_use]
    pub fn delayed(&self) -> usize {
        self.lock().delayed.len()
    }

    /// Run ready tasks until the queue is empty, including tasks submitted by
    /// the tasks themselves. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.lock().ready.pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move the virtual clock forward by `by`, promote due delayed tasks in
    /// deadline order and run everything that is ready. Returns the number
    /// of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        {
            let mut state = self.lock();
            state.now += by;
            let now = state.now;
            let mut due: Vec<Delayed> = Vec::new();
            let mut i = 0;
            while i < state.delayed.len() {
                if state.delayed[i].due <= now {
                    due.push(state.delayed.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            due.sort_by_key(|d| (d.due, d.order));
            for delayed in due {
                if !delayed.handle.is_canceled() {
                    state.ready.push_back(delayed.task);
                }
            }
        }
        self.run_pending()
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: Task) {
        self.lock().ready.push_back(task);
    }
}

impl Scheduler for ManualExecutor {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let handle = ScheduledTask::new();
        let mut state = self.lock();
        state.order += 1;
        let delayed = Delayed {
            due: state.now + delay,
            order: state.order,
            handle: handle.clone(),
            task,
        };
        state.delayed.push(delayed);
        handle
    }
}
