#![forbid(unsafe_code)]

//! Executor and scheduler traits plus the per-thread current context.
//!
//! # Design
//!
//! An [`Executor`] accepts boxed tasks and runs them "soon": inline, on a
//! dedicated thread, or whenever a test pumps a queue. A [`Scheduler`] runs a
//! task after a delay and hands back a [`ScheduledTask`] that can cancel it.
//!
//! Each thread may have a [`ThreadContext`] installed with [`enter`]. Worker
//! threads install themselves on startup, so code running there can ask
//! [`current_executor`] for "the executor that brings me back to this
//! thread". The inline sentinel returned by [`unconfined()`] is never
//! installed; it stands for "whichever thread happens to be running".
//!
//! # Invariants
//!
//! 1. Executor identity is allocation identity of the `Arc`.
//! 2. [`ScheduledTask::cancel`] is monotonic: once canceled, never resumed.
//! 3. Dropping a [`ContextGuard`] restores the context that was installed
//!    before the matching [`enter`] call.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use web_time::Duration;

/// A unit of work submitted to an [`Executor`] or [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs submitted tasks.
pub trait Executor: Send + Sync {
    /// Submit `task` for execution.
    fn execute(&self, task: Task);

    /// Whether tasks run synchronously on the submitting thread.
    ///
    /// Dispatch wrappers are skipped for inline executors.
    fn is_inline(&self) -> bool {
        false
    }
}

/// Something that runs tasks after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed, unless the returned handle is
    /// canceled first.
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Cancellation handle for a task submitted through [`Scheduler::schedule`].
///
/// Clones share the same flag.
#[derive(Clone, Default)]
pub struct ScheduledTask {
    canceled: Arc<AtomicBool>,
}

impl ScheduledTask {
    /// Create a fresh, non-canceled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

// ─── Inline sentinel ─────────────────────────────────────────────────────────

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfined;

impl Executor for Unconfined {
    fn execute(&self, task: Task) {
        task();
    }

    fn is_inline(&self) -> bool {
        true
    }
}

/// The process-wide inline executor.
#[must_use]
pub fn unconfined() -> Arc<dyn Executor> {
    static UNCONFINED: OnceLock<Arc<dyn Executor>> = OnceLock::new();
    Arc::clone(UNCONFINED.get_or_init(|| Arc::new(Unconfined)))
}

// ─── Current thread context ──────────────────────────────────────────────────

/// The executor (and optional scheduler) that leads back to one thread.
#[derive(Clone)]
pub struct ThreadContext {
    executor: Arc<dyn Executor>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl ThreadContext {
    /// A context with an executor only.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            scheduler: None,
        }
    }

    /// Attach a scheduler (required by debounced properties).
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// The executor of this context.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// The scheduler of this context, if any.
    #[must_use]
    pub fn scheduler(&self) -> Option<&Arc<dyn Scheduler>> {
        self.scheduler.as_ref()
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("has_scheduler", &self.scheduler.is_some())
            .finish_non_exhaustive()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<ThreadContext>> = const { RefCell::new(None) };
}

/// Restores the previously installed context when dropped.
///
/// Not `Send`: it must be dropped on the thread that called [`enter`].
#[must_use = "the context is uninstalled when the guard is dropped"]
pub struct ContextGuard {
    previous: Option<ThreadContext>,
    _not_send: PhantomData<*const ()>,
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard").finish_non_exhaustive()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Install `context` as the current thread's context until the guard drops.
pub fn enter(context: ThreadContext) -> ContextGuard {
    let previous = CURRENT.with(|slot| slot.borrow_mut().replace(context));
    ContextGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// The context installed on the current thread, if any.
#[must_use]
pub fn current_context() -> Option<ThreadContext> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// The executor installed on the current thread, if any.
#[must_use]
pub fn current_executor() -> Option<Arc<dyn Executor>> {
    CURRENT.with(|slot| slot.borrow().as_ref().map(|ctx| Arc::clone(&ctx.executor)))
}

/// The scheduler installed on the current thread, if any.
#[must_use]
pub fn current_scheduler() -> Option<Arc<dyn Scheduler>> {
    CURRENT.with(|slot| slot.borrow().as_ref().and_then(|ctx| ctx.scheduler.clone()))
}

/// Whether `executor` is the one installed on the current thread.
#[must_use]
pub fn is_current_executor(executor: &Arc<dyn Executor>) -> bool {
    CURRENT.with(|slot| {
        slot.borrow()
            .as_ref()
            .is_some_and(|ctx| Arc::ptr_eq(&ctx.executor, executor))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
