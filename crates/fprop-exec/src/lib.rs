#![forbid(unsafe_code)]

//! Dispatch contexts for FrankenProps.
//!
//! # Role in FrankenProps
//! `fprop-exec` owns the "where does this run" half of the property engine.
//! Properties never spawn threads on their own; they hand closures to an
//! [`Executor`] (run soon, possibly elsewhere) or a [`Scheduler`] (run after a
//! delay, cancellable). This crate provides:
//!
//! - **Traits**: [`Executor`], [`Scheduler`], and the [`ScheduledTask`]
//!   cancellation handle.
//! - **Inline sentinel**: [`unconfined()`] runs tasks on the calling thread.
//! - **Current context**: a per-thread [`ThreadContext`] registry
//!   ([`enter`], [`current_executor`], [`current_scheduler`]) so a listener
//!   registered from a thread can be delivered back to that thread.
//! - **Worker thread**: [`WorkerThread`], a named thread with an event loop
//!   for immediate and delayed tasks.
//! - **Manual executor**: [`ManualExecutor`], a queue driven by a virtual
//!   clock for deterministic tests.

pub mod config;
pub mod context;
pub mod error;
pub mod manual;
pub mod worker;

pub use config::WorkerConfig;
pub use context::{
    ContextGuard, Executor, ScheduledTask, Scheduler, Task, ThreadContext, Unconfined,
    current_context, current_executor, current_scheduler, enter, is_current_executor, unconfined,
};
pub use error::ExecError;
pub use manual::ManualExecutor;
pub use worker::WorkerThread;
