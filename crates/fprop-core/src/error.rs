#![forbid(unsafe_code)]

//! Usage errors.
//!
//! None of these are recoverable races: each one means a property was used
//! outside its contract. Entry points that cannot return a `Result` panic
//! with the error's message via [`UsageError::raise`].

use std::thread::ThreadId;

/// A violated usage precondition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// A thread-confined property was touched from a foreign thread.
    #[error("property confined to thread {owner:?} was accessed from thread {current:?}")]
    WrongThread { owner: ThreadId, current: ThreadId },

    /// A debounced property has no scheduler to defer delivery with.
    #[error("debounced property needs a scheduler, but none is installed on this thread")]
    NoScheduler,

    /// A thread-confined property cannot route results back to its thread.
    #[error("thread-confined property needs an executor installed on its own thread")]
    NoHomeExecutor,
}

impl UsageError {
    /// Abort the current operation with this error.
    #[track_caller]
    pub fn raise(self) -> ! {
        panic!("{self}")
    }
}
