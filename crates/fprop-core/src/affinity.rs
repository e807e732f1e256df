#![forbid(unsafe_code)]

//! Concurrency mode of a property, fixed at construction.

use std::thread::{self, ThreadId};

use crate::error::UsageError;

/// Which threads may touch a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confinement {
    /// Any thread may read, write and (de)register listeners.
    Concurrent,
    /// Only the named thread may touch the property.
    Thread(ThreadId),
}

impl Confinement {
    /// Confinement to the calling thread.
    #[must_use]
    pub fn current_thread() -> Self {
        Self::Thread(thread::current().id())
    }

    /// `Concurrent` if `concurrent`, otherwise confined to the calling thread.
    #[must_use]
    pub fn for_mode(concurrent: bool) -> Self {
        if concurrent {
            Self::Concurrent
        } else {
            Self::current_thread()
        }
    }

    /// Whether any thread may access.
    #[must_use]
    pub fn is_concurrent(&self) -> bool {
        matches!(self, Self::Concurrent)
    }

    /// Verify that the calling thread may access.
    pub fn check(&self) -> Result<(), UsageError> {
        match *self {
            Self::Concurrent => Ok(()),
            Self::Thread(owner) => {
                let current = thread::current().id();
                if owner == current {
                    Ok(())
                } else {
                    Err(UsageError::WrongThread { owner, current })
                }
            }
        }
    }

    /// Like [`check`](Self::check), but a violation is fatal.
    #[track_caller]
    #[inline]
    pub fn assert(&self) {
        if let Err(err) = self.check() {
            err.raise();
        }
    }
}
