#![forbid(unsafe_code)]

//! Listener-to-executor binding with logical cancellation.
//!
//! # Design
//!
//! A [`Dispatched`] wrapper pairs a listener with the executor it must run
//! on. Delivery submits a task; the task re-checks the cancellation flag
//! immediately before calling the listener, which closes the window between
//! submission and execution.
//!
//! # Invariants
//!
//! 1. Cancellation is monotonic.
//! 2. A canceled wrapper never calls its listener again, although a call
//!    already running may complete.
//! 3. Removal identity is the wrapped listener, not the wrapper.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fprop_exec::{Executor, is_current_executor};

use crate::packing::Packing;

/// A listener bound to an executor.
pub struct Dispatched<P: Packing> {
    executor: Arc<dyn Executor>,
    wrapped: P::Listener,
    canceled: AtomicBool,
}

impl<P: Packing> Dispatched<P> {
    pub fn new(executor: Arc<dyn Executor>, wrapped: P::Listener) -> Arc<Self> {
        Arc::new(Self {
            executor,
            wrapped,
            canceled: AtomicBool::new(false),
        })
    }

    /// The listener this wrapper delivers to.
    pub fn wrapped(&self) -> &P::Listener {
        &self.wrapped
    }

    /// The executor deliveries are submitted to.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Submit a delivery of `old -> new` to the bound executor.
    pub fn dispatch(self: &Arc<Self>, old: Arc<P::Value>, new: P::Packed) {
        if self.is_canceled() {
            return;
        }
        let this = Arc::clone(self);
        self.executor.execute(Box::new(move || {
            if this.is_canceled() {
                tracing::debug!("dispatched listener canceled before delivery");
                return;
            }
            P::invoke(&this.wrapped, &old, &new);
        }));
    }
}

impl<P: Packing> fmt::Debug for Dispatched<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatched")
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}

// ─── Registry slot ───────────────────────────────────────────────────────────

/// One registered listener, either invoked in place or through a dispatch
/// wrapper.
pub enum Slot<P: Packing> {
    Direct(P::Listener),
    Dispatched(Arc<Dispatched<P>>),
}

impl<P: Packing> Clone for Slot<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Direct(l) => Self::Direct(l.clone()),
            Self::Dispatched(d) => Self::Dispatched(Arc::clone(d)),
        }
    }
}

impl<P: Packing> Slot<P> {
    /// Wrap `listener` for `executor`, skipping the wrapper for inline ones.
    pub fn bind(executor: Arc<dyn Executor>, listener: P::Listener) -> Self {
        if executor.is_inline() {
            Self::Direct(listener)
        } else {
            Self::Dispatched(Dispatched::new(executor, listener))
        }
    }

    /// Whether this slot delivers to `listener`.
    pub fn matches(&self, listener: &P::Listener) -> bool {
        match self {
            Self::Direct(l) => P::same_listener(l, listener),
            Self::Dispatched(d) => P::same_listener(&d.wrapped, listener),
        }
    }

    /// Whether this slot will never deliver again.
    pub fn is_canceled(&self) -> bool {
        match self {
            Self::Direct(_) => false,
            Self::Dispatched(d) => d.is_canceled(),
        }
    }

    /// Mark the slot dead; a no-op for direct listeners.
    pub fn cancel(&self) {
        if let Self::Dispatched(d) = self {
            d.cancel();
        }
    }

    /// Deliver `old -> new`. A wrapper bound to the calling thread's own
    /// executor is invoked in place instead of being resubmitted.
    pub fn deliver(&self, old: &Arc<P::Value>, new: &P::Packed) {
        match self {
            Self::Direct(l) => P::invoke(l, old, new),
            Self::Dispatched(d) => {
                if d.is_canceled() {
                    return;
                }
                if is_current_executor(&d.executor) {
                    P::invoke(&d.wrapped, old, new);
                } else {
                    d.dispatch(Arc::clone(old), new.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::ValuePacking;
    use crate::property::{ChangeListener, listener};
    use fprop_exec::{ManualExecutor, enter, unconfined};
    use std::sync::Mutex;

    type P = ValuePacking<i32>;

    fn recorder() -> (ChangeListener<i32>, Arc<Mutex<Vec<(i32, i32)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let l = listener(move |o: &i32, n: &i32| sink.lock().unwrap().push((*o, *n)));
        (l, log)
    }

    #[test]
    fn dispatch_runs_on_executor() {
        let exec = ManualExecutor::new();
        let (l, log) = recorder();
        let slot = Slot::<P>::bind(exec.as_executor(), l);
        slot.deliver(&Arc::new(1), &Arc::new(2));
        assert!(log.lock().unwrap().is_empty());
        exec.run_pending();
        assert_eq!(*log.lock().unwrap(), vec![(1, 2)]);
    }

    #[test]
    fn cancel_between_submit_and_run_suppresses_call() {
        let exec = ManualExecutor::new();
        let (l, log) = recorder();
        let slot = Slot::<P>::bind(exec.as_executor(), l);
        slot.deliver(&Arc::new(1), &Arc::new(2));
        slot.cancel();
        assert_eq!(exec.run_pending(), 1);
        assert!(log.lock().unwrap().is_empty());
        assert!(slot.is_canceled());
    }

    #[test]
    fn canceled_wrapper_submits_nothing() {
        let exec = ManualExecutor::new();
        let (l, _log) = recorder();
        let slot = Slot::<P>::bind(exec.as_executor(), l);
        slot.cancel();
        slot.deliver(&Arc::new(1), &Arc::new(2));
        assert_eq!(exec.pending(), 0);
    }

    #[test]
    fn inline_executor_skips_wrapper() {
        let (l, log) = recorder();
        let slot = Slot::<P>::bind(unconfined(), l);
        assert!(matches!(slot, Slot::Direct(_)));
        slot.deliver(&Arc::new(3), &Arc::new(4));
        assert_eq!(*log.lock().unwrap(), vec![(3, 4)]);
    }

    #[test]
    fn own_executor_is_invoked_in_place() {
        let exec = ManualExecutor::new();
        let _guard = enter(exec.context());
        let (l, log) = recorder();
        let slot = Slot::<P>::bind(exec.as_executor(), l);
        slot.deliver(&Arc::new(5), &Arc::new(6));
        assert_eq!(exec.pending(), 0);
        assert_eq!(*log.lock().unwrap(), vec![(5, 6)]);
    }

    #[test]
    fn matches_by_wrapped_identity() {
        let exec = ManualExecutor::new();
        let (l, _log) = recorder();
        let (other, _) = recorder();
        let slot = Slot::<P>::bind(exec.as_executor(), Arc::clone(&l));
        assert!(slot.matches(&l));
        assert!(!slot.matches(&other));
    }
}
