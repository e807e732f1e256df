#![forbid(unsafe_code)]

//! The listener registry every live property is built on.
//!
//! # Design
//!
//! [`Notifier<P>`] fixes a [`Confinement`] at construction and stores its
//! listeners in the matching implementation from [`crate::listeners`]. The
//! payload format is chosen by the [`Packing`] parameter, so plain and
//! diff-carrying properties share one registry.
//!
//! Binding rules:
//!
//! | Call | Confined | Concurrent |
//! |------|----------|------------|
//! | `add(l)` | invoked in place | bound to the caller's installed executor, if any |
//! | `add_on(inline, l)` | invoked in place | invoked in place |
//! | `add_on(own executor, l)` | invoked in place | wrapped; invoked in place when notified from that executor |
//! | `add_on(other, l)` | wrapped | wrapped |
//!
//! # Invariants
//!
//! 1. `remove` matches the original listener even when it was wrapped.
//! 2. Removing a listener that is not registered is a silent no-op.
//! 3. Every sequence number passed to `notify` is delivered exactly once and
//!    in ascending order, so callers must notify every number they issue.

use std::fmt;
use std::sync::Arc;

use fprop_exec::{Executor, current_executor, is_current_executor};

use crate::affinity::Confinement;
use crate::dispatch::Slot;
use crate::listeners::{Change, ConcurrentListeners, ConfinedListeners, Removal};
use crate::packing::Packing;

enum Listeners<P: Packing> {
    Confined(ConfinedListeners<P>),
    Concurrent(ConcurrentListeners<P>),
}

/// A listener registry parameterized by its packing strategy.
pub struct Notifier<P: Packing> {
    confinement: Confinement,
    listeners: Listeners<P>,
}

impl<P: Packing> fmt::Debug for Notifier<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("confinement", &self.confinement)
            .field("listeners", &self.len())
            .finish()
    }
}

impl<P: Packing> Notifier<P> {
    pub fn new(confinement: Confinement) -> Self {
        let listeners = match confinement {
            Confinement::Concurrent => Listeners::Concurrent(ConcurrentListeners::default()),
            Confinement::Thread(_) => Listeners::Confined(ConfinedListeners::default()),
        };
        Self {
            confinement,
            listeners,
        }
    }

    #[must_use]
    pub fn confinement(&self) -> Confinement {
        self.confinement
    }

    #[must_use]
    pub fn is_concurrent(&self) -> bool {
        self.confinement.is_concurrent()
    }

    fn insert(&self, slot: Slot<P>) -> bool {
        let became_observed = match &self.listeners {
            Listeners::Confined(set) => set.add(slot),
            Listeners::Concurrent(set) => set.add(slot),
        };
        tracing::trace!(
            concurrent = self.is_concurrent(),
            became_observed,
            "listener added"
        );
        became_observed
    }

    /// Register `listener` on the caller's default context.
    ///
    /// Returns whether this registration made the registry observed.
    #[track_caller]
    pub fn add(&self, listener: P::Listener) -> bool {
        self.confinement.assert();
        let slot = match (&self.listeners, current_executor()) {
            (Listeners::Concurrent(_), Some(executor)) => Slot::bind(executor, listener),
            _ => Slot::Direct(listener),
        };
        self.insert(slot)
    }

    /// Register `listener` to be called on `executor`.
    ///
    /// Returns whether this registration made the registry observed.
    #[track_caller]
    pub fn add_on(&self, executor: Arc<dyn Executor>, listener: P::Listener) -> bool {
        self.confinement.assert();
        let slot = match &self.listeners {
            Listeners::Confined(_) if is_current_executor(&executor) => Slot::Direct(listener),
            _ => Slot::bind(executor, listener),
        };
        self.insert(slot)
    }

    /// Remove the first registration of `listener`, wherever it was bound.
    #[track_caller]
    pub fn remove(&self, listener: &P::Listener) -> Removal {
        self.confinement.assert();
        let removal = match &self.listeners {
            Listeners::Confined(set) => set.remove(listener),
            Listeners::Concurrent(set) => set.remove(listener),
        };
        if removal.removed {
            tracing::trace!(
                concurrent = self.is_concurrent(),
                emptied = removal.emptied,
                "listener removed"
            );
        }
        removal
    }

    /// Whether at least one listener is registered.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        !self.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.listeners {
            Listeners::Confined(set) => set.len(),
            Listeners::Concurrent(set) => set.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.listeners {
            Listeners::Confined(set) => set.is_empty(),
            Listeners::Concurrent(set) => set.is_empty(),
        }
    }

    /// Notify listeners of mutation `seq`, a transition from `old` to the
    /// value packed in `new`.
    pub fn notify(&self, seq: u64, old: Arc<P::Value>, new: P::Packed) {
        let change = Change { seq, old, new };
        match &self.listeners {
            Listeners::Confined(set) => set.notify(change),
            Listeners::Concurrent(set) => set.notify(change),
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
    use tracing_test::traced_test;

    type P = ValuePacking<i32>;

    fn recorder() -> (ChangeListener<i32>, Arc<Mutex<Vec<(i32, i32)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let l = listener(move |o: &i32, n: &i32| sink.lock().unwrap().push((*o, *n)));
        (l, log)
    }

    fn notify(n: &Notifier<P>, seq: u64, old: i32, new: i32) {
        n.notify(seq, Arc::new(old), Arc::new(new));
    }

    #[test]
    fn confined_add_delivers_in_place() {
        let n = Notifier::<P>::new(Confinement::current_thread());
        let (l, log) = recorder();
        assert!(n.add(l));
        notify(&n, 1, 0, 1);
        assert_eq!(*log.lock().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn confined_add_on_own_executor_skips_wrapper() {
        let exec = ManualExecutor::new();
        let _guard = enter(exec.context());
        let n = Notifier::<P>::new(Confinement::current_thread());
        let (l, log) = recorder();
        n.add_on(exec.as_executor(), l);
        notify(&n, 1, 0, 1);
        assert_eq!(exec.pending(), 0);
        assert_eq!(*log.lock().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn add_on_foreign_executor_defers() {
        for confinement in [Confinement::current_thread(), Confinement::Concurrent] {
            let exec = ManualExecutor::new();
            let n = Notifier::<P>::new(confinement);
            let (l, log) = recorder();
            n.add_on(exec.as_executor(), l);
            notify(&n, 1, 0, 1);
            assert!(log.lock().unwrap().is_empty());
            exec.run_pending();
            assert_eq!(*log.lock().unwrap(), vec![(0, 1)]);
        }
    }

    #[test]
    fn concurrent_add_binds_to_installed_executor() {
        let exec = ManualExecutor::new();
        let n = Notifier::<P>::new(Confinement::Concurrent);
        let (l, log) = recorder();
        {
            let _guard = enter(exec.context());
            n.add(l);
        }
        notify(&n, 1, 0, 1);
        assert!(log.lock().unwrap().is_empty());
        exec.run_pending();
        assert_eq!(*log.lock().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn concurrent_add_without_context_is_inline() {
        let n = Notifier::<P>::new(Confinement::Concurrent);
        let (l, log) = recorder();
        n.add(l);
        notify(&n, 1, 0, 1);
        assert_eq!(*log.lock().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn remove_by_raw_listener_after_dispatch_binding() {
        let exec = ManualExecutor::new();
        let n = Notifier::<P>::new(Confinement::Concurrent);
        let (l, log) = recorder();
        n.add_on(exec.as_executor(), Arc::clone(&l));
        n.add_on(unconfined(), listener(|_, _| {}));
        notify(&n, 1, 0, 1);
        let first = n.remove(&l);
        assert!(first.removed);
        assert!(!first.emptied);
        assert!(!n.remove(&l).removed);
        exec.run_pending();
        assert!(log.lock().unwrap().is_empty());
        assert!(n.is_observed());
    }

    #[test]
    fn confined_registry_rejects_foreign_threads() {
        let n = Arc::new(Notifier::<P>::new(Confinement::current_thread()));
        let remote = Arc::clone(&n);
        let joined = std::thread::spawn(move || {
            remote.add(listener(|_, _| {}));
        })
        .join();
        assert!(joined.is_err());
        assert!(!n.is_observed());
    }

    #[test]
    #[traced_test]
    fn registration_is_traced() {
        let n = Notifier::<P>::new(Confinement::Concurrent);
        let (l, _) = recorder();
        n.add(Arc::clone(&l));
        n.remove(&l);
        assert!(logs_contain("listener added"));
        assert!(logs_contain("listener removed"));
    }
}
