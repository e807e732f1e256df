#![forbid(unsafe_code)]

//! Subscribe and replay the current value.
//!
//! # Design
//!
//! [`on_each`] delivers one initial call followed by one call per change.
//! A confined property cannot change between registering and reading, so
//! it simply does both in that order. A concurrent property can, so the
//! installed listener and the subscriber share a small [`Replay`] state:
//!
//! | Phase | Listener call |
//! |-------|---------------|
//! | `Pending` | becomes the initial call; the subscriber skips its own |
//! | `Initial` | is queued behind the subscriber's initial call |
//! | `Live` | forwards directly |
//!
//! The subscriber moves `Pending` to `Initial`, reads the value, calls
//! `func`, then drains the queue before switching to `Live`. `func` never
//! runs under the lock, so it may write to the property it follows.
//!
//! # Invariants
//!
//! 1. Exactly one initial call happens, and it is the first call.
//! 2. No change delivered to the listener after registration is skipped.
//! 3. Calls follow notification order; the last call carries the value of
//!    the last notification.
//!
//! # Failure Modes
//!
//! - **Subscriber reads after a raced write became visible**: the initial
//!   call and the queued call for that write carry the same value.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::property::{ChangeListener, Property, listener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Initial,
    Live,
}

struct ReplayState<T> {
    phase: Phase,
    queued: Vec<T>,
}

struct Replay<T> {
    state: Mutex<ReplayState<T>>,
}

impl<T: Clone> Replay<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(ReplayState {
                phase: Phase::Pending,
                queued: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A change reached the installed listener. Returns whether the caller
    /// should forward it now.
    fn on_change(&self, new: &T) -> bool {
        let mut state = self.lock();
        match state.phase {
            Phase::Pending => {
                state.phase = Phase::Live;
                true
            }
            Phase::Initial => {
                state.queued.push(new.clone());
                false
            }
            Phase::Live => true,
        }
    }

    /// Claim the initial call. False if a change already took its place.
    fn claim_initial(&self) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::Pending {
            return false;
        }
        state.phase = Phase::Initial;
        true
    }

    /// Changes queued behind the initial call; empty switches to live.
    fn take_queued(&self) -> Vec<T> {
        let mut state = self.lock();
        if state.queued.is_empty() {
            state.phase = Phase::Live;
        }
        mem::take(&mut state.queued)
    }
}

/// Call `func` with the current value of `property` and then with every new
/// value. Returns the installed listener so it can be removed later.
pub fn on_each<T, F>(property: &dyn Property<T>, func: F) -> ChangeListener<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let func = Arc::new(func);
    if !property.is_concurrent() || !property.may_change() {
        let forward = Arc::clone(&func);
        let installed = listener(move |_: &T, new: &T| forward(new));
        property.add_listener(Arc::clone(&installed));
        func(&property.value());
        return installed;
    }

    let replay = Arc::new(Replay::new());
    let shared = Arc::clone(&replay);
    let forward = Arc::clone(&func);
    let installed = listener(move |_: &T, new: &T| {
        if shared.on_change(new) {
            forward(new);
        }
    });
    property.add_listener(Arc::clone(&installed));
    if replay.claim_initial() {
        func(&property.value());
        loop {
            let queued = replay.take_queued();
            if queued.is_empty() {
                break;
            }
            for value in &queued {
                func(value);
            }
        }
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immutable::immutable_property_of;
    use crate::mutable::{concurrent_mutable_property_of, unsynchronized_mutable_property_of};
    use std::sync::Mutex;

    fn collector() -> (impl Fn(&i32) + Send + Sync + 'static, Arc<Mutex<Vec<i32>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (move |v: &i32| sink.lock().unwrap().push(*v), log)
    }

    #[test]
    fn confined_replays_then_follows() {
        let p = unsynchronized_mutable_property_of(1);
        let (func, log) = collector();
        let installed = on_each(&*p, func);
        p.set(2);
        p.set(3);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        p.remove_listener(&installed);
        p.set(4);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn concurrent_replays_then_follows() {
        let p = concurrent_mutable_property_of(10);
        let (func, log) = collector();
        let _installed = on_each(&*p, func);
        p.set(11);
        assert_eq!(*log.lock().unwrap(), vec![10, 11]);
    }

    #[test]
    fn fixed_property_is_replayed_once() {
        let p = immutable_property_of(7);
        let (func, log) = collector();
        let _ = on_each(&*p, func);
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    /// Applies one write right after each registration, before the
    /// subscriber gets to read.
    struct RacingProp {
        inner: Arc<crate::mutable::MutableProp<i32>>,
        raced: i32,
    }

    impl Property<i32> for RacingProp {
        fn value(&self) -> Arc<i32> {
            self.inner.value()
        }
        fn may_change(&self) -> bool {
            true
        }
        fn is_concurrent(&self) -> bool {
            true
        }
        fn add_listener(&self, listener: ChangeListener<i32>) {
            self.inner.add_listener(listener);
            self.inner.set(self.raced);
        }
        fn add_listener_on(&self, executor: Arc<dyn fprop_exec::Executor>, listener: ChangeListener<i32>) {
            self.inner.add_listener_on(executor, listener);
            self.inner.set(self.raced);
        }
        fn remove_listener(&self, listener: &ChangeListener<i32>) {
            self.inner.remove_listener(listener);
        }
    }

    /// Applies one write right after the first read of the value.
    struct WriteAfterRead {
        inner: Arc<crate::mutable::MutableProp<i32>>,
        raced: i32,
        fired: std::sync::atomic::AtomicBool,
    }

    impl Property<i32> for WriteAfterRead {
        fn value(&self) -> Arc<i32> {
            let current = self.inner.value();
            if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.inner.set(self.raced);
            }
            current
        }
        fn may_change(&self) -> bool {
            true
        }
        fn is_concurrent(&self) -> bool {
            true
        }
        fn add_listener(&self, listener: ChangeListener<i32>) {
            self.inner.add_listener(listener);
        }
        fn add_listener_on(&self, executor: Arc<dyn fprop_exec::Executor>, listener: ChangeListener<i32>) {
            self.inner.add_listener_on(executor, listener);
        }
        fn remove_listener(&self, listener: &ChangeListener<i32>) {
            self.inner.remove_listener(listener);
        }
    }

    #[test]
    fn write_after_initial_read_is_delivered_after_it() {
        let racing = WriteAfterRead {
            inner: concurrent_mutable_property_of(0),
            raced: 1,
            fired: std::sync::atomic::AtomicBool::new(false),
        };
        let (func, log) = collector();
        let _ = on_each(&racing, func);
        assert_eq!(*log.lock().unwrap(), vec![0, 1]);
        racing.inner.set(2);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn writes_from_the_initial_call_follow_it() {
        let p = concurrent_mutable_property_of(0);
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let target = Arc::downgrade(&p);
        let _ = on_each(&*p, move |v: &i32| {
            sink.lock().unwrap().push(*v);
            if *v < 3 {
                if let Some(p) = target.upgrade() {
                    p.set(v + 1);
                }
            }
        });
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(*p.value(), 3);
    }

    #[test]
    fn raced_write_becomes_the_single_initial_call() {
        let racing = RacingProp {
            inner: concurrent_mutable_property_of(0),
            raced: 5,
        };
        let (func, log) = collector();
        let _ = on_each(&racing, func);
        assert_eq!(*log.lock().unwrap(), vec![5]);
        racing.inner.set(6);
        assert_eq!(*log.lock().unwrap(), vec![5, 6]);
    }
}
