#![forbid(unsafe_code)]

//! Writable properties and their factories.

use std::fmt;
use std::sync::Arc;

use fprop_exec::Executor;

use crate::affinity::Confinement;
use crate::cell::ValueCell;
use crate::notifier::Notifier;
use crate::packing::ValuePacking;
use crate::property::{AsProperty, ChangeListener, MutableProperty, Property};

/// A writable property in either concurrency mode.
///
/// # Invariants
///
/// 1. `set` always notifies, including when the new value equals the old
///    one; use [`distinct`](crate::PropertyExt::distinct) to filter.
/// 2. Concurrent notifications follow the order in which mutations took
///    effect.
pub struct MutableProp<T: Send + Sync + 'static> {
    cell: ValueCell<T>,
    notifier: Notifier<ValuePacking<T>>,
}

impl<T: Send + Sync + 'static> MutableProp<T> {
    /// A property holding `value`; concurrent or confined to the calling
    /// thread.
    pub fn new(value: T, concurrent: bool) -> Self {
        Self {
            cell: ValueCell::new(Arc::new(value), concurrent),
            notifier: Notifier::new(Confinement::for_mode(concurrent)),
        }
    }

    /// Whether any listener is registered.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.notifier.is_observed()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.notifier.len()
    }

    /// Replace the value and notify `(old, value)`. Unlike
    /// [`compare_and_set`](MutableProperty::compare_and_set) this needs no
    /// equality on `T`.
    #[track_caller]
    pub fn set(&self, value: T) {
        self.set_arc(Arc::new(value));
    }

    #[track_caller]
    pub fn set_arc(&self, value: Arc<T>) {
        self.notifier.confinement().assert();
        let (seq, old) = self.cell.swap(Arc::clone(&value));
        self.notifier.notify(seq, old, value);
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for MutableProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableProp")
            .field("confinement", &self.notifier.confinement())
            .field("listeners", &self.notifier.len())
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Property<T> for MutableProp<T> {
    #[track_caller]
    fn value(&self) -> Arc<T> {
        self.notifier.confinement().assert();
        self.cell.load()
    }

    fn may_change(&self) -> bool {
        true
    }

    fn is_concurrent(&self) -> bool {
        self.notifier.is_concurrent()
    }

    fn add_listener(&self, listener: ChangeListener<T>) {
        self.notifier.add(listener);
    }

    fn add_listener_on(&self, executor: Arc<dyn Executor>, listener: ChangeListener<T>) {
        self.notifier.add_on(executor, listener);
    }

    fn remove_listener(&self, listener: &ChangeListener<T>) {
        self.notifier.remove(listener);
    }
}

impl<T: PartialEq + Send + Sync + 'static> MutableProperty<T> for MutableProp<T> {
    #[track_caller]
    fn set_arc(&self, value: Arc<T>) {
        MutableProp::set_arc(self, value);
    }

    #[track_caller]
    fn compare_and_set_arc(&self, expected: &T, new: Arc<T>) -> bool {
        self.notifier.confinement().assert();
        match self.cell.compare_and_set(expected, Arc::clone(&new)) {
            Some((seq, old)) => {
                self.notifier.notify(seq, old, new);
                true
            }
            None => false,
        }
    }
}

impl<T: Send + Sync + 'static> AsProperty<T> for Arc<MutableProp<T>> {
    fn as_property(&self) -> Arc<dyn Property<T>> {
        Arc::clone(self) as Arc<dyn Property<T>>
    }
}

// ─── Factories ───────────────────────────────────────────────────────────────

/// A mutable property, concurrent or confined to the calling thread.
pub fn mutable_property_of<T: Send + Sync + 'static>(value: T, concurrent: bool) -> Arc<MutableProp<T>> {
    Arc::new(MutableProp::new(value, concurrent))
}

/// A mutable property usable from any thread.
pub fn concurrent_mutable_property_of<T: Send + Sync + 'static>(value: T) -> Arc<MutableProp<T>> {
    mutable_property_of(value, true)
}

/// A mutable property confined to the calling thread.
pub fn unsynchronized_mutable_property_of<T: Send + Sync + 'static>(
    value: T,
) -> Arc<MutableProp<T>> {
    mutable_property_of(value, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::listener;
    use fprop_exec::ManualExecutor;
    use std::sync::Mutex;

    fn recorder<T: Clone + Send + 'static>() -> (ChangeListener<T>, Arc<Mutex<Vec<(T, T)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let l = listener(move |o: &T, n: &T| sink.lock().unwrap().push((o.clone(), n.clone())));
        (l, log)
    }

    #[test]
    fn set_notifies_even_when_equal() {
        for concurrent in [false, true] {
            let p = mutable_property_of(1, concurrent);
            let (l, log) = recorder();
            p.add_listener(l);
            p.set(2);
            p.set(2);
            assert_eq!(*p.value(), 2);
            assert_eq!(*log.lock().unwrap(), vec![(1, 2), (2, 2)]);
        }
    }

    #[test]
    fn compare_and_set_success_and_failure() {
        for concurrent in [false, true] {
            let p = mutable_property_of("a".to_string(), concurrent);
            let (l, log) = recorder();
            p.add_listener(l);
            assert!(!p.compare_and_set(&"zzz".to_string(), "b".into()));
            assert!(log.lock().unwrap().is_empty());
            assert!(p.compare_and_set(&"a".to_string(), "b".into()));
            assert_eq!(*p.value(), "b");
            assert_eq!(
                *log.lock().unwrap(),
                vec![("a".to_string(), "b".to_string())]
            );
        }
    }

    #[test]
    fn set_needs_no_equality() {
        struct Opaque(u32);
        for concurrent in [false, true] {
            let p = mutable_property_of(Opaque(1), concurrent);
            let log = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&log);
            p.add_listener(listener(move |o: &Opaque, n: &Opaque| {
                sink.lock().unwrap().push((o.0, n.0));
            }));
            p.set(Opaque(2));
            assert_eq!(p.value().0, 2);
            assert_eq!(*log.lock().unwrap(), vec![(1, 2)]);
        }
    }

    #[test]
    fn remove_twice_is_noop() {
        let p = concurrent_mutable_property_of(0);
        let (l, log) = recorder();
        p.add_listener(Arc::clone(&l));
        p.remove_listener(&l);
        p.remove_listener(&l);
        p.set(1);
        assert!(log.lock().unwrap().is_empty());
        assert!(!p.is_observed());
    }

    #[test]
    fn remove_raw_listener_registered_on_executor() {
        let exec = ManualExecutor::new();
        let p = concurrent_mutable_property_of(0);
        let (l, log) = recorder();
        p.add_listener_on(exec.as_executor(), Arc::clone(&l));
        p.set(1);
        p.remove_listener(&l);
        exec.run_pending();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(p.listener_count(), 0);
    }

    #[test]
    fn confined_property_panics_off_thread() {
        let p = unsynchronized_mutable_property_of(5);
        assert!(!p.is_concurrent());
        let remote = Arc::clone(&p);
        assert!(std::thread::spawn(move || *remote.value()).join().is_err());
        let remote = Arc::clone(&p);
        assert!(std::thread::spawn(move || remote.set(6)).join().is_err());
        assert_eq!(*p.value(), 5);
    }

    #[test]
    fn concurrent_property_is_usable_everywhere() {
        let p = concurrent_mutable_property_of(5);
        let remote = Arc::clone(&p);
        std::thread::spawn(move || remote.set(6)).join().unwrap();
        assert_eq!(*p.value(), 6);
    }

    #[test]
    fn listener_added_inside_listener_sees_later_changes() {
        let p = unsynchronized_mutable_property_of(0);
        let (late, late_log) = recorder();
        let weak = Arc::downgrade(&p);
        let once = Mutex::new(Some(late));
        p.add_listener(listener(move |_: &i32, _: &i32| {
            if let (Some(p), Some(l)) = (weak.upgrade(), once.lock().unwrap().take()) {
                p.add_listener(l);
            }
        }));
        p.set(1);
        p.set(2);
        assert_eq!(*late_log.lock().unwrap(), vec![(1, 2)]);
    }
}
