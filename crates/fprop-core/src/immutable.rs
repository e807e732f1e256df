#![forbid(unsafe_code)]

//! Fixed-value properties.

use std::fmt;
use std::sync::{Arc, OnceLock};

use fprop_exec::Executor;

use crate::property::{AsProperty, ChangeListener, Property};

/// A property whose value never changes. Listener calls are accepted and
/// ignored.
pub struct ImmutableProp<T> {
    value: Arc<T>,
}

impl<T> ImmutableProp<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ImmutableProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ImmutableProp").field(&self.value).finish()
    }
}

impl<T: Send + Sync + 'static> Property<T> for ImmutableProp<T> {
    fn value(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    fn may_change(&self) -> bool {
        false
    }

    fn is_concurrent(&self) -> bool {
        true
    }

    fn add_listener(&self, _listener: ChangeListener<T>) {}

    fn add_listener_on(&self, _executor: Arc<dyn Executor>, _listener: ChangeListener<T>) {}

    fn remove_listener(&self, _listener: &ChangeListener<T>) {}
}

impl<T: Send + Sync + 'static> AsProperty<T> for Arc<ImmutableProp<T>> {
    fn as_property(&self) -> Arc<dyn Property<T>> {
        Arc::clone(self) as Arc<dyn Property<T>>
    }
}

/// A fixed property holding `value`.
pub fn immutable_property_of<T: Send + Sync + 'static>(value: T) -> Arc<ImmutableProp<T>> {
    Arc::new(ImmutableProp::new(value))
}

/// One of two process-wide fixed boolean properties.
pub fn immutable_bool(value: bool) -> Arc<ImmutableProp<bool>> {
    static TRUE: OnceLock<Arc<ImmutableProp<bool>>> = OnceLock::new();
    static FALSE: OnceLock<Arc<ImmutableProp<bool>>> = OnceLock::new();
    let slot = if value { &TRUE } else { &FALSE };
    Arc::clone(slot.get_or_init(|| Arc::new(ImmutableProp::new(value))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::listener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fixed_property_never_notifies() {
        let p = immutable_property_of(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let l = listener(move |_: &i32, _: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        p.add_listener(Arc::clone(&l));
        p.remove_listener(&l);
        assert!(!p.may_change());
        assert!(p.is_concurrent());
        assert_eq!(*p.value(), 10);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn booleans_are_singletons() {
        assert!(Arc::ptr_eq(&immutable_bool(true), &immutable_bool(true)));
        assert!(Arc::ptr_eq(&immutable_bool(false), &immutable_bool(false)));
        assert!(!Arc::ptr_eq(&immutable_bool(true), &immutable_bool(false)));
        assert!(*immutable_bool(true).value());
        assert!(!*immutable_bool(false).value());
    }
}
