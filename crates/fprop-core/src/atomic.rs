#![forbid(unsafe_code)]

//! Optimistic read-modify-write helpers built on compare-and-set.
//!
//! Every retry re-reads the property and re-runs the updater against the
//! freshest value, so a computation is never applied to a value it was not
//! derived from.

use std::sync::Arc;

use crate::property::MutableProperty;

/// Atomic update loops for any [`MutableProperty`].
pub trait MutablePropertyExt<T>: MutableProperty<T> {
    /// Apply `f` and return the value it replaced.
    fn get_and_update<F>(&self, f: F) -> Arc<T>
    where
        F: Fn(&T) -> T,
    {
        loop {
            let current = self.value();
            let next = Arc::new(f(&current));
            if self.compare_and_set_arc(&current, next) {
                return current;
            }
        }
    }

    /// Apply `f` and return the value it produced.
    fn update_and_get<F>(&self, f: F) -> Arc<T>
    where
        F: Fn(&T) -> T,
    {
        loop {
            let current = self.value();
            let next = Arc::new(f(&current));
            if self.compare_and_set_arc(&current, Arc::clone(&next)) {
                return next;
            }
        }
    }

    /// Apply `f`.
    fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T,
    {
        let _ = self.update_and_get(f);
    }
}

impl<T, P: MutableProperty<T> + ?Sized> MutablePropertyExt<T> for P {}
