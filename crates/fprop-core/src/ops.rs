#![forbid(unsafe_code)]

//! Convenience derivations for common value types.
//!
//! Everything here is a thin layer over [`PropertyExt::map`],
//! [`PropertyExt::combine`] and [`combine_all`], so the laziness, fixed-source
//! short-circuits and concurrency rules of those combinators apply as-is.

use std::sync::Arc;

use crate::combinators::{PropertyExt, combine_all};
use crate::property::{AsProperty, ChangeListener, MutableProperty, Property};

// ─── Booleans ────────────────────────────────────────────────────────────────

/// Logic over boolean properties.
pub trait BoolPropertyExt: AsProperty<bool> {
    fn not(&self) -> Arc<dyn Property<bool>> {
        self.map(|v: &bool| !*v)
    }

    fn and(&self, that: &impl AsProperty<bool>) -> Arc<dyn Property<bool>> {
        self.combine(that, |a: &bool, b: &bool| *a && *b)
    }

    fn or(&self, that: &impl AsProperty<bool>) -> Arc<dyn Property<bool>> {
        self.combine(that, |a: &bool, b: &bool| *a || *b)
    }

    fn xor(&self, that: &impl AsProperty<bool>) -> Arc<dyn Property<bool>> {
        self.combine(that, |a: &bool, b: &bool| *a ^ *b)
    }
}

impl<A: AsProperty<bool> + ?Sized> BoolPropertyExt for A {}

/// Flag-style writes on mutable boolean properties.
pub trait MutableBoolExt: MutableProperty<bool> {
    /// Set to `true`.
    fn set_true(&self) {
        self.set(true);
    }

    /// Set to `false`.
    fn clear(&self) {
        self.set(false);
    }

    /// Every time the flag becomes `true` (including right now), reset it
    /// to `false` and run `action`. Returns the installed listener.
    fn clear_each_and<F>(self: &Arc<Self>, action: F) -> ChangeListener<bool>
    where
        Self: Sized + 'static,
        F: Fn() + Send + Sync + 'static,
    {
        let flag = Arc::downgrade(self);
        crate::replay::on_each(&**self, move |raised: &bool| {
            if !*raised {
                return;
            }
            if let Some(flag) = flag.upgrade() {
                flag.clear();
                action();
            }
        })
    }
}

impl<P: MutableProperty<bool> + ?Sized> MutableBoolExt for P {}

// ─── Text ────────────────────────────────────────────────────────────────────

/// Derived views of string properties.
pub trait TextPropertyExt: AsProperty<String> {
    /// Length in characters.
    fn length(&self) -> Arc<dyn Property<usize>> {
        self.map(|s: &String| s.chars().count())
    }

    fn is_empty(&self) -> Arc<dyn Property<bool>> {
        self.map(|s: &String| s.is_empty())
    }

    fn is_not_empty(&self) -> Arc<dyn Property<bool>> {
        self.map(|s: &String| !s.is_empty())
    }

    /// `true` when empty or whitespace only.
    fn is_blank(&self) -> Arc<dyn Property<bool>> {
        self.map(|s: &String| s.trim().is_empty())
    }

    fn is_not_blank(&self) -> Arc<dyn Property<bool>> {
        self.map(|s: &String| !s.trim().is_empty())
    }

    /// Leading and trailing whitespace removed.
    fn trimmed(&self) -> Arc<dyn Property<String>> {
        self.map(|s: &String| s.trim().to_owned())
    }
}

impl<A: AsProperty<String> + ?Sized> TextPropertyExt for A {}

// ─── Bulk ────────────────────────────────────────────────────────────────────

/// One property computed from the values of all `sources`, in order.
pub fn map_value_list<T, U, F>(sources: &[Arc<dyn Property<T>>], transform: F) -> Arc<dyn Property<U>>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(&[&T]) -> U + Send + Sync + 'static,
{
    combine_all(sources.to_vec(), transform)
}

/// Left fold over the values of `sources`.
pub fn fold_values<T, U, F>(sources: &[Arc<dyn Property<T>>], initial: U, operation: F) -> Arc<dyn Property<U>>
where
    T: Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(U, &T) -> U + Send + Sync + 'static,
{
    map_value_list(sources, move |values: &[&T]| {
        values
            .iter()
            .fold(initial.clone(), |acc, value| operation(acc, value))
    })
}

/// The first value matching `predicate`, if any.
pub fn first_value_or_none<T, P>(sources: &[Arc<dyn Property<T>>], predicate: P) -> Arc<dyn Property<Option<T>>>
where
    T: Clone + Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    map_value_list(sources, move |values: &[&T]| {
        values.iter().find(|v| predicate(v)).map(|v| T::clone(v))
    })
}

/// The values matching `predicate`, in source order.
pub fn filter_values<T, P>(sources: &[Arc<dyn Property<T>>], predicate: P) -> Arc<dyn Property<Vec<T>>>
where
    T: Clone + Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    map_value_list(sources, move |values: &[&T]| {
        values
            .iter()
            .filter(|v| predicate(v))
            .map(|v| T::clone(v))
            .collect()
    })
}

/// Whether any source holds `value`.
pub fn contains_value<T>(sources: &[Arc<dyn Property<T>>], value: T) -> Arc<dyn Property<bool>>
where
    T: PartialEq + Send + Sync + 'static,
{
    map_value_list(sources, move |values: &[&T]| values.iter().any(|v| **v == value))
}

/// Whether every one of `wanted` is held by some source.
pub fn contains_all_values<T>(sources: &[Arc<dyn Property<T>>], wanted: Vec<T>) -> Arc<dyn Property<bool>>
where
    T: PartialEq + Send + Sync + 'static,
{
    map_value_list(sources, move |values: &[&T]| {
        wanted.iter().all(|w| values.iter().any(|v| *v == w))
    })
}

/// Whether every value matches `predicate` (`true` for no sources).
pub fn all_values<T, P>(sources: &[Arc<dyn Property<T>>], predicate: P) -> Arc<dyn Property<bool>>
where
    T: Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    map_value_list(sources, move |values: &[&T]| values.iter().all(|v| predicate(v)))
}

/// Whether some value matches `predicate`.
pub fn any_value<T, P>(sources: &[Arc<dyn Property<T>>], predicate: P) -> Arc<dyn Property<bool>>
where
    T: Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    map_value_list(sources, move |values: &[&T]| values.iter().any(|v| predicate(v)))
}
