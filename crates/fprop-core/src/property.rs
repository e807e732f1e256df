#![forbid(unsafe_code)]

//! The public property contract.
//!
//! # Design
//!
//! A [`Property<T>`] is a shared, observable holder of one value. Values are
//! handed out as `Arc<T>` so reads never clone `T`. Listeners are
//! [`ChangeListener`]s: shared callbacks whose identity is the allocation
//! of their `Arc`, which is what [`Property::remove_listener`] matches on.
//!
//! Handles are `Arc`s. Anything that can produce an `Arc<dyn Property<T>>`
//! implements [`AsProperty`], which is what the combinator extension traits
//! hang off.
//!
//! # Invariants
//!
//! 1. If `may_change()` is false, the value is fixed and no listener ever
//!    fires.
//! 2. `is_concurrent()` never changes over the lifetime of a property.
//! 3. A listener is invoked with `(old, new)` after the transition it
//!    describes has become visible to readers.

use std::fmt;
use std::sync::Arc;

use fprop_exec::Executor;

/// Callback receiving `(old, new)` after a value transition.
pub type ChangeListener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// Wrap a closure as a [`ChangeListener`].
///
/// Keep the returned `Arc` to remove the listener later.
pub fn listener<T, F>(f: F) -> ChangeListener<T>
where
    T: 'static,
    F: Fn(&T, &T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Allocation identity, ignoring vtable metadata.
pub(crate) fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A read-only observable value.
pub trait Property<T>: Send + Sync {
    /// The current value.
    ///
    /// # Panics
    ///
    /// A thread-confined property panics when read off its thread.
    fn value(&self) -> Arc<T>;

    /// `false` if the value is fixed for the lifetime of the property.
    fn may_change(&self) -> bool;

    /// Whether any thread may use this property.
    fn is_concurrent(&self) -> bool;

    /// Register `listener` on the caller's default context: in place for
    /// thread-confined properties, on the calling thread's installed
    /// executor (or in place without one) for concurrent ones.
    fn add_listener(&self, listener: ChangeListener<T>);

    /// Register `listener` to be called on `executor`.
    fn add_listener_on(&self, executor: Arc<dyn Executor>, listener: ChangeListener<T>);

    /// Remove the first registration of `listener`. A no-op if absent.
    fn remove_listener(&self, listener: &ChangeListener<T>);
}

/// A property that can be written.
pub trait MutableProperty<T>: Property<T> {
    /// Replace the value and notify `(old, value)`, even when they are
    /// equal.
    fn set_arc(&self, value: Arc<T>);

    /// Replace the value with `new` iff it currently equals `expected`.
    /// On success exactly one `(expected, new)` notification follows; on
    /// failure nothing happens.
    fn compare_and_set_arc(&self, expected: &T, new: Arc<T>) -> bool;

    fn set(&self, value: T) {
        self.set_arc(Arc::new(value));
    }

    fn compare_and_set(&self, expected: &T, new: T) -> bool {
        self.compare_and_set_arc(expected, Arc::new(new))
    }
}

/// Conversion to a shared read-only handle.
pub trait AsProperty<T> {
    fn as_property(&self) -> Arc<dyn Property<T>>;
}

impl<T: 'static> AsProperty<T> for Arc<dyn Property<T>> {
    fn as_property(&self) -> Arc<dyn Property<T>> {
        Arc::clone(self)
    }
}

// ─── Subscription guard ──────────────────────────────────────────────────────

/// RAII guard that removes a listener when dropped.
///
/// Returned by [`PropertyExt::subscribe`](crate::PropertyExt::subscribe).
/// Call [`detach`](Self::detach) to keep the listener registered for the
/// lifetime of the property instead.
#[must_use = "dropping a Subscription removes its listener immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Subscribe `listener` to `property` until the guard drops.
    pub fn to<T: 'static>(property: Arc<dyn Property<T>>, listener: ChangeListener<T>) -> Self {
        property.add_listener(Arc::clone(&listener));
        Self::new(move || property.remove_listener(&listener))
    }

    /// Like [`to`](Self::to), delivering on `executor`.
    pub fn to_on<T: 'static>(
        property: Arc<dyn Property<T>>,
        executor: Arc<dyn Executor>,
        listener: ChangeListener<T>,
    ) -> Self {
        property.add_listener_on(executor, Arc::clone(&listener));
        Self::new(move || property.remove_listener(&listener))
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the listener registered forever.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}
