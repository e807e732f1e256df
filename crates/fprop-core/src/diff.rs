#![forbid(unsafe_code)]

//! Properties whose notifications carry a change description.
//!
//! # Design
//!
//! [`MutableDiffProp<T, D>`] is [`MutableProp`](crate::MutableProp) over a
//! [`DiffPacking`] registry: every write supplies a `D` describing the
//! transition, and the registry ships `(value, diff)` to its listeners.
//! Plain `(old, new)` listeners register through the ordinary
//! [`Property`] surface and never see the diff; diff-aware listeners
//! register through [`DiffProperty`].
//!
//! When `D: Default`, the plain [`MutableProperty`] writes are available
//! too and notify with `D::default()`.

use std::fmt;
use std::sync::Arc;

use fprop_exec::Executor;

use crate::affinity::Confinement;
use crate::cell::ValueCell;
use crate::notifier::Notifier;
use crate::packing::{DiffChangeListener, DiffListener, DiffPacking, Packing};
use crate::property::{AsProperty, ChangeListener, MutableProperty, Property};

/// A property that also notifies `(old, new, diff)` listeners.
pub trait DiffProperty<T, D>: Property<T> {
    /// Register a diff-aware listener on the caller's default context.
    fn add_diff_listener(&self, listener: DiffChangeListener<T, D>);

    /// Register a diff-aware listener to be called on `executor`.
    fn add_diff_listener_on(&self, executor: Arc<dyn Executor>, listener: DiffChangeListener<T, D>);

    /// Remove a diff-aware listener. A no-op if absent.
    fn remove_diff_listener(&self, listener: &DiffChangeListener<T, D>);
}

/// A writable diff-carrying property in either concurrency mode.
pub struct MutableDiffProp<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    cell: ValueCell<T>,
    notifier: Notifier<DiffPacking<T, D>>,
}

impl<T, D> fmt::Debug for MutableDiffProp<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableDiffProp")
            .field("confinement", &self.notifier.confinement())
            .field("listeners", &self.notifier.len())
            .finish_non_exhaustive()
    }
}

impl<T, D> MutableDiffProp<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    pub fn new(value: T, concurrent: bool) -> Self {
        Self {
            cell: ValueCell::new(Arc::new(value), concurrent),
            notifier: Notifier::new(Confinement::for_mode(concurrent)),
        }
    }

    /// Whether any listener of either kind is registered.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.notifier.is_observed()
    }

    /// Replace the value, notifying with `diff`.
    #[track_caller]
    pub fn set(&self, value: T, diff: D) {
        self.set_arc_with(Arc::new(value), diff);
    }

    #[track_caller]
    fn set_arc_with(&self, value: Arc<T>, diff: D) {
        self.notifier.confinement().assert();
        let (seq, old) = self.cell.swap(Arc::clone(&value));
        self.notifier.notify(seq, old, DiffPacking::<T, D>::pack(value, diff));
    }
}

impl<T, D> MutableDiffProp<T, D>
where
    T: PartialEq + Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    /// Replace the value with `new` iff it equals `expected`, notifying
    /// with `diff` on success.
    #[track_caller]
    pub fn compare_and_set(&self, expected: &T, new: T, diff: D) -> bool {
        self.compare_and_set_arc_with(expected, Arc::new(new), diff)
    }

    #[track_caller]
    fn compare_and_set_arc_with(&self, expected: &T, new: Arc<T>, diff: D) -> bool {
        self.notifier.confinement().assert();
        match self.cell.compare_and_set(expected, Arc::clone(&new)) {
            Some((seq, old)) => {
                self.notifier.notify(seq, old, DiffPacking::<T, D>::pack(new, diff));
                true
            }
            None => false,
        }
    }
}

impl<T, D> Property<T> for MutableDiffProp<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
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
        self.notifier.add(DiffListener::Plain(listener));
    }

    fn add_listener_on(&self, executor: Arc<dyn Executor>, listener: ChangeListener<T>) {
        self.notifier.add_on(executor, DiffListener::Plain(listener));
    }

    fn remove_listener(&self, listener: &ChangeListener<T>) {
        self.notifier.remove(&DiffListener::Plain(Arc::clone(listener)));
    }
}

impl<T, D> DiffProperty<T, D> for MutableDiffProp<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    fn add_diff_listener(&self, listener: DiffChangeListener<T, D>) {
        self.notifier.add(DiffListener::Diff(listener));
    }

    fn add_diff_listener_on(&self, executor: Arc<dyn Executor>, listener: DiffChangeListener<T, D>) {
        self.notifier.add_on(executor, DiffListener::Diff(listener));
    }

    fn remove_diff_listener(&self, listener: &DiffChangeListener<T, D>) {
        self.notifier.remove(&DiffListener::Diff(Arc::clone(listener)));
    }
}

impl<T, D> MutableProperty<T> for MutableDiffProp<T, D>
where
    T: PartialEq + Send + Sync + 'static,
    D: Default + Send + Sync + 'static,
{
    #[track_caller]
    fn set_arc(&self, value: Arc<T>) {
        self.set_arc_with(value, D::default());
    }

    #[track_caller]
    fn compare_and_set_arc(&self, expected: &T, new: Arc<T>) -> bool {
        self.compare_and_set_arc_with(expected, new, D::default())
    }
}

impl<T, D> AsProperty<T> for Arc<MutableDiffProp<T, D>>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    fn as_property(&self) -> Arc<dyn Property<T>> {
        Arc::clone(self) as Arc<dyn Property<T>>
    }
}

/// A diff-carrying mutable property, concurrent or confined to the calling
/// thread.
pub fn mutable_diff_property_of<T, D>(value: T, concurrent: bool) -> Arc<MutableDiffProp<T, D>>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    Arc::new(MutableDiffProp::new(value, concurrent))
}

pub fn concurrent_mutable_diff_property_of<T, D>(value: T) -> Arc<MutableDiffProp<T, D>>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    mutable_diff_property_of(value, true)
}

pub fn unsynchronized_mutable_diff_property_of<T, D>(value: T) -> Arc<MutableDiffProp<T, D>>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    mutable_diff_property_of(value, false)
}
