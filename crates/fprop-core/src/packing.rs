#![forbid(unsafe_code)]

//! Notification packing strategies.
//!
//! # Design
//!
//! A single registry implementation ([`Notifier`](crate::notifier::Notifier))
//! serves both plain properties and diff-carrying properties. What differs
//! is only *what travels with a notification* and *how a listener is
//! invoked*, so those two concerns are factored into a [`Packing`] strategy
//! chosen by type parameter:
//!
//! | Strategy | Packed payload | Listener kinds |
//! |----------|----------------|----------------|
//! | [`ValuePacking<T>`] | `Arc<T>` | `(old, new)` |
//! | [`DiffPacking<T, D>`] | `(Arc<T>, Arc<D>)` | `(old, new)` and `(old, new, diff)` |
//!
//! # Invariants
//!
//! 1. `unpack_value(pack(v, d))` is `v` (same allocation).
//! 2. `unpack_diff` is `None` for strategies that carry no diff.
//! 3. `same_listener` is allocation identity, never structural equality.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::property::{ChangeListener, same_listener};

/// Pack/unpack triple plus listener invocation.
pub trait Packing: Send + Sync + 'static {
    /// The observed value.
    type Value: Send + Sync + 'static;
    /// Auxiliary change description (`()` when none).
    type Diff: Send + Sync + 'static;
    /// What the registry stores and ships to dispatch contexts.
    type Packed: Clone + Send + Sync + 'static;
    /// Stored listener representation.
    type Listener: Clone + Send + Sync + 'static;

    fn pack(value: Arc<Self::Value>, diff: Self::Diff) -> Self::Packed;

    fn unpack_value(packed: &Self::Packed) -> &Arc<Self::Value>;

    fn unpack_diff(packed: &Self::Packed) -> Option<&Self::Diff>;

    /// Call `listener` for a transition from `old` to `new`.
    fn invoke(listener: &Self::Listener, old: &Self::Value, new: &Self::Packed);

    /// Listener identity.
    fn same_listener(a: &Self::Listener, b: &Self::Listener) -> bool;
}

// ─── Plain values ────────────────────────────────────────────────────────────

/// Packing for properties that notify with bare values.
pub struct ValuePacking<T>(PhantomData<fn() -> T>);

impl<T: Send + Sync + 'static> Packing for ValuePacking<T> {
    type Value = T;
    type Diff = ();
    type Packed = Arc<T>;
    type Listener = ChangeListener<T>;

    #[inline]
    fn pack(value: Arc<T>, _diff: ()) -> Arc<T> {
        value
    }

    #[inline]
    fn unpack_value(packed: &Arc<T>) -> &Arc<T> {
        packed
    }

    #[inline]
    fn unpack_diff(_packed: &Arc<T>) -> Option<&()> {
        None
    }

    #[inline]
    fn invoke(listener: &ChangeListener<T>, old: &T, new: &Arc<T>) {
        listener(old, new);
    }

    fn same_listener(a: &ChangeListener<T>, b: &ChangeListener<T>) -> bool {
        same_listener(a, b)
    }
}

// ─── Values with diffs ───────────────────────────────────────────────────────

/// Listener receiving `(old, new, diff)`.
pub type DiffChangeListener<T, D> = Arc<dyn Fn(&T, &T, &D) + Send + Sync>;

/// A listener registered on a diff-carrying property.
pub enum DiffListener<T, D> {
    /// Receives `(old, new)`; the diff is dropped.
    Plain(ChangeListener<T>),
    /// Receives `(old, new, diff)`.
    Diff(DiffChangeListener<T, D>),
}

impl<T, D> Clone for DiffListener<T, D> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(l) => Self::Plain(Arc::clone(l)),
            Self::Diff(l) => Self::Diff(Arc::clone(l)),
        }
    }
}

impl<T, D> std::fmt::Debug for DiffListener<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("DiffListener::Plain"),
            Self::Diff(_) => f.write_str("DiffListener::Diff"),
        }
    }
}

/// Packing for properties that notify with a value and a diff.
pub struct DiffPacking<T, D>(PhantomData<fn() -> (T, D)>);

impl<T, D> Packing for DiffPacking<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    type Value = T;
    type Diff = D;
    type Packed = (Arc<T>, Arc<D>);
    type Listener = DiffListener<T, D>;

    #[inline]
    fn pack(value: Arc<T>, diff: D) -> Self::Packed {
        (value, Arc::new(diff))
    }

    #[inline]
    fn unpack_value(packed: &Self::Packed) -> &Arc<T> {
        &packed.0
    }

    #[inline]
    fn unpack_diff(packed: &Self::Packed) -> Option<&D> {
        Some(&packed.1)
    }

    fn invoke(listener: &DiffListener<T, D>, old: &T, new: &Self::Packed) {
        match listener {
            DiffListener::Plain(l) => l(old, &new.0),
            DiffListener::Diff(l) => l(old, &new.0, &new.1),
        }
    }

    fn same_listener(a: &DiffListener<T, D>, b: &DiffListener<T, D>) -> bool {
        match (a, b) {
            (DiffListener::Plain(a), DiffListener::Plain(b)) => same_listener(a, b),
            (DiffListener::Diff(a), DiffListener::Diff(b)) => same_listener(a, b),
            _ => false,
        }
    }
}
