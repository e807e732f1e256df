#![forbid(unsafe_code)]

//! Observable properties for FrankenProps.
//!
//! # Role in FrankenProps
//! `fprop-core` is the property engine. A property holds one value and tells
//! its listeners about every transition. Each property picks a concurrency
//! mode at construction:
//!
//! - **Thread-confined**: no synchronization; every entry point asserts it
//!   runs on the creating thread.
//! - **Concurrent**: any thread may read, write and (un)register; state is
//!   swapped atomically and never locked, and notifications are delivered in
//!   mutation order.
//!
//! On top of the two registries the crate provides:
//!
//! - **Facade**: [`Property`], [`MutableProperty`], the [`MutableProp`] and
//!   [`ImmutableProp`] implementations, and [`Subscription`] guards.
//! - **Combinators** ([`PropertyExt`]): `map`, `map_on`, `combine`,
//!   [`combine_all`], `distinct`, `debounced`, `read_only_view`.
//! - **Replay**: [`on_each`] delivers the current value and every later one,
//!   without gaps under concurrent writes.
//! - **Atomic updates** ([`MutablePropertyExt`]): compare-and-set loops.
//! - **Diffs**: [`MutableDiffProp`] notifies `(old, new, diff)` listeners
//!   through the same registry via a [`Packing`] strategy.
//! - **Helpers** ([`ops`]): boolean logic, text views, bulk queries.
//!
//! Dispatch targets (executors, schedulers, worker threads) live in
//! `fprop-exec`.

pub mod affinity;
pub mod atomic;
pub(crate) mod cell;
pub mod combinators;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod immutable;
pub mod listeners;
pub mod mutable;
pub mod notifier;
pub mod ops;
pub mod packing;
pub mod property;
pub mod replay;

pub use affinity::Confinement;
pub use atomic::MutablePropertyExt;
pub use combinators::{PropertyExt, combine_all};
pub use diff::{
    DiffProperty, MutableDiffProp, concurrent_mutable_diff_property_of, mutable_diff_property_of,
    unsynchronized_mutable_diff_property_of,
};
pub use error::UsageError;
pub use immutable::{ImmutableProp, immutable_bool, immutable_property_of};
pub use mutable::{
    MutableProp, concurrent_mutable_property_of, mutable_property_of,
    unsynchronized_mutable_property_of,
};
pub use notifier::Notifier;
pub use ops::{BoolPropertyExt, MutableBoolExt, TextPropertyExt};
pub use packing::{DiffChangeListener, DiffListener, DiffPacking, Packing, ValuePacking};
pub use property::{AsProperty, ChangeListener, MutableProperty, Property, Subscription, listener};
pub use replay::on_each;
