#![forbid(unsafe_code)]

//! FrankenProps public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use fprop_core as core;
pub use fprop_exec as exec;

pub mod prelude {
    pub use fprop_core::{
        AsProperty, BoolPropertyExt, ChangeListener, DiffProperty, ImmutableProp, MutableBoolExt,
        MutableDiffProp, MutableProp, MutableProperty, MutablePropertyExt, Property, PropertyExt,
        Subscription, TextPropertyExt, UsageError, combine_all, concurrent_mutable_property_of,
        immutable_property_of, listener, mutable_property_of, on_each,
        unsynchronized_mutable_property_of,
    };
    pub use fprop_exec::{
        Executor, ManualExecutor, Scheduler, ThreadContext, WorkerConfig, WorkerThread, enter,
        unconfined,
    };
}
