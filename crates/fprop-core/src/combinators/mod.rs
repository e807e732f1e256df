#![forbid(unsafe_code)]

//! Derived properties.
//!
//! # Design
//!
//! Every combinator returns a new property that holds its sources strongly
//! and is held by them only weakly, and only while it is observed. While
//! unobserved, a derived property computes its value on read. The first
//! listener attaches it to its sources (and primes its cache), the last
//! removal detaches it again. Fixed sources short-circuit: mapping or
//! combining fixed properties computes once and returns a fixed property.
//!
//! A derived property is concurrent iff all of its sources are. A confined
//! derived property attaches to concurrent sources through the executor
//! installed on its own thread, so deliveries come home before they are
//! republished.
//!
//! | Combinator | Source fixed | Source live |
//! |------------|--------------|-------------|
//! | `map` / `map_on` | fixed result | mapped |
//! | `combine` | map of the other / fixed result | bi-mapped |
//! | [`combine_all`] | fixed result if all fixed | multi-mapped |
//! | `distinct` | the source itself | distinct wrapper |
//! | `debounced` | the source itself | debounced wrapper |
//!
//! # Failure Modes
//!
//! - **Last handle dropped while observed**: the property detaches from its
//!   sources and its listeners stop hearing about changes. Keep a handle
//!   (or a [`Subscription`]) for as long as notifications matter.

mod bi_mapped;
mod debounced;
mod distinct;
mod link;
mod mapped;
mod multi_mapped;

use std::sync::{Arc, OnceLock};

use fprop_exec::{Executor, Scheduler, current_executor, unconfined};
use web_time::Duration;

pub use multi_mapped::combine_all;

use crate::affinity::Confinement;
use crate::cell::ValueCell;
use crate::error::UsageError;
use crate::immutable::ImmutableProp;
use crate::notifier::Notifier;
use crate::packing::ValuePacking;
use crate::property::{AsProperty, ChangeListener, Property, Subscription};
use crate::replay;

use link::{Claim, SourceLink};

// ─── Shared derived-property plumbing ────────────────────────────────────────

/// Registry, cache and source link of one derived property.
pub(crate) struct DerivedCore<U: Send + Sync + 'static> {
    notifier: Notifier<ValuePacking<U>>,
    cache: OnceLock<ValueCell<U>>,
    link: SourceLink,
    recompute: Claim,
}

impl<U: Send + Sync + 'static> DerivedCore<U> {
    pub(crate) fn new(concurrent: bool) -> Self {
        Self {
            notifier: Notifier::new(Confinement::for_mode(concurrent)),
            cache: OnceLock::new(),
            link: SourceLink::default(),
            recompute: Claim::default(),
        }
    }

    pub(crate) fn notifier(&self) -> &Notifier<ValuePacking<U>> {
        &self.notifier
    }

    pub(crate) fn is_concurrent(&self) -> bool {
        self.notifier.is_concurrent()
    }

    /// Executor through which this property's sources should deliver.
    pub(crate) fn source_executor(&self) -> Arc<dyn Executor> {
        if self.is_concurrent() {
            unconfined()
        } else {
            current_executor().unwrap_or_else(unconfined)
        }
    }

    /// Freshest cached value, if the property is observed and primed.
    pub(crate) fn cached(&self) -> Option<Arc<U>> {
        if self.notifier.is_observed() {
            self.cache.get().map(ValueCell::load)
        } else {
            None
        }
    }

    /// Replace the cached value without notifying.
    pub(crate) fn prime(&self, value: Arc<U>) {
        match self.cache.get() {
            Some(cell) => cell.refresh(value),
            None => {
                let _ = self
                    .cache
                    .set(ValueCell::new(value, self.notifier.is_concurrent()));
            }
        }
    }

    /// Prime the cache, run `subscribe`, then fold in any source change that
    /// landed before the subscriptions took effect. Changes delivered after
    /// that always find a primed cache.
    pub(crate) fn attach_with(
        &self,
        compute: impl Fn() -> Arc<U>,
        subscribe: impl FnOnce() -> Vec<Subscription>,
    ) -> Vec<Subscription> {
        let primed = compute();
        self.prime(Arc::clone(&primed));
        let subscriptions = subscribe();
        if let Some(cell) = self.cache.get() {
            cell.refresh_if(&primed, compute());
        }
        subscriptions
    }

    /// Store `value` and notify listeners of the transition.
    pub(crate) fn publish(&self, value: Arc<U>) {
        let Some(cell) = self.cache.get() else {
            return;
        };
        let (seq, old) = cell.swap(Arc::clone(&value));
        self.notifier.notify(seq, old, value);
    }

    /// Publish `compute()` with recomputations serialized, so the value
    /// published last was computed after the last request.
    pub(crate) fn recompute(&self, compute: impl Fn() -> Arc<U>) {
        self.recompute.run(|| self.publish(compute()));
    }
}

/// Hooks a derived property gives the shared plumbing.
pub(crate) trait Derived<U: Send + Sync + 'static>: Send + Sync + 'static {
    fn core(&self) -> &DerivedCore<U>;

    /// Subscribe to every source with the cache primed.
    fn attach(&self) -> Vec<Subscription>;
}

fn sync_sources<U: Send + Sync + 'static, D: Derived<U>>(derived: &D) {
    let core = derived.core();
    core.link
        .reconcile(|| core.notifier.is_observed(), || derived.attach());
}

pub(crate) fn add_listener<U, D>(derived: &D, executor: Option<Arc<dyn Executor>>, listener: ChangeListener<U>)
where
    U: Send + Sync + 'static,
    D: Derived<U>,
{
    let notifier = derived.core().notifier();
    let became_observed = match executor {
        Some(executor) => notifier.add_on(executor, listener),
        None => notifier.add(listener),
    };
    if became_observed {
        sync_sources(derived);
    }
}

pub(crate) fn remove_listener<U, D>(derived: &D, listener: &ChangeListener<U>)
where
    U: Send + Sync + 'static,
    D: Derived<U>,
{
    if derived.core().notifier().remove(listener).emptied {
        sync_sources(derived);
    }
}

/// Subscribe `listener` to `source`, delivering on `executor`.
pub(crate) fn source_subscription<S: 'static>(
    source: &Arc<dyn Property<S>>,
    executor: Arc<dyn Executor>,
    listener: ChangeListener<S>,
) -> Subscription {
    Subscription::to_on(Arc::clone(source), executor, listener)
}

/// Implements [`Property<U>`] listener methods for a [`Derived`] type.
macro_rules! derived_listener_methods {
    ($u:ty) => {
        fn add_listener(&self, listener: $crate::property::ChangeListener<$u>) {
            $crate::combinators::add_listener(self, None, listener);
        }

        fn add_listener_on(
            &self,
            executor: std::sync::Arc<dyn fprop_exec::Executor>,
            listener: $crate::property::ChangeListener<$u>,
        ) {
            $crate::combinators::add_listener(self, Some(executor), listener);
        }

        fn remove_listener(&self, listener: &$crate::property::ChangeListener<$u>) {
            $crate::combinators::remove_listener(self, listener);
        }
    };
}
pub(crate) use derived_listener_methods;

// ─── Extension trait ─────────────────────────────────────────────────────────

/// Combinators and subscription helpers for every property handle.
pub trait PropertyExt<T: Send + Sync + 'static>: AsProperty<T> {
    /// A property holding `transform(value)`.
    fn map<U, F>(&self, transform: F) -> Arc<dyn Property<U>>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        mapped::map_on(self.as_property(), unconfined(), transform)
    }

    /// Like [`map`](Self::map), recomputing on `worker` after each change.
    ///
    /// Reads return the freshest precomputed value; results computed for
    /// superseded values are discarded. An inline worker behaves exactly
    /// like `map`.
    ///
    /// # Panics
    ///
    /// Mapping a thread-confined source on a worker panics with
    /// [`UsageError::NoHomeExecutor`] unless an executor is installed on the
    /// calling thread. See [`try_map_on`](Self::try_map_on).
    fn map_on<U, F>(&self, worker: Arc<dyn Executor>, transform: F) -> Arc<dyn Property<U>>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        match self.try_map_on(worker, transform) {
            Ok(prop) => prop,
            Err(err) => err.raise(),
        }
    }

    /// Like [`map_on`](Self::map_on), reporting a missing home executor as
    /// an error.
    fn try_map_on<U, F>(
        &self,
        worker: Arc<dyn Executor>,
        transform: F,
    ) -> Result<Arc<dyn Property<U>>, UsageError>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        mapped::try_map_on(self.as_property(), worker, transform)
    }

    /// A property holding `transform(self, that)`.
    fn combine<O, U, F>(&self, that: &impl AsProperty<O>, transform: F) -> Arc<dyn Property<U>>
    where
        O: Send + Sync + 'static,
        U: Send + Sync + 'static,
        F: Fn(&T, &O) -> U + Send + Sync + 'static,
    {
        bi_mapped::combine(self.as_property(), that.as_property(), transform)
    }

    /// A property that stays silent for transitions `equals` deems equal.
    fn distinct<F>(&self, equals: F) -> Arc<dyn Property<T>>
    where
        T: Clone,
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        distinct::distinct(self.as_property(), equals)
    }

    /// [`distinct`](Self::distinct) with `PartialEq`.
    fn distinct_eq(&self) -> Arc<dyn Property<T>>
    where
        T: Clone + PartialEq,
    {
        self.distinct(|a: &T, b: &T| a == b)
    }

    /// A property that coalesces changes arriving within `delay` of each
    /// other, using the scheduler installed on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics with [`UsageError::NoScheduler`] if no scheduler is installed
    /// on a thread-confined source's thread, or (concurrent sources) on the
    /// thread adding the first listener. See [`try_debounced`](Self::try_debounced).
    fn debounced(&self, delay: Duration) -> Arc<dyn Property<T>>
    where
        T: Clone,
    {
        match self.try_debounced(delay) {
            Ok(prop) => prop,
            Err(err) => err.raise(),
        }
    }

    /// Like [`debounced`](Self::debounced), reporting a missing scheduler
    /// for thread-confined sources as an error.
    fn try_debounced(&self, delay: Duration) -> Result<Arc<dyn Property<T>>, UsageError>
    where
        T: Clone,
    {
        debounced::debounced(self.as_property(), None, delay)
    }

    /// Like [`debounced`](Self::debounced), on an explicit scheduler.
    fn debounced_on(&self, scheduler: Arc<dyn Scheduler>, delay: Duration) -> Arc<dyn Property<T>>
    where
        T: Clone,
    {
        match debounced::debounced(self.as_property(), Some(scheduler), delay) {
            Ok(prop) => prop,
            Err(err) => err.raise(),
        }
    }

    /// A handle exposing only the read-only surface.
    fn read_only_view(&self) -> Arc<dyn Property<T>>
    where
        T: Clone,
    {
        self.map(T::clone)
    }

    /// Register `listener` until the returned guard drops.
    fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        Subscription::to(self.as_property(), listener)
    }

    /// Like [`subscribe`](Self::subscribe), delivering on `executor`.
    fn subscribe_on(&self, executor: Arc<dyn Executor>, listener: ChangeListener<T>) -> Subscription {
        Subscription::to_on(self.as_property(), executor, listener)
    }

    /// Call `func` with the current value now and with every later value.
    /// Returns the installed listener.
    fn on_each<F>(&self, func: F) -> ChangeListener<T>
    where
        T: Clone,
        F: Fn(&T) + Send + Sync + 'static,
    {
        replay::on_each(&*self.as_property(), func)
    }
}

impl<T: Send + Sync + 'static, A: AsProperty<T> + ?Sized> PropertyExt<T> for A {}

/// A fixed property handle.
pub(crate) fn fixed<U: Send + Sync + 'static>(value: U) -> Arc<dyn Property<U>> {
    Arc::new(ImmutableProp::new(value))
}
