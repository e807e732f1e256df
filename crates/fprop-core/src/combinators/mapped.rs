#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fprop_exec::{Executor, current_executor};

use super::{Derived, DerivedCore, derived_listener_methods, fixed, source_subscription};
use crate::error::UsageError;
use crate::property::{Property, Subscription, listener};

type Transform<S, U> = Arc<dyn Fn(&S) -> U + Send + Sync>;

/// `transform(source)`, optionally recomputed on a worker.
struct MappedProp<S, U: Send + Sync + 'static> {
    source: Arc<dyn Property<S>>,
    transform: Transform<S, U>,
    worker: Arc<dyn Executor>,
    /// Executor of the confinement thread, when results computed on a
    /// worker must be routed back.
    home: Option<Arc<dyn Executor>>,
    /// Bumped per source change; a worker result is published only if no
    /// newer change arrived meanwhile.
    generation: AtomicU64,
    core: DerivedCore<U>,
    this: Weak<Self>,
}

pub(super) fn map_on<S, U, F>(
    source: Arc<dyn Property<S>>,
    worker: Arc<dyn Executor>,
    transform: F,
) -> Arc<dyn Property<U>>
where
    S: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(&S) -> U + Send + Sync + 'static,
{
    match try_map_on(source, worker, transform) {
        Ok(prop) => prop,
        Err(err) => err.raise(),
    }
}

/// Build a mapped property. A confined source mapped on a real worker
/// needs an executor installed on the calling thread to route results home.
pub(super) fn try_map_on<S, U, F>(
    source: Arc<dyn Property<S>>,
    worker: Arc<dyn Executor>,
    transform: F,
) -> Result<Arc<dyn Property<U>>, UsageError>
where
    S: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(&S) -> U + Send + Sync + 'static,
{
    if !source.may_change() {
        return Ok(fixed(transform(&source.value())));
    }
    let home = if !source.is_concurrent() && !worker.is_inline() {
        Some(current_executor().ok_or(UsageError::NoHomeExecutor)?)
    } else {
        None
    };
    let core = DerivedCore::new(source.is_concurrent());
    Ok(Arc::new_cyclic(|this| MappedProp {
        source,
        transform: Arc::new(transform),
        worker,
        home,
        generation: AtomicU64::new(0),
        core,
        this: this.clone(),
    }))
}

impl<S, U> MappedProp<S, U>
where
    S: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn compute(&self) -> Arc<U> {
        Arc::new((self.transform)(&self.source.value()))
    }

    fn on_source_change(&self, new: &S) {
        if self.worker.is_inline() {
            self.core.publish(Arc::new((self.transform)(new)));
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let value = self.source.value();
        self.worker.execute(Box::new(move || {
            if this.generation.load(Ordering::Acquire) != generation {
                return;
            }
            let result = Arc::new((this.transform)(&value));
            match &this.home {
                Some(home) => {
                    let target = Arc::clone(&this);
                    home.execute(Box::new(move || target.finish(generation, result)));
                }
                None => this.finish(generation, result),
            }
        }));
    }

    fn finish(&self, generation: u64, result: Arc<U>) {
        if self.generation.load(Ordering::Acquire) == generation {
            self.core.publish(result);
        } else {
            tracing::debug!(generation, "discarding superseded mapped value");
        }
    }
}

impl<S, U> Derived<U> for MappedProp<S, U>
where
    S: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn core(&self) -> &DerivedCore<U> {
        &self.core
    }

    fn attach(&self) -> Vec<Subscription> {
        let weak = self.this.clone();
        let on_change = listener(move |_old: &S, new: &S| {
            if let Some(this) = weak.upgrade() {
                this.on_source_change(new);
            }
        });
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.core.attach_with(
            || self.compute(),
            || vec![source_subscription(&self.source, self.core.source_executor(), on_change)],
        )
    }
}

impl<S, U> Property<U> for MappedProp<S, U>
where
    S: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    #[track_caller]
    fn value(&self) -> Arc<U> {
        self.core.notifier().confinement().assert();
        self.core.cached().unwrap_or_else(|| self.compute())
    }

    fn may_change(&self) -> bool {
        true
    }

    fn is_concurrent(&self) -> bool {
        self.core.is_concurrent()
    }

    derived_listener_methods!(U);
}
