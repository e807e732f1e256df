#![forbid(unsafe_code)]

use std::sync::{Arc, Weak};

use super::{Derived, DerivedCore, derived_listener_methods, fixed, source_subscription};
use crate::property::{Property, Subscription, listener};

type Transform<T, U> = Box<dyn Fn(&[&T]) -> U + Send + Sync>;

/// `transform([s0, s1, ..])` over an ordered list of sources.
struct MultiMappedProp<T, U: Send + Sync + 'static> {
    sources: Vec<Arc<dyn Property<T>>>,
    transform: Transform<T, U>,
    core: DerivedCore<U>,
    this: Weak<Self>,
}

/// A property holding `transform` of the current values of `sources`, in
/// order.
///
/// The result is concurrent iff every source is, and fixed iff every source
/// is fixed.
pub fn combine_all<T, U, F>(sources: Vec<Arc<dyn Property<T>>>, transform: F) -> Arc<dyn Property<U>>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(&[&T]) -> U + Send + Sync + 'static,
{
    if sources.iter().all(|s| !s.may_change()) {
        return fixed(apply(&sources, &transform));
    }
    let concurrent = sources.iter().all(|s| s.is_concurrent());
    Arc::new_cyclic(|this| MultiMappedProp {
        sources,
        transform: Box::new(transform),
        core: DerivedCore::new(concurrent),
        this: this.clone(),
    })
}

fn apply<T, U>(sources: &[Arc<dyn Property<T>>], transform: &dyn Fn(&[&T]) -> U) -> U {
    let held: Vec<Arc<T>> = sources.iter().map(|s| s.value()).collect();
    let refs: Vec<&T> = held.iter().map(|v| &**v).collect();
    transform(&refs)
}

impl<T, U> Derived<U> for MultiMappedProp<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn core(&self) -> &DerivedCore<U> {
        &self.core
    }

    fn attach(&self) -> Vec<Subscription> {
        let executor = self.core.source_executor();
        self.core.attach_with(
            || Arc::new(apply(&self.sources, &*self.transform)),
            || {
                self.sources
                    .iter()
                    .filter(|source| source.may_change())
                    .map(|source| {
                        let weak = self.this.clone();
                        let on_change = listener(move |_old: &T, _new: &T| {
                            if let Some(this) = weak.upgrade() {
                                this.core
                                    .recompute(|| Arc::new(apply(&this.sources, &*this.transform)));
                            }
                        });
                        source_subscription(source, Arc::clone(&executor), on_change)
                    })
                    .collect()
            },
        )
    }
}

impl<T, U> Property<U> for MultiMappedProp<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    #[track_caller]
    fn value(&self) -> Arc<U> {
        self.core.notifier().confinement().assert();
        self.core
            .cached()
            .unwrap_or_else(|| Arc::new(apply(&self.sources, &*self.transform)))
    }

    fn may_change(&self) -> bool {
        true
    }

    fn is_concurrent(&self) -> bool {
        self.core.is_concurrent()
    }

    derived_listener_methods!(U);
}
