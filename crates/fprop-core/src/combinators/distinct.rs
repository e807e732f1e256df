#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::{Derived, DerivedCore, derived_listener_methods, source_subscription};
use crate::property::{Property, Subscription, listener};

type Equality<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Forwards source transitions that `equals` reports as real changes.
/// Reads go straight to the source.
struct DistinctProp<T: Send + Sync + 'static> {
    source: Arc<dyn Property<T>>,
    equals: Equality<T>,
    seq: AtomicU64,
    core: DerivedCore<T>,
    this: Weak<Self>,
}

pub(super) fn distinct<T, F>(source: Arc<dyn Property<T>>, equals: F) -> Arc<dyn Property<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    if !source.may_change() {
        return source;
    }
    let core = DerivedCore::new(source.is_concurrent());
    Arc::new_cyclic(|this| DistinctProp {
        source,
        equals: Box::new(equals),
        seq: AtomicU64::new(0),
        core,
        this: this.clone(),
    })
}

impl<T> DistinctProp<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_source_change(&self, old: &T, new: &T) {
        if (self.equals)(old, new) {
            return;
        }
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.core
            .notifier()
            .notify(seq, Arc::new(old.clone()), Arc::new(new.clone()));
    }
}

impl<T> Derived<T> for DistinctProp<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn core(&self) -> &DerivedCore<T> {
        &self.core
    }

    fn attach(&self) -> Vec<Subscription> {
        let weak = self.this.clone();
        let on_change = listener(move |old: &T, new: &T| {
            if let Some(this) = weak.upgrade() {
                this.on_source_change(old, new);
            }
        });
        vec![source_subscription(
            &self.source,
            self.core.source_executor(),
            on_change,
        )]
    }
}

impl<T> Property<T> for DistinctProp<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[track_caller]
    fn value(&self) -> Arc<T> {
        self.core.notifier().confinement().assert();
        self.source.value()
    }

    fn may_change(&self) -> bool {
        true
    }

    fn is_concurrent(&self) -> bool {
        self.core.is_concurrent()
    }

    derived_listener_methods!(T);
}
