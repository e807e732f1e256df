#![forbid(unsafe_code)]

use std::sync::{Arc, Weak};

use fprop_exec::unconfined;

use super::{Derived, DerivedCore, derived_listener_methods, fixed, mapped, source_subscription};
use crate::property::{Property, Subscription, listener};

type Transform<A, B, U> = Box<dyn Fn(&A, &B) -> U + Send + Sync>;

/// `transform(a, b)` over two live sources.
struct BiMappedProp<A, B, U: Send + Sync + 'static> {
    a: Arc<dyn Property<A>>,
    b: Arc<dyn Property<B>>,
    transform: Transform<A, B, U>,
    core: DerivedCore<U>,
    this: Weak<Self>,
}

pub(super) fn combine<A, B, U, F>(
    a: Arc<dyn Property<A>>,
    b: Arc<dyn Property<B>>,
    transform: F,
) -> Arc<dyn Property<U>>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(&A, &B) -> U + Send + Sync + 'static,
{
    match (a.may_change(), b.may_change()) {
        (true, true) => {
            let core = DerivedCore::new(a.is_concurrent() && b.is_concurrent());
            Arc::new_cyclic(|this| BiMappedProp {
                a,
                b,
                transform: Box::new(transform),
                core,
                this: this.clone(),
            })
        }
        (false, true) => {
            let fixed_a = a.value();
            mapped::map_on(b, unconfined(), move |b: &B| transform(&fixed_a, b))
        }
        (true, false) => {
            let fixed_b = b.value();
            mapped::map_on(a, unconfined(), move |a: &A| transform(a, &fixed_b))
        }
        (false, false) => fixed(transform(&a.value(), &b.value())),
    }
}

impl<A, B, U> BiMappedProp<A, B, U>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn compute(&self) -> Arc<U> {
        Arc::new((self.transform)(&self.a.value(), &self.b.value()))
    }
}

impl<A, B, U> Derived<U> for BiMappedProp<A, B, U>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn core(&self) -> &DerivedCore<U> {
        &self.core
    }

    fn attach(&self) -> Vec<Subscription> {
        let executor = self.core.source_executor();

        let weak = self.this.clone();
        let on_a = listener(move |_old: &A, _new: &A| {
            if let Some(this) = weak.upgrade() {
                this.core.recompute(|| this.compute());
            }
        });
        let weak = self.this.clone();
        let on_b = listener(move |_old: &B, _new: &B| {
            if let Some(this) = weak.upgrade() {
                this.core.recompute(|| this.compute());
            }
        });

        self.core.attach_with(
            || self.compute(),
            || {
                vec![
                    source_subscription(&self.a, Arc::clone(&executor), on_a),
                    source_subscription(&self.b, executor, on_b),
                ]
            },
        )
    }
}

impl<A, B, U> Property<U> for BiMappedProp<A, B, U>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
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
