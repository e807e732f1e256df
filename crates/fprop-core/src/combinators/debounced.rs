#![forbid(unsafe_code)]

//! Change coalescing.
//!
//! # Design
//!
//! Each source change opens or extends a *window*: the value before the
//! first change of the window, the latest value, and an epoch. Every change
//! reschedules the flush task and cancels the previous one; a flush only
//! acts if its epoch still owns the window, and removes the window by
//! compare-and-swap before notifying `(first old, latest)`.
//!
//! Reads go straight to the source, so `value()` may run ahead of the last
//! notification by up to one window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwapOption;
use fprop_exec::{ScheduledTask, Scheduler, current_scheduler};
use web_time::Duration;

use super::{Derived, DerivedCore, source_subscription};
use crate::error::UsageError;
use crate::property::{ChangeListener, Property, Subscription, listener};

struct Window<T> {
    first_old: Arc<T>,
    latest: Arc<T>,
    epoch: u64,
}

struct DebouncedProp<T: Send + Sync + 'static> {
    source: Arc<dyn Property<T>>,
    delay: Duration,
    scheduler: OnceLock<Arc<dyn Scheduler>>,
    window: ArcSwapOption<Window<T>>,
    timer: ArcSwapOption<ScheduledTask>,
    epoch: AtomicU64,
    seq: AtomicU64,
    core: DerivedCore<T>,
    this: Weak<Self>,
}

fn same_window<T>(a: &Option<Arc<Window<T>>>, b: &Option<Arc<Window<T>>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Build a debounced wrapper. `scheduler` overrides the calling thread's.
pub(super) fn debounced<T>(
    source: Arc<dyn Property<T>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    delay: Duration,
) -> Result<Arc<dyn Property<T>>, UsageError>
where
    T: Clone + Send + Sync + 'static,
{
    if !source.may_change() {
        return Ok(source);
    }
    let concurrent = source.is_concurrent();
    let resolved = OnceLock::new();
    match scheduler.or_else(current_scheduler) {
        Some(scheduler) => {
            let _ = resolved.set(scheduler);
        }
        None if !concurrent => return Err(UsageError::NoScheduler),
        None => {}
    }
    let core = DerivedCore::new(concurrent);
    Ok(Arc::new_cyclic(|this| DebouncedProp {
        source,
        delay,
        scheduler: resolved,
        window: ArcSwapOption::empty(),
        timer: ArcSwapOption::empty(),
        epoch: AtomicU64::new(0),
        seq: AtomicU64::new(0),
        core,
        this: this.clone(),
    }))
}

impl<T> DebouncedProp<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Resolve the scheduler lazily for concurrent sources.
    #[track_caller]
    fn ensure_scheduler(&self) {
        if self.scheduler.get().is_some() {
            return;
        }
        match current_scheduler() {
            Some(scheduler) => {
                let _ = self.scheduler.set(scheduler);
            }
            None => UsageError::NoScheduler.raise(),
        }
    }

    fn on_source_change(&self, old: &T, new: &T) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = Arc::new(new.clone());
        let _ = self.window.rcu(|current| {
            let first_old = match current {
                Some(window) => Arc::clone(&window.first_old),
                None => Arc::new(old.clone()),
            };
            Some(Arc::new(Window {
                first_old,
                latest: Arc::clone(&latest),
                epoch,
            }))
        });

        let (Some(scheduler), Some(this)) = (self.scheduler.get(), self.this.upgrade()) else {
            return;
        };
        let handle = scheduler.schedule(self.delay, Box::new(move || this.flush(epoch)));
        if let Some(previous) = self.timer.swap(Some(Arc::new(handle))) {
            previous.cancel();
            tracing::debug!(epoch, "debounce window extended");
        }
    }

    fn flush(&self, epoch: u64) {
        let current = self.window.load_full();
        let Some(window) = current.as_ref().filter(|w| w.epoch == epoch) else {
            return;
        };
        let previous = self.window.compare_and_swap(&current, None::<Arc<Window<T>>>);
        if !same_window(&previous, &current) {
            return;
        }
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.core.notifier().notify(
            seq,
            Arc::clone(&window.first_old),
            Arc::clone(&window.latest),
        );
    }

    fn reset(&self) {
        if let Some(timer) = self.timer.swap(None) {
            timer.cancel();
        }
        self.window.store(None);
    }
}

impl<T> Derived<T> for DebouncedProp<T>
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
        let weak = self.this.clone();
        let pending = Subscription::new(move || {
            if let Some(this) = weak.upgrade() {
                this.reset();
            }
        });
        vec![
            source_subscription(&self.source, self.core.source_executor(), on_change),
            pending,
        ]
    }
}

impl<T> Property<T> for DebouncedProp<T>
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

    #[track_caller]
    fn add_listener(&self, listener: ChangeListener<T>) {
        self.ensure_scheduler();
        super::add_listener(self, None, listener);
    }

    #[track_caller]
    fn add_listener_on(&self, executor: Arc<dyn fprop_exec::Executor>, listener: ChangeListener<T>) {
        self.ensure_scheduler();
        super::add_listener(self, Some(executor), listener);
    }

    fn remove_listener(&self, listener: &ChangeListener<T>) {
        super::remove_listener(self, listener);
    }
}

#[cfg(test)]
mod tests {
    use crate::combinators::PropertyExt;
    use crate::error::UsageError;
    use crate::immutable::immutable_property_of;
    use crate::mutable::{concurrent_mutable_property_of, unsynchronized_mutable_property_of};
    use crate::property::{AsProperty, ChangeListener, listener};
    use fprop_exec::{ManualExecutor, enter};
    use std::sync::{Arc, Mutex};
    use web_time::Duration;

    fn recorder() -> (ChangeListener<i32>, Arc<Mutex<Vec<(i32, i32)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let l = listener(move |o: &i32, n: &i32| sink.lock().unwrap().push((*o, *n)));
        (l, log)
    }

    #[test]
    fn burst_is_coalesced_into_one_notification() {
        let clock = ManualExecutor::new();
        let _guard = enter(clock.context());
        let source = unsynchronized_mutable_property_of(0);
        let debounced = source.debounced(Duration::from_millis(100));
        let (l, log) = recorder();
        debounced.add_listener(l);

        source.set(1);
        clock.advance(Duration::from_millis(50));
        source.set(2);
        clock.advance(Duration::from_millis(50));
        source.set(3);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(*debounced.value(), 3);

        clock.advance(Duration::from_millis(100));
        assert_eq!(*log.lock().unwrap(), vec![(0, 3)]);

        source.set(4);
        clock.advance(Duration::from_millis(100));
        assert_eq!(*log.lock().unwrap(), vec![(0, 3), (3, 4)]);
    }

    #[test]
    fn explicit_scheduler_works_for_concurrent_sources() {
        let clock = ManualExecutor::new();
        let source = concurrent_mutable_property_of(1);
        let debounced = source.debounced_on(clock.as_scheduler(), Duration::from_millis(10));
        let (l, log) = recorder();
        debounced.add_listener(l);
        source.set(2);
        source.set(3);
        clock.advance(Duration::from_millis(10));
        assert_eq!(*log.lock().unwrap(), vec![(1, 3)]);
    }

    #[test]
    fn confined_without_scheduler_is_an_error() {
        let source = unsynchronized_mutable_property_of(0);
        let err = source.try_debounced(Duration::from_millis(5)).err();
        assert_eq!(err, Some(UsageError::NoScheduler));
    }

    #[test]
    fn concurrent_without_scheduler_fails_on_subscription() {
        let source = concurrent_mutable_property_of(0);
        let debounced = source.debounced(Duration::from_millis(5));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            debounced.add_listener(listener(|_, _| {}));
        }));
        assert!(result.is_err());
        assert!(!source.is_observed());

        let clock = ManualExecutor::new();
        let _guard = enter(clock.context());
        let (l, log) = recorder();
        debounced.add_listener(l);
        assert!(source.is_observed());
        source.set(1);
        clock.advance(Duration::from_millis(5));
        assert_eq!(*log.lock().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn fixed_source_is_returned_as_is() {
        let source = immutable_property_of(1).as_property();
        let debounced = source.debounced(Duration::from_millis(5));
        assert!(Arc::ptr_eq(&source, &debounced));
    }

    #[test]
    fn unsubscribing_cancels_pending_window() {
        let clock = ManualExecutor::new();
        let source = concurrent_mutable_property_of(0);
        let debounced = source.debounced_on(clock.as_scheduler(), Duration::from_millis(10));
        let (l, log) = recorder();
        debounced.add_listener(Arc::clone(&l));
        source.set(1);
        debounced.remove_listener(&l);
        assert!(!source.is_observed());
        assert_eq!(clock.advance(Duration::from_millis(20)), 0);
        assert!(log.lock().unwrap().is_empty());
    }
}
