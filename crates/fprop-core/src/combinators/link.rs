#![forbid(unsafe_code)]

//! Serialized background work for derived properties.
//!
//! # Design
//!
//! Derived properties hear about observation changes and source changes
//! from whichever thread caused them, so two threads may race to attach,
//! detach or recompute. A [`Claim`] serializes that work without blocking:
//! a caller files a request and tries to take the claim; the claimant keeps
//! running the work until no new request arrived during its run, and a
//! caller that loses the race just returns, leaving its request to the
//! claimant. The last run therefore always starts after the last request.
//!
//! [`SourceLink`] uses a claim to keep source subscriptions in line with the
//! observation state; recomputation of multi-source properties uses one to
//! make sure the last published value reflects the last source change.
//!
//! # Invariants
//!
//! 1. At most one thread runs the work of one claim at a time.
//! 2. Every request is followed by at least one run that starts after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::property::Subscription;

/// A non-blocking "someone is on it" flag with request coalescing.
#[derive(Debug, Default)]
pub(crate) struct Claim {
    busy: AtomicBool,
    requested: AtomicBool,
}

/// Releases the claim if the work unwinds.
struct Release<'a>(&'a AtomicBool);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Claim {
    /// Request a run of `work`, performing it here if nobody else is.
    pub(crate) fn run(&self, mut work: impl FnMut()) {
        self.requested.store(true, Ordering::Release);
        loop {
            if self
                .busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            {
                let _release = Release(&self.busy);
                while self.requested.swap(false, Ordering::AcqRel) {
                    work();
                }
            }
            if !self.requested.load(Ordering::Acquire) {
                return;
            }
        }
    }
}

/// Source subscriptions of one derived property.
#[derive(Default)]
pub(crate) struct SourceLink {
    claim: Claim,
    /// Only touched by the thread holding `claim`.
    attached: Mutex<Vec<Subscription>>,
}

impl SourceLink {
    #[cfg(test)]
    pub(crate) fn is_attached(&self) -> bool {
        !self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Attach or detach so that attachment matches `observed()`.
    pub(crate) fn reconcile(
        &self,
        observed: impl Fn() -> bool,
        attach: impl Fn() -> Vec<Subscription>,
    ) {
        self.claim.run(|| self.step(observed(), &attach));
    }

    fn step(&self, want: bool, attach: &impl Fn() -> Vec<Subscription>) {
        let mut attached = self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if want && attached.is_empty() {
            *attached = attach();
            tracing::debug!(sources = attached.len(), "derived property attached");
        } else if !want && !attached.is_empty() {
            let released = std::mem::take(&mut *attached);
            drop(attached);
            tracing::debug!(sources = released.len(), "derived property detached");
            drop(released);
        }
    }
}
