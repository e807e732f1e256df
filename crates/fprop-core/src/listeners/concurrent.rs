#![forbid(unsafe_code)]

use arc_swap::ArcSwap;
use smallvec::SmallVec;

use super::{Change, Removal, SlotList, deliver_all, without};
use crate::cell::transition;
use crate::dispatch::Slot;
use crate::packing::Packing;

/// Changes waiting for delivery plus the delivery-role flag.
struct Outbox<P: Packing> {
    /// Sequence number of the next change to release.
    next_seq: u64,
    /// Sorted by `seq`.
    pending: SmallVec<[Change<P>; 2]>,
    /// Some thread currently holds the delivery role.
    draining: bool,
}

impl<P: Packing> Clone for Outbox<P> {
    fn clone(&self) -> Self {
        Self {
            next_seq: self.next_seq,
            pending: self.pending.clone(),
            draining: self.draining,
        }
    }
}

impl<P: Packing> Outbox<P> {
    fn with(&self, change: Change<P>) -> Self {
        let mut next = self.clone();
        let at = next.pending.partition_point(|c| c.seq < change.seq);
        next.pending.insert(at, change);
        next
    }

    /// Pop the next in-order change if it has arrived.
    fn take_next(&mut self) -> Option<Change<P>> {
        if self.pending.first().is_some_and(|c| c.seq == self.next_seq) {
            self.next_seq += 1;
            Some(self.pending.remove(0))
        } else {
            None
        }
    }
}

/// Lock-free listener set shared by any number of threads.
///
/// # Design
///
/// Registration replaces the whole slot list by compare-and-swap, so a
/// delivery pass always walks one complete snapshot. Notification first
/// files the change in the outbox, then tries to claim the delivery role.
/// The claimant releases changes strictly by sequence number, each against
/// the snapshot current at that instant, and gives the role up in the same
/// compare-and-swap that finds nothing more to release. A change filed
/// while another thread holds the role is therefore never stranded, and a
/// change that arrives ahead of its predecessor waits for it.
///
/// # Failure Modes
///
/// - **Listener panics**: the role is released during unwinding; changes
///   still in the outbox are released by the next notifier.
pub struct ConcurrentListeners<P: Packing> {
    slots: ArcSwap<SlotList<P>>,
    outbox: ArcSwap<Outbox<P>>,
}

impl<P: Packing> Default for ConcurrentListeners<P> {
    fn default() -> Self {
        Self {
            slots: ArcSwap::from_pointee(SlotList::new()),
            outbox: ArcSwap::from_pointee(Outbox {
                next_seq: 1,
                pending: SmallVec::new(),
                draining: false,
            }),
        }
    }
}

/// Gives the delivery role back if a listener unwinds mid-pass.
struct RoleGuard<'a, P: Packing> {
    outbox: &'a ArcSwap<Outbox<P>>,
    armed: bool,
}

impl<P: Packing> Drop for RoleGuard<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            transition(self.outbox, |ob| {
                let mut next = ob.clone();
                next.draining = false;
                Some((next, ()))
            });
        }
    }
}

impl<P: Packing> ConcurrentListeners<P> {
    /// Append a slot. Returns whether the set was empty before.
    pub fn add(&self, slot: Slot<P>) -> bool {
        transition(&self.slots, |slots| {
            let mut next = slots.clone();
            next.push(slot.clone());
            Some((next, slots.is_empty()))
        })
        .unwrap_or(false)
    }

    pub fn remove(&self, listener: &P::Listener) -> Removal {
        let outcome = transition(&self.slots, |slots| {
            let (next, removed) = without(slots, listener)?;
            let emptied = next.is_empty();
            Some((next, (removed, emptied)))
        });
        match outcome {
            Some((removed, emptied)) => {
                removed.cancel();
                Removal {
                    removed: true,
                    emptied,
                }
            }
            None => Removal::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.load().is_empty()
    }

    /// File `change` and deliver everything releasable, unless another
    /// thread already holds the delivery role.
    pub fn notify(&self, change: Change<P>) {
        transition(&self.outbox, |ob| Some((ob.with(change.clone()), ())));

        let mut next = transition(&self.outbox, |ob| {
            if ob.draining {
                return None;
            }
            let mut claimed = ob.clone();
            let change = claimed.take_next()?;
            claimed.draining = true;
            Some((claimed, change))
        });
        if next.is_none() {
            return;
        }

        let mut guard = RoleGuard {
            outbox: &self.outbox,
            armed: true,
        };
        while let Some(change) = next {
            let slots = self.slots.load_full();
            deliver_all(&slots, &change);
            next = transition(&self.outbox, |ob| {
                let mut after = ob.clone();
                let change = after.take_next();
                if change.is_none() {
                    after.draining = false;
                }
                Some((after, change))
            })
            .flatten();
        }
        guard.armed = false;
    }
}
