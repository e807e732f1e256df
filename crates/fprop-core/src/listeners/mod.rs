#![forbid(unsafe_code)]

//! Listener storage and delivery, one implementation per concurrency mode.
//!
//! - [`ConfinedListeners`]: registration-ordered slots behind an uncontended
//!   mutex, delivered synchronously on the owning thread. Re-entrant
//!   notifications are queued and delivered after the current pass.
//! - [`ConcurrentListeners`]: an immutable slot list replaced wholesale by
//!   compare-and-swap, plus an outbox that hands the delivery role to one
//!   thread at a time and releases changes in sequence order.

mod concurrent;
mod confined;

use std::sync::Arc;

use smallvec::SmallVec;

pub use concurrent::ConcurrentListeners;
pub use confined::ConfinedListeners;

use crate::dispatch::Slot;
use crate::packing::Packing;

/// Inline capacity for slot lists; most properties have one or two
/// listeners.
pub(crate) type SlotList<P> = SmallVec<[Slot<P>; 2]>;

/// One packed value transition awaiting delivery.
pub struct Change<P: Packing> {
    pub seq: u64,
    pub old: Arc<P::Value>,
    pub new: P::Packed,
}

impl<P: Packing> Clone for Change<P> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            old: Arc::clone(&self.old),
            new: self.new.clone(),
        }
    }
}

/// Outcome of a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Removal {
    /// A matching listener was found and removed.
    pub removed: bool,
    /// The removal left the registry without listeners.
    pub emptied: bool,
}

/// Deliver `change` to every live slot of `slots`, in order.
pub(crate) fn deliver_all<P: Packing>(slots: &[Slot<P>], change: &Change<P>) {
    for slot in slots {
        if !slot.is_canceled() {
            slot.deliver(&change.old, &change.new);
        }
    }
}

/// Remove the first slot matching `listener`, canceling it.
pub(crate) fn without<P: Packing>(
    slots: &SlotList<P>,
    listener: &P::Listener,
) -> Option<(SlotList<P>, Slot<P>)> {
    let index = slots.iter().position(|slot| slot.matches(listener))?;
    let mut next = slots.clone();
    let removed = next.remove(index);
    Some((next, removed))
}
