#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Change, Removal, SlotList, deliver_all};
use crate::dispatch::Slot;
use crate::packing::Packing;

struct State<P: Packing> {
    slots: SlotList<P>,
    queue: VecDeque<Change<P>>,
    delivering: bool,
}

/// Listener set owned by a single thread.
///
/// The mutex is never contended: the owning property asserts thread
/// affinity before reaching it. It is held only while the set is edited or
/// a pass is started, never while a listener runs.
pub struct ConfinedListeners<P: Packing> {
    state: Mutex<State<P>>,
}

impl<P: Packing> Default for ConfinedListeners<P> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                slots: SlotList::new(),
                queue: VecDeque::new(),
                delivering: false,
            }),
        }
    }
}

/// Clears the `delivering` flag even if a listener unwinds.
struct PassGuard<'a, P: Packing> {
    owner: &'a ConfinedListeners<P>,
}

impl<P: Packing> Drop for PassGuard<'_, P> {
    fn drop(&mut self) {
        self.owner.lock().delivering = false;
    }
}

impl<P: Packing> ConfinedListeners<P> {
    fn lock(&self) -> MutexGuard<'_, State<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a slot. Returns whether the set was empty before.
    pub fn add(&self, slot: Slot<P>) -> bool {
        let mut state = self.lock();
        let was_empty = state.slots.is_empty();
        state.slots.push(slot);
        was_empty
    }

    pub fn remove(&self, listener: &P::Listener) -> Removal {
        let mut state = self.lock();
        let Some(index) = state.slots.iter().position(|s| s.matches(listener)) else {
            return Removal::default();
        };
        let slot = state.slots.remove(index);
        slot.cancel();
        Removal {
            removed: true,
            emptied: state.slots.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Deliver `change` now, or after the running pass if called from a
    /// listener.
    pub fn notify(&self, change: Change<P>) {
        {
            let mut state = self.lock();
            state.queue.push_back(change);
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        let _guard = PassGuard { owner: self };
        loop {
            let (change, slots) = {
                let mut state = self.lock();
                match state.queue.pop_front() {
                    Some(change) => (change, state.slots.clone()),
                    None => return,
                }
            };
            deliver_all(&slots, &change);
        }
    }
}
