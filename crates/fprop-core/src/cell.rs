#![forbid(unsafe_code)]

//! The value holder behind every live property.
//!
//! # Design
//!
//! Concurrent cells keep an immutable `(seq, value)` stamp behind an
//! [`ArcSwap`] and replace it wholesale by compare-and-swap. Confined cells
//! keep the same stamp behind an uncontended mutex; only the owning thread
//! ever reaches it.
//!
//! # Invariants
//!
//! 1. Every successful mutation bumps `seq` by exactly one, so the sequence
//!    numbers of one cell are a gapless record of its linearized history.
//! 2. [`ValueCell::refresh`] and [`ValueCell::refresh_if`] replace the value
//!    *without* bumping `seq`; they are reserved for caches whose listeners
//!    have not seen the replaced value.
//! 3. A failed [`ValueCell::compare_and_set`] leaves the cell untouched.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::{ArcSwap, Guard};

/// A value stamped with the mutation that produced it.
#[derive(Debug)]
pub(crate) struct Stamped<T> {
    seq: u64,
    value: Arc<T>,
}

impl<T> Clone for Stamped<T> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            value: Arc::clone(&self.value),
        }
    }
}

/// Sequence-stamped value storage in either concurrency mode.
pub(crate) enum ValueCell<T> {
    Confined(Mutex<Stamped<T>>),
    Concurrent(ArcSwap<Stamped<T>>),
}

impl<T> std::fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            Self::Confined(_) => "confined",
            Self::Concurrent(_) => "concurrent",
        };
        f.debug_struct("ValueCell")
            .field("mode", &mode)
            .field("seq", &self.seq())
            .finish_non_exhaustive()
    }
}

/// Lock a confined cell; poisoning is ignored because stamps are replaced
/// atomically with respect to panics.
fn lock<T>(m: &Mutex<Stamped<T>>) -> MutexGuard<'_, Stamped<T>> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Compare-and-swap loop over an [`ArcSwap`].
///
/// `step` maps the current state to `Some((next, out))` or `None` to leave
/// the state alone. It is re-run against the fresh state after every lost
/// race, so it must be free of side effects.
pub(crate) fn transition<S, R>(
    cell: &ArcSwap<S>,
    mut step: impl FnMut(&S) -> Option<(S, R)>,
) -> Option<R> {
    let mut current = cell.load_full();
    loop {
        let (next, out) = step(current.as_ref())?;
        let previous = cell.compare_and_swap(&current, Arc::new(next));
        if Arc::ptr_eq(&*previous, &current) {
            return Some(out);
        }
        current = Guard::into_inner(previous);
    }
}

impl<T> ValueCell<T> {
    /// A cell holding `value` at sequence zero.
    pub fn new(value: Arc<T>, concurrent: bool) -> Self {
        let stamp = Stamped { seq: 0, value };
        if concurrent {
            Self::Concurrent(ArcSwap::from_pointee(stamp))
        } else {
            Self::Confined(Mutex::new(stamp))
        }
    }

    /// The current value.
    pub fn load(&self) -> Arc<T> {
        match self {
            Self::Confined(m) => Arc::clone(&lock(m).value),
            Self::Concurrent(s) => Arc::clone(&s.load().value),
        }
    }

    /// Sequence number of the last mutation (zero if never mutated).
    pub fn seq(&self) -> u64 {
        match self {
            Self::Confined(m) => lock(m).seq,
            Self::Concurrent(s) => s.load().seq,
        }
    }

    /// Replace the value unconditionally. Returns the mutation's sequence
    /// number and the previous value.
    pub fn swap(&self, value: Arc<T>) -> (u64, Arc<T>) {
        match self {
            Self::Confined(m) => {
                let mut stamp = lock(m);
                stamp.seq += 1;
                let old = std::mem::replace(&mut stamp.value, value);
                (stamp.seq, old)
            }
            Self::Concurrent(s) => {
                let previous = s.rcu(|cur| Stamped {
                    seq: cur.seq + 1,
                    value: Arc::clone(&value),
                });
                (previous.seq + 1, Arc::clone(&previous.value))
            }
        }
    }

    /// Replace the value without recording a mutation.
    pub fn refresh(&self, value: Arc<T>) {
        match self {
            Self::Confined(m) => lock(m).value = value,
            Self::Concurrent(s) => {
                s.rcu(|cur| Stamped {
                    seq: cur.seq,
                    value: Arc::clone(&value),
                });
            }
        }
    }

    /// [`refresh`](Self::refresh) iff the cell still holds `current` (by
    /// identity). Returns whether the value was replaced.
    pub fn refresh_if(&self, current: &Arc<T>, value: Arc<T>) -> bool {
        match self {
            Self::Confined(m) => {
                let mut stamp = lock(m);
                if !Arc::ptr_eq(&stamp.value, current) {
                    return false;
                }
                stamp.value = value;
                true
            }
            Self::Concurrent(s) => transition(s, |cur| {
                Arc::ptr_eq(&cur.value, current).then(|| {
                    let next = Stamped {
                        seq: cur.seq,
                        value: Arc::clone(&value),
                    };
                    (next, ())
                })
            })
            .is_some(),
        }
    }
}

impl<T: PartialEq> ValueCell<T> {
    /// Replace the value with `value` iff it currently equals `expected`.
    ///
    /// On success returns the mutation's sequence number and the replaced
    /// value.
    pub fn compare_and_set(&self, expected: &T, value: Arc<T>) -> Option<(u64, Arc<T>)> {
        match self {
            Self::Confined(m) => {
                let mut stamp = lock(m);
                if *stamp.value != *expected {
                    return None;
                }
                stamp.seq += 1;
                let old = std::mem::replace(&mut stamp.value, value);
                Some((stamp.seq, old))
            }
            Self::Concurrent(s) => transition(s, |cur| {
                if *cur.value != *expected {
                    return None;
                }
                let next = Stamped {
                    seq: cur.seq + 1,
                    value: Arc::clone(&value),
                };
                Some((next, (cur.seq + 1, Arc::clone(&cur.value))))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn swap_bumps_sequence_in_both_modes() {
        for concurrent in [false, true] {
            let cell = ValueCell::new(Arc::new(1), concurrent);
            assert_eq!(cell.seq(), 0);
            let (seq, old) = cell.swap(Arc::new(2));
            assert_eq!((seq, *old), (1, 1));
            let (seq, old) = cell.swap(Arc::new(2));
            assert_eq!((seq, *old), (2, 2));
            assert_eq!(*cell.load(), 2);
        }
    }

    #[test]
    fn compare_and_set_checks_equality() {
        for concurrent in [false, true] {
            let cell = ValueCell::new(Arc::new(String::from("a")), concurrent);
            assert!(cell.compare_and_set(&"b".to_string(), Arc::new("c".into())).is_none());
            assert_eq!(cell.seq(), 0);
            let (seq, old) = cell
                .compare_and_set(&"a".to_string(), Arc::new("c".into()))
                .unwrap();
            assert_eq!(seq, 1);
            assert_eq!(*old, "a");
            assert_eq!(*cell.load(), "c");
        }
    }

    #[test]
    fn refresh_keeps_sequence() {
        for concurrent in [false, true] {
            let cell = ValueCell::new(Arc::new(1), concurrent);
            cell.swap(Arc::new(2));
            cell.refresh(Arc::new(9));
            assert_eq!(cell.seq(), 1);
            assert_eq!(*cell.load(), 9);
        }
    }

    #[test]
    fn refresh_if_requires_identity() {
        for concurrent in [false, true] {
            let first = Arc::new(1);
            let cell = ValueCell::new(Arc::clone(&first), concurrent);
            assert!(!cell.refresh_if(&Arc::new(1), Arc::new(5)));
            assert_eq!(*cell.load(), 1);
            assert!(cell.refresh_if(&first, Arc::new(5)));
            assert_eq!(*cell.load(), 5);
            assert_eq!(cell.seq(), 0);
        }
    }

    #[test]
    fn concurrent_swaps_produce_gapless_sequences() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;
        let cell = Arc::new(ValueCell::new(Arc::new(0usize), true));
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..PER_THREAD)
                        .map(|i| cell.swap(Arc::new(t * PER_THREAD + i)).0)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        let expected: Vec<u64> = (1..=(THREADS * PER_THREAD) as u64).collect();
        assert_eq!(seqs, expected);
    }
}
