//! Property-based invariant tests for the manual executor's virtual clock.
//!
//! For any set of delayed tasks, cancellations and clock advances:
//!
//! 1. A task runs iff it was not canceled and its deadline has passed.
//! 2. Tasks run in deadline order, ties broken by submission order.
//! 3. No task runs twice.

use std::sync::{Arc, Mutex};

use fprop_exec::{ManualExecutor, Scheduler};
use proptest::prelude::*;
use web_time::Duration;

// ── Helpers ─────────────────────────────────────────────────────────────

fn plan() -> impl Strategy<Value = (Vec<(u64, bool)>, Vec<u64>)> {
    (
        proptest::collection::vec((0u64..100, any::<bool>()), 0..40),
        proptest::collection::vec(0u64..40, 0..10),
    )
}

// ═════════════════════════════════════════════════════════════════════════
// Deadline ordering and cancellation
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn advancing_runs_due_tasks_in_deadline_order((tasks, steps) in plan()) {
        let clock = ManualExecutor::new();
        let ran = Arc::new(Mutex::new(Vec::new()));
        for (index, (delay, cancel)) in tasks.iter().enumerate() {
            let ran = Arc::clone(&ran);
            let handle = clock.schedule(
                Duration::from_millis(*delay),
                Box::new(move || ran.lock().unwrap().push(index)),
            );
            if *cancel {
                handle.cancel();
            }
        }

        let mut now = 0;
        for step in &steps {
            now += step;
            clock.advance(Duration::from_millis(*step));
        }
        clock.advance(Duration::ZERO);

        let mut expected: Vec<(u64, usize)> = tasks
            .iter()
            .enumerate()
            .filter(|(_, (delay, cancel))| !cancel && *delay <= now)
            .map(|(index, (delay, _))| (*delay, index))
            .collect();
        expected.sort();

        // Deadlines crossed by different advances run per advance, which
        // preserves the global order because advances are monotonic.
        let expected: Vec<usize> = expected.into_iter().map(|(_, index)| index).collect();
        prop_assert_eq!(&*ran.lock().unwrap(), &expected);
    }

    #[test]
    fn immediate_tasks_run_once_in_fifo_order(count in 0usize..50) {
        let clock = ManualExecutor::new();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let exec = clock.as_executor();
        for i in 0..count {
            let ran = Arc::clone(&ran);
            exec.execute(Box::new(move || ran.lock().unwrap().push(i)));
        }
        prop_assert_eq!(clock.run_pending(), count);
        prop_assert_eq!(clock.run_pending(), 0);
        prop_assert_eq!(&*ran.lock().unwrap(), &(0..count).collect::<Vec<_>>());
    }
}
