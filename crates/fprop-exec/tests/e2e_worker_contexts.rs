//! E2E integration test: worker threads as dispatch contexts.
//!
//! Validates:
//! 1. Work posted between two workers lands on the intended thread.
//! 2. Delayed tasks scheduled from inside a worker use that worker.
//! 3. Configuration from the environment reaches the spawned thread.
//! 4. A `call` whose closure panics reports an error; the worker lives on.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, mpsc};
use std::thread;

use fprop_exec::{
    ExecError, WorkerConfig, WorkerThread, current_executor, current_scheduler, unconfined,
};
use web_time::Duration;

// ═════════════════════════════════════════════════════════════════════════
// Test 1: ping-pong between two workers
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn e2e_ping_pong_between_workers() {
    let left = WorkerThread::start(WorkerConfig::default().with_name("left")).unwrap();
    let right = WorkerThread::start(WorkerConfig::default().with_name("right")).unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    let hops = Arc::new(Mutex::new(Vec::new()));

    let right_exec = right.executor();
    let log = Arc::clone(&hops);
    left.executor().execute(Box::new(move || {
        log.lock().unwrap().push(thread::current().name().map(str::to_string));
        let back = current_executor().unwrap_or_else(unconfined);
        right_exec.execute(Box::new(move || {
            log.lock().unwrap().push(thread::current().name().map(str::to_string));
            back.execute(Box::new(move || {
                log.lock().unwrap().push(thread::current().name().map(str::to_string));
                let _ = done_tx.send(());
            }));
        }));
    }));

    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let hops = hops.lock().unwrap();
    let names: Vec<_> = hops.iter().map(|n| n.as_deref()).collect();
    assert_eq!(names, vec![Some("left"), Some("right"), Some("left")]);
}

// ═════════════════════════════════════════════════════════════════════════
// Test 2: delayed tasks from inside a worker
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn e2e_scheduled_from_worker_runs_on_worker() {
    let worker = WorkerThread::spawn().unwrap();
    let home = worker.thread_id();
    let (tx, rx) = mpsc::channel();
    worker
        .call(move || {
            let scheduler = current_scheduler().expect("worker installs a scheduler");
            let _ = scheduler.schedule(
                Duration::from_millis(5),
                Box::new(move || {
                    let _ = tx.send(thread::current().id());
                }),
            );
        })
        .unwrap();
    let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(ran_on, home);
}

#[test]
fn e2e_many_submitters_one_worker() {
    let submitters = 8;
    let per_submitter = 200;
    let worker = WorkerThread::spawn().unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(submitters));

    let handles: Vec<_> = (0..submitters)
        .map(|_| {
            let exec = worker.executor();
            let count = Arc::clone(&count);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..per_submitter {
                    let count = Arc::clone(&count);
                    exec.execute(Box::new(move || {
                        count.fetch_add(1, Ordering::Relaxed);
                    }));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    worker.call(|| ()).unwrap();
    assert_eq!(count.load(Ordering::Relaxed), submitters * per_submitter);
}

// ═════════════════════════════════════════════════════════════════════════
// Test 3: configuration and lifecycle
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn e2e_env_config_names_the_thread() {
    let config = WorkerConfig::from_env_with(|key| match key {
        fprop_exec::config::ENV_WORKER_NAME => Some("from-env".into()),
        fprop_exec::config::ENV_WORKER_STACK_SIZE => Some("262144".into()),
        _ => None,
    })
    .unwrap();
    let worker = WorkerThread::start(config).unwrap();
    let name = worker
        .call(|| thread::current().name().map(str::to_string))
        .unwrap();
    assert_eq!(name.as_deref(), Some("from-env"));
}

#[test]
fn e2e_panicking_call_reports_error_and_worker_survives() {
    let worker = WorkerThread::spawn().unwrap();
    let err = worker
        .call(|| panic!("task dies before replying"))
        .map(|()| ())
        .unwrap_err();
    assert!(matches!(err, ExecError::ShutDown { .. }));
    assert_eq!(worker.call(|| 1).unwrap(), 1);
}
