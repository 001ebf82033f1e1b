//! Integration-style tests spanning the task queue and the worker pool
//! together: property-based invariants about settlement and refill under
//! mixed/failing workloads, rather than a single module's unit behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cipher_core::pool::{PoolConfig, PoolError, WorkerPool};
use cipher_core::worker::PreprocessFn;

fn config(concurrency: usize) -> PoolConfig {
    PoolConfig {
        concurrency,
        ..PoolConfig::default()
    }
}

/// "For every submitted task, exactly one of resolve or reject is invoked,
/// exactly once" — exercised against a mixed workload of successes,
/// reported errors, and crashes fired concurrently across a small pool.
#[tokio::test]
async fn every_task_settles_exactly_once_under_mixed_outcomes() {
    let preprocess: PreprocessFn = Arc::new(|input: &str| match input {
        s if s.starts_with("err:") => Err(format!("rejected {s}")),
        s if s.starts_with("crash:") => panic!("simulated crash for {s}"),
        s => Ok(s.to_string()),
    });

    let pool = WorkerPool::new(config(4), preprocess);

    let mut handles = Vec::new();
    for i in 0..90 {
        let pool = pool.clone();
        let input = match i % 3 {
            0 => format!("ok:{i}"),
            1 => format!("err:{i}"),
            _ => format!("crash:{i}"),
        };
        handles.push(tokio::spawn(async move {
            let result = pool.submit(input.clone()).await;
            (input, result)
        }));
    }

    let mut ok_count = 0;
    let mut err_count = 0;
    let mut crash_count = 0;
    for handle in handles {
        let (input, result) = handle.await.unwrap();
        match result {
            Ok(output) => {
                assert!(input.starts_with("ok:"));
                assert_eq!(output, input);
                ok_count += 1;
            }
            Err(PoolError::WorkerReportedError { .. }) => {
                assert!(input.starts_with("err:"));
                err_count += 1;
            }
            Err(PoolError::WorkerCrashed) => {
                assert!(input.starts_with("crash:"));
                crash_count += 1;
            }
            Err(other) => panic!("unexpected settle for {input}: {other}"),
        }
    }

    assert_eq!(ok_count, 30);
    assert_eq!(err_count, 30);
    assert_eq!(crash_count, 30);
}

/// The pool keeps itself topped back up to `CONCURRENCY` across repeated
/// crashes rather than shrinking permanently.
#[tokio::test]
async fn pool_refills_to_concurrency_after_repeated_crashes() {
    let crash_next = Arc::new(AtomicUsize::new(5));
    let preprocess: PreprocessFn = {
        let crash_next = Arc::clone(&crash_next);
        Arc::new(move |input: &str| {
            let remaining = crash_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_sub(1)))
                .unwrap();
            if remaining > 0 {
                panic!("crash {input}");
            }
            Ok(input.to_string())
        })
    };

    let pool = WorkerPool::new(config(2), preprocess);

    for i in 0..5 {
        let _ = pool.submit(format!("{i}")).await;
    }
    let final_output = pool.submit("settled".to_string()).await.unwrap();
    assert_eq!(final_output, "settled");

    let snapshot = pool.snapshot().await;
    assert_eq!(snapshot.worker_count, 2);
    assert!(!snapshot.is_fatal);
}
