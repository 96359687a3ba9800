//! Compare-And-Swap Tests
//!
//! Tests for optimistic balance updates:
//! - Concurrent CAS increments are never lost
//! - A stale CAS is rejected as a precondition failure, not retried
//! - Rejected CAS updates are counted as prevented, never as anomalies

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use isoprobe::{
    AccountRepository, Balance, Error, IsolationLevel, LockMode, RetryConfig, Transaction,
    TransactionWrapper, WorkloadType,
};

use crate::common::*;

// ============================================================================
// N x M increments
// ============================================================================

#[test]
fn cas_increments_are_never_lost() {
    const WORKERS: usize = 4;
    const INCREMENTS: usize = 25;

    let db = Arc::new(seeded_store_with_timeout(1, Duration::from_secs(5)));
    let prevented = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let db = Arc::clone(&db);
            let prevented = Arc::clone(&prevented);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let id = account(1);
                let wrapper = TransactionWrapper::new(
                    &*db,
                    IsolationLevel::ReadCommitted,
                    RetryConfig::unbounded().with_base_delay_ms(0),
                );
                barrier.wait();

                let mut applied = 0;
                while applied < INCREMENTS {
                    let result = wrapper.execute(
                        |txn| {
                            let current = txn.find_by_id(&id, LockMode::None)?;
                            txn.update_balance_cas(&current.add_balance(Balance::from_units(1)))
                        },
                        |_| {},
                    );
                    match result {
                        Ok(()) => applied += 1,
                        Err(e) if e.is_precondition() => {
                            prevented.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let expected = INITIAL_BALANCE + (WORKERS * INCREMENTS) as i64;
    assert_eq!(
        db.get_committed(&account(1)).unwrap().balance,
        Balance::from_units(expected),
        "{} CAS rejections along the way",
        prevented.load(Ordering::Relaxed)
    );
    assert_eq!(db.locked_rows(), 0);
}

// ============================================================================
// Stale CAS
// ============================================================================

#[test]
fn stale_cas_fails_with_precondition() {
    let db = seeded_store(1);
    let id = account(1);

    let mut t1 = db.begin_transaction(IsolationLevel::ReadCommitted);
    let mut t2 = db.begin_transaction(IsolationLevel::ReadCommitted);
    let seen_by_t1 = t1.find_by_id(&id, LockMode::None).unwrap();
    let seen_by_t2 = t2.find_by_id(&id, LockMode::None).unwrap();
    assert_eq!(seen_by_t1.version, seen_by_t2.version);

    t1.update_balance_cas(&seen_by_t1.add_balance(Balance::from_units(5)))
        .unwrap();
    Box::new(t1).commit().unwrap();

    let err = t2
        .update_balance_cas(&seen_by_t2.add_balance(Balance::from_units(7)))
        .unwrap_err();
    assert!(err.is_precondition());
    assert!(!err.is_retryable());
    match err {
        Error::OptimisticPrecondition {
            expected_version,
            found_version,
            ..
        } => assert!(found_version > expected_version),
        other => panic!("unexpected error: {}", other),
    }
    Box::new(t2).rollback();

    assert_eq!(
        db.get_committed(&id).unwrap().balance,
        Balance::from_units(INITIAL_BALANCE + 5)
    );
}

#[test]
fn wrapper_does_not_retry_precondition() {
    let db = seeded_store(1);
    let id = account(1);
    let stale = db.get_committed(&id).unwrap();

    let mut bump = db.begin_transaction(IsolationLevel::ReadCommitted);
    bump.update_balance(&stale.add_balance(Balance::from_units(1)))
        .unwrap();
    Box::new(bump).commit().unwrap();

    let wrapper = TransactionWrapper::new(
        &db,
        IsolationLevel::ReadCommitted,
        RetryConfig::unbounded().with_base_delay_ms(0),
    );
    let mut attempts = 0;
    let err = wrapper
        .execute(
            |txn| txn.update_balance_cas(&stale.add_balance(Balance::from_units(1))),
            |d| attempts = d.len(),
        )
        .unwrap_err();

    assert!(err.is_precondition());
    assert_eq!(attempts, 1);
}

// ============================================================================
// Workload level
// ============================================================================

#[test]
fn lost_update_workload_counts_prevented_not_anomalies() {
    let mut settings = quick_settings(IsolationLevel::ReadCommitted, 400);
    settings.workers = 8;
    settings.read_write_ratio = 0.0;
    settings.optimistic_locking = true;
    let db = seeded_store(8);

    let (outcome, reporter) = run_workload(db.clone(), WorkloadType::LostUpdate, settings);

    assert_eq!(outcome.failures, 0, "{:?}", reporter.errors());
    assert!(outcome.verdict.is_clean(), "{:?}", reporter.errors());
    assert_eq!(
        reporter.field("Total prevented (CAS)"),
        Some(outcome.verdict.prevented.to_string().as_str())
    );
    // transfers move money, they never create or destroy it
    assert_eq!(db.total_balance(), Balance::from_units(8 * INITIAL_BALANCE));
}
