//! Retry and Duration Accounting Tests
//!
//! Every transaction attempt contributes exactly one duration, whether it
//! committed or was retried after a conflict.

use isoprobe::{
    AccountRepository, Balance, IsolationLevel, LockMode, RetryConfig, Transaction,
    TransactionWrapper, WorkloadType,
};

use crate::common::*;

#[test]
fn real_conflict_is_retried_and_timed() {
    let db = seeded_store(1);
    let id = account(1);
    let wrapper = TransactionWrapper::new(
        &db,
        IsolationLevel::RepeatableRead,
        RetryConfig::new().with_base_delay_ms(0),
    );

    let mut attempt = 0;
    let mut durations = Vec::new();
    wrapper
        .execute(
            |txn| {
                attempt += 1;
                let seen = txn.find_by_id(&id, LockMode::None)?;
                if attempt == 1 {
                    // a concurrent writer commits after our snapshot
                    let mut other = db.begin_transaction(IsolationLevel::ReadCommitted);
                    let row = other.find_by_id(&id, LockMode::None)?;
                    other.update_balance(&row.add_balance(Balance::from_units(10)))?;
                    Box::new(other).commit()?;
                }
                txn.update_balance(&seen.add_balance(Balance::from_units(1)))
            },
            |d| durations = d,
        )
        .unwrap();

    assert_eq!(attempt, 2);
    assert_eq!(durations.len(), 2);
    // the retry read the concurrent write, nothing was lost
    assert_eq!(
        db.get_committed(&id).unwrap().balance,
        Balance::from_units(INITIAL_BALANCE + 11)
    );
}

#[test]
fn read_only_snapshot_runs_record_one_attempt_per_execution() {
    let mut settings = quick_settings(IsolationLevel::RepeatableRead, 120);
    settings.read_write_ratio = 0.999_999;

    let (outcome, _) = run_workload(seeded_store(8), WorkloadType::ReadSkew, settings);

    assert_eq!(outcome.executions, 120);
    assert_eq!(outcome.durations.len(), 120);
    assert_eq!(outcome.latency.count, 120);
}

#[test]
fn contended_runs_record_every_attempt() {
    let mut settings = quick_settings(IsolationLevel::Serializable, 200);
    settings.workers = 8;
    settings.read_write_ratio = 0.2;
    settings.selection.count = 2;

    let (outcome, reporter) = run_workload(seeded_store(8), WorkloadType::WriteSkew, settings);

    assert_eq!(outcome.failures, 0, "{:?}", reporter.errors());
    assert!(outcome.durations.len() >= outcome.executions as usize);
    assert_eq!(outcome.latency.count, outcome.durations.len());
    assert!(outcome.latency.max_ms >= outcome.latency.p50_ms);
}
