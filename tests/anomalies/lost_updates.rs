//! Lost Update Tests
//!
//! Two read-modify-write transactions racing on one row:
//! - Read committed with plain updates loses one of the increments
//! - Repeatable read rejects the second writer (first-updater-wins)
//! - SELECT ... FOR UPDATE serializes the increments

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use isoprobe::{
    AccountRepository, Balance, IsolationLevel, LockMode, MemDatabase, Result, Transaction,
};

use crate::common::*;

/// Two transactions read the same row, meet at a barrier, then both write
/// `read + 1` and commit
fn racing_increments(db: &Arc<MemDatabase>, isolation: IsolationLevel) -> Vec<Result<()>> {
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db = Arc::clone(db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                let id = account(1);
                let mut txn = db.begin_transaction(isolation);
                let seen = txn.find_by_id(&id, LockMode::None)?;
                barrier.wait();
                match txn.update_balance(&seen.add_balance(Balance::from_units(1))) {
                    Ok(()) => Box::new(txn).commit(),
                    Err(e) => {
                        Box::new(txn).rollback();
                        Err(e)
                    }
                }
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn read_committed_plain_update_loses_increment() {
    let db = Arc::new(seeded_store_with_timeout(1, Duration::from_secs(5)));

    let results = racing_increments(&db, IsolationLevel::ReadCommitted);

    assert!(results.iter().all(|r| r.is_ok()));
    // both committed, only one increment survived
    assert_eq!(
        db.get_committed(&account(1)).unwrap().balance,
        Balance::from_units(INITIAL_BALANCE + 1)
    );
}

#[test]
fn repeatable_read_rejects_second_updater() {
    let db = Arc::new(seeded_store_with_timeout(1, Duration::from_secs(5)));

    let results = racing_increments(&db, IsolationLevel::RepeatableRead);

    let committed = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_retryable()))
        .count();
    assert_eq!((committed, conflicts), (1, 1));
    assert_eq!(
        db.get_committed(&account(1)).unwrap().balance,
        Balance::from_units(INITIAL_BALANCE + 1)
    );
    assert_eq!(db.locked_rows(), 0);
}

#[test]
fn for_update_serializes_increments() {
    const WORKERS: usize = 4;
    const INCREMENTS: usize = 25;

    let db = Arc::new(seeded_store_with_timeout(1, Duration::from_secs(5)));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let id = account(1);
                for _ in 0..INCREMENTS {
                    let mut txn = db.begin_transaction(IsolationLevel::ReadCommitted);
                    let seen = txn.find_by_id(&id, LockMode::ForUpdate).unwrap();
                    thread::sleep(Duration::from_micros(50));
                    txn.update_balance(&seen.add_balance(Balance::from_units(1)))
                        .unwrap();
                    Box::new(txn).commit().unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(
        db.get_committed(&account(1)).unwrap().balance,
        Balance::from_units(INITIAL_BALANCE + (WORKERS * INCREMENTS) as i64)
    );
}

#[test]
fn plain_updates_under_contention_lose_money() {
    const WORKERS: usize = 4;
    const INCREMENTS: usize = 25;

    let db = Arc::new(seeded_store_with_timeout(1, Duration::from_secs(5)));
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let id = account(1);
                barrier.wait();
                for _ in 0..INCREMENTS {
                    let mut txn = db.begin_transaction(IsolationLevel::ReadCommitted);
                    let seen = txn.find_by_id(&id, LockMode::None).unwrap();
                    thread::sleep(Duration::from_millis(1));
                    txn.update_balance(&seen.add_balance(Balance::from_units(1)))
                        .unwrap();
                    Box::new(txn).commit().unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let final_balance = db.get_committed(&account(1)).unwrap().balance;
    assert!(final_balance > Balance::from_units(INITIAL_BALANCE));
    assert!(final_balance < Balance::from_units(INITIAL_BALANCE + (WORKERS * INCREMENTS) as i64));
}
