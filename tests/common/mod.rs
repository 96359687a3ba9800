//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use isoprobe::{
    AccountId, AccountSelection, Balance, Database, IsolationLevel, MemDatabase,
    RecordingReporter, RetryConfig, RunOutcome, SeedConfig, Settings, WorkloadContext,
    WorkloadRunner, WorkloadType,
};

/// Balance every seeded account starts with
pub const INITIAL_BALANCE: i64 = 100;

/// Seeded store with `count` accounts and a short lock timeout
pub fn seeded_store(count: usize) -> MemDatabase {
    seeded_store_with_timeout(count, Duration::from_millis(50))
}

/// Seeded store with an explicit lock timeout
pub fn seeded_store_with_timeout(count: usize, lock_timeout: Duration) -> MemDatabase {
    let db = MemDatabase::with_lock_timeout(lock_timeout);
    db.seed(&SeedConfig {
        count,
        initial_balance: Balance::from_units(INITIAL_BALANCE),
    });
    db
}

/// Id of the seeded account in `group`
pub fn account(group: i64) -> AccountId {
    AccountId::new(group, "checking")
}

/// Settings for a short deterministic-budget run
pub fn quick_settings(isolation: IsolationLevel, iterations: u64) -> Settings {
    Settings {
        workers: 4,
        iterations: Some(iterations),
        read_write_ratio: 0.5,
        selection: AccountSelection {
            count: 4,
            random: false,
        },
        isolation,
        repeated_reads: 3,
        retry: RetryConfig::unbounded()
            .with_base_delay_ms(1)
            .with_max_delay_ms(4),
        accounts: SeedConfig {
            count: 8,
            initial_balance: Balance::from_units(INITIAL_BALANCE),
        },
        ..Settings::default()
    }
}

/// Run `kind` against `db` and keep the report lines
pub fn run_workload(
    db: MemDatabase,
    kind: WorkloadType,
    settings: Settings,
) -> (RunOutcome, RecordingReporter) {
    let runner = WorkloadRunner::from_settings(&settings);
    let db: Arc<dyn Database> = Arc::new(db);
    let mut workload = kind.create(WorkloadContext::new(db, settings));
    let mut reporter = RecordingReporter::new();
    let outcome = runner
        .run(workload.as_mut(), &mut reporter)
        .expect("run should not fail");
    (outcome, reporter)
}
