//! End-to-End Tests
//!
//! Full lifecycle through the facade: settings, seeding, runner, console
//! report and exit status.

use std::io::Write;
use std::sync::Arc;

use isoprobe::{
    ConsoleReporter, Database, ExitStatus, IsolationLevel, MemDatabase, Settings,
    WorkloadContext, WorkloadRunner, WorkloadType,
};

use crate::common::*;

#[test]
fn every_workload_is_clean_under_serializable() {
    for kind in WorkloadType::ALL {
        let db = seeded_store(8);
        let (outcome, reporter) =
            run_workload(db, kind, quick_settings(IsolationLevel::Serializable, 150));

        assert_eq!(outcome.failures, 0, "{}: {:?}", kind, reporter.errors());
        assert!(outcome.verdict.is_clean(), "{}: {:?}", kind, reporter.errors());
        assert_eq!(outcome.exit_status(), ExitStatus::Clean);
        assert_eq!(outcome.executions, 150);
    }
}

#[test]
fn console_report_sections() {
    let settings = quick_settings(IsolationLevel::Serializable, 40);
    let db: Arc<dyn Database> = Arc::new(seeded_store(8));
    let runner = WorkloadRunner::from_settings(&settings);
    let mut workload = WorkloadType::WriteSkew.create(WorkloadContext::new(db, settings));

    let mut reporter = ConsoleReporter::new(Vec::new());
    runner.run(workload.as_mut(), &mut reporter).unwrap();
    let text = String::from_utf8(reporter.into_inner()).unwrap();

    let check = text.find("== Consistency Check ==").unwrap();
    let latency = text.find("== Latency ==").unwrap();
    assert!(check < latency, "verdict is reported before latency");
    assert!(text.contains("Total withdrawals:"));
    assert!(text.contains("You are good!"));
    assert!(!text.contains("[!]"));
}

#[test]
fn settings_file_drives_a_run() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
workers = 2
iterations = 60
read_write_ratio = 0.5
isolation = "repeatable_read"
repeated_reads = 4

[selection]
count = 3

[accounts]
count = 5
initial_balance = "250.00"

[retry]
unbounded = true
base_delay_ms = 1
max_delay_ms = 2
"#
    )
    .unwrap();

    let settings = Settings::load(file.path()).unwrap();
    settings.validate().unwrap();
    assert_eq!(settings.isolation, IsolationLevel::RepeatableRead);

    let db = MemDatabase::with_lock_timeout(settings.lock_timeout());
    db.seed(&settings.accounts);
    assert_eq!(db.accounts().len(), 5);

    // snapshot reads make repeated reads stable
    let (outcome, reporter) = run_workload(db, WorkloadType::NonRepeatableRead, settings);
    assert_eq!(outcome.executions, 60);
    assert!(outcome.verdict.is_clean(), "{:?}", reporter.errors());
}

#[test]
fn held_row_locks_make_workers_fail_fatally() {
    let db = seeded_store(4);
    // an open transaction pins exclusive locks on every target
    let mut holder = db.begin_transaction(IsolationLevel::ReadCommitted);
    for group in 1..=4 {
        let row = db.get_committed(&account(group)).unwrap();
        isoprobe::AccountRepository::update_balance(&mut holder, &row).unwrap();
    }

    let mut settings = quick_settings(IsolationLevel::ReadCommitted, 10);
    settings.workers = 2;
    settings.read_write_ratio = 0.0;
    settings.retry = isoprobe::RetryConfig::no_retry();

    let (outcome, reporter) = run_workload(db.clone(), WorkloadType::NonRepeatableRead, settings);
    drop(holder);

    assert_eq!(outcome.failures, 2);
    assert_eq!(outcome.exit_status(), ExitStatus::FatalErrors);
    assert_eq!(outcome.exit_status().code(), 2);
    // the report is printed regardless
    assert!(reporter.field("Total writes").is_some());
    assert!(reporter
        .errors()
        .iter()
        .any(|e| e.contains("stopped by fatal errors")));
    assert_eq!(db.locked_rows(), 0);
}
