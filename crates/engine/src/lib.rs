//! Workload execution engine for isoprobe
//!
//! This crate drives anomaly workloads against any `Database`:
//! - TransactionWrapper: one unit of work per store transaction, retried on
//!   conflicts, with the latency of every attempt recorded
//! - Workload: lifecycle trait plus the five anomaly variants
//! - Detector: per-attempt observations and the insert-only anomaly ledger
//! - WorkloadRunner: concurrent workers, stop conditions, fatal-error isolation
//! - LatencyStats / reporters: end-of-run presentation
//!
//! The engine never assumes in-process mutual exclusion over a row; all row
//! concurrency control is left to the store under test.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod report;
pub mod runner;
pub mod stats;
pub mod transaction;
pub mod workload;

pub use report::{ConsoleReporter, RecordingReporter, ReportLine};
pub use runner::{ExitStatus, RunOutcome, WorkloadRunner};
pub use stats::LatencyStats;
pub use transaction::TransactionWrapper;
pub use workload::{
    AnomalyLedger, LostUpdate, NonRepeatableRead, Observations, Operation, OperationCounters,
    PhantomRead, ReadSkew, Verdict, Workload, WorkloadContext, WorkloadType, WriteSkew,
};
