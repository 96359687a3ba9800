//! isoprobe - concurrency anomaly verification harness
//!
//! isoprobe runs workloads designed to provoke a specific transaction
//! isolation anomaly (lost update, read skew, write skew, non-repeatable
//! read, phantom read) against a transactional store, detects when the
//! anomaly actually occurred, and reports per-account findings.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use isoprobe::{MemDatabase, RecordingReporter, Settings, WorkloadContext, WorkloadRunner, WorkloadType};
//!
//! let settings = Settings { iterations: Some(1_000), ..Settings::default() };
//! let db = MemDatabase::with_lock_timeout(settings.lock_timeout());
//! db.seed(&settings.accounts);
//!
//! let runner = WorkloadRunner::from_settings(&settings);
//! let mut workload = WorkloadType::NonRepeatableRead.create(WorkloadContext::new(Arc::new(db), settings));
//! let outcome = runner.run(workload.as_mut(), &mut RecordingReporter::new())?;
//! println!("anomalies: {}", outcome.verdict.anomalies);
//! ```
//!
//! # Architecture
//!
//! - `isoprobe-core`: data model, errors, settings, store contracts
//! - `isoprobe-concurrency`: reference in-memory store with configurable isolation
//! - `isoprobe-engine`: transaction wrapper, workloads, runner, reporting
//!
//! Any store implementing [`Database`] can be probed; the reference store
//! is only one implementation.

pub use isoprobe_concurrency::MemDatabase;
pub use isoprobe_core::*;
pub use isoprobe_engine::*;
