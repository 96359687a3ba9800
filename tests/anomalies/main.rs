//! Anomaly Integration Tests
//!
//! Cross-crate tests: workloads from isoprobe-engine running on the
//! reference store from isoprobe-concurrency.

#[path = "../common/mod.rs"]
mod common;

mod cas_properties;
mod end_to_end;
mod lost_updates;
mod retry_accounting;
