//! Concurrency layer for isoprobe
//!
//! This crate implements the reference in-memory store the workloads run
//! against:
//! - VersionedRows: multi-version row storage with version-bounded reads
//! - TransactionManager: commit version and transaction id allocation
//! - LockTable: shared / exclusive row locks with timed waits
//! - MemTransaction: read/write set tracking per isolation level
//! - Validation: commit-time read-set and predicate checks (serializable)
//! - MemDatabase: the `Database` implementation tying it together
//!
//! Isolation levels behave like their usual SQL counterparts:
//! read committed reads the latest committed row per statement, repeatable
//! read reads one snapshot and enforces first-updater-wins, serializable
//! additionally validates everything it read at commit.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod locks;
pub mod manager;
pub mod store;
pub mod transaction;
pub mod validation;

pub use database::MemDatabase;
pub use locks::{LockKind, LockTable};
pub use manager::TransactionManager;
pub use store::{RowVersion, StoredRow, VersionedRows};
pub use transaction::{MemTransaction, TransactionStatus};
pub use validation::{validate_transaction, ConflictType, ValidationResult};
