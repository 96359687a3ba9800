//! Core traits for the store and report abstractions
//!
//! The workload engine only talks to a store through these traits, so the
//! in-memory reference store can be swapped for a real database client
//! without touching the workloads.

use crate::error::Result;
use crate::settings::{AccountSelection, IsolationLevel, LockMode};
use crate::types::{Account, AccountId};

/// Entity repository operations available inside one transaction
///
/// Every operation may fail with `Error::RetryableConflict`; only the
/// transaction wrapper interprets that signal. All other errors are final for
/// the attempt.
pub trait AccountRepository {
    /// Read one account, optionally taking a row lock
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the account is not visible.
    fn find_by_id(&mut self, id: &AccountId, lock: LockMode) -> Result<Account>;

    /// Read every account in a group (predicate read), optionally locking
    /// the matching rows
    ///
    /// Results are ordered by id.
    fn find_accounts_by_group(&mut self, group: i64, lock: LockMode) -> Result<Vec<Account>>;

    /// Unconditionally write the account's balance
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the row does not exist.
    fn update_balance(&mut self, account: &Account) -> Result<()>;

    /// Write the account's balance only if the stored row still carries
    /// `account.version`
    ///
    /// # Errors
    ///
    /// Returns `Error::OptimisticPrecondition` when the stored version
    /// differs, `Error::NotFound` if the row does not exist.
    fn update_balance_cas(&mut self, account: &Account) -> Result<()>;

    /// Insert a new account
    ///
    /// # Errors
    ///
    /// Returns `Error::ConstraintViolation` if the id already exists.
    fn create_account(&mut self, account: &Account) -> Result<()>;

    /// Delete an account; deleting a missing row is a no-op
    fn delete_account(&mut self, id: &AccountId) -> Result<()>;
}

/// One store transaction
///
/// Dropping a transaction without committing rolls it back.
pub trait Transaction: AccountRepository {
    /// Commit all buffered changes
    ///
    /// # Errors
    ///
    /// Returns `Error::RetryableConflict` if the store cannot serialize the
    /// transaction.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard all buffered changes and release locks
    fn rollback(self: Box<Self>);
}

/// Transactional store: session acquisition plus run-level queries
///
/// Thread safety: shared by all workers (requires Send + Sync).
pub trait Database: Send + Sync {
    /// Begin a transaction at the given isolation level
    ///
    /// # Errors
    ///
    /// Returns `Error::Connectivity` if no session can be acquired.
    fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn Transaction + '_>>;

    /// Select the fixed target-account set for a run, ordered by id
    ///
    /// Called once per run, before any worker starts.
    fn find_target_accounts(&self, selection: &AccountSelection) -> Result<Vec<Account>>;
}

/// Presentation sink for the end-of-run report
///
/// Purely presentational; nothing is returned to the caller.
pub trait Reporter {
    /// Section header
    fn header(&mut self, title: &str);
    /// Informational line
    fn info(&mut self, text: &str);
    /// Error / anomaly line
    fn error(&mut self, text: &str);
    /// Left-aligned label with a value
    fn print_left(&mut self, label: &str, value: &str);
}
