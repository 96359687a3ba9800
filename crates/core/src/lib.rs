//! Core types and traits for isoprobe
//!
//! This crate defines the foundational types shared by every layer:
//! - AccountId / Account: the test entity and its composite key
//! - Balance: exact fixed-point decimal used for account balances
//! - Error: error taxonomy (retryable conflicts, CAS preconditions, fatal failures)
//! - Settings: run configuration loaded from TOML and CLI overrides
//! - Traits: repository, database and reporter contracts (Database, Transaction,
//!   AccountRepository, Reporter)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod balance;
pub mod error;
pub mod settings;
pub mod traits;
pub mod types;

pub use balance::{Balance, BalanceParseError};
pub use error::{Error, Result};
pub use settings::{
    AccountSelection, IsolationLevel, LockMode, RetryConfig, SeedConfig, Settings,
    StopCondition,
};
pub use traits::{AccountRepository, Database, Reporter, Transaction};
pub use types::{Account, AccountId};
