//! Account entity and its composite key
//!
//! An account is identified by a group (shard) identifier plus a string
//! discriminator. Sibling rows share a group; predicate reads count rows by
//! group.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::balance::Balance;

/// Composite account key: group identifier plus unique discriminator
///
/// Ordering is by group first, then discriminator, so ordered collections of
/// ids (ledgers, target sets) iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId {
    /// Group / shard identifier shared by sibling rows
    pub group: i64,
    /// Unique discriminator within the group
    pub discriminator: String,
}

impl AccountId {
    /// Create a new account id
    pub fn new(group: i64, discriminator: impl Into<String>) -> Self {
        AccountId {
            group,
            discriminator: discriminator.into(),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.discriminator)
    }
}

/// The test entity
///
/// `version` is the commit version of the row as it was read. Optimistic
/// (compare-and-swap) updates succeed only while the stored row still carries
/// this version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Composite key
    pub id: AccountId,
    /// Current balance
    pub balance: Balance,
    /// Display name
    pub name: String,
    /// Row version observed when this account was read (0 = never stored)
    pub version: u64,
}

impl Account {
    /// Create a new, not yet stored account
    pub fn new(id: AccountId, balance: Balance, name: impl Into<String>) -> Self {
        Account {
            id,
            balance,
            name: name.into(),
            version: 0,
        }
    }

    /// Copy of this account with `delta` added to the balance
    ///
    /// The version is kept, so the copy can be written back with a
    /// compare-and-swap update against the row that was read.
    pub fn add_balance(&self, delta: Balance) -> Account {
        Account {
            balance: self.balance + delta,
            ..self.clone()
        }
    }

    /// Copy of this account with a replaced balance (version kept)
    pub fn with_balance(&self, balance: Balance) -> Account {
        Account {
            balance,
            ..self.clone()
        }
    }
}
