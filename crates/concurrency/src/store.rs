//! Multi-version row storage
//!
//! Each account id maps to its version chain, oldest first. A chain entry
//! with `row: None` is a tombstone left by a delete. Reads are bounded by a
//! version: a reader at version `v` sees the newest entry with
//! `version <= v`.

use std::collections::BTreeMap;
use std::ops::Range;

use isoprobe_core::{Account, AccountId, Balance};

/// Row payload (everything in an account except its id and version)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Balance
    pub balance: Balance,
    /// Display name
    pub name: String,
}

impl From<&Account> for StoredRow {
    fn from(account: &Account) -> Self {
        StoredRow {
            balance: account.balance,
            name: account.name.clone(),
        }
    }
}

/// One entry in a row's version chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowVersion {
    /// Commit version that produced this entry
    pub version: u64,
    /// Row contents, or `None` for a delete
    pub row: Option<StoredRow>,
}

impl RowVersion {
    fn to_account(&self, id: &AccountId) -> Option<Account> {
        self.row.as_ref().map(|row| Account {
            id: id.clone(),
            balance: row.balance,
            name: row.name.clone(),
            version: self.version,
        })
    }
}

/// Version chains for every account ever written
#[derive(Debug, Default)]
pub struct VersionedRows {
    rows: BTreeMap<AccountId, Vec<RowVersion>>,
}

pub(crate) fn group_range(group: i64) -> Range<AccountId> {
    // Discriminators sort after "", so this covers exactly one group.
    AccountId::new(group, "")..AccountId::new(group.saturating_add(1), "")
}

impl VersionedRows {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_at(&self, id: &AccountId, max_version: u64) -> Option<&RowVersion> {
        self.rows
            .get(id)?
            .iter()
            .rev()
            .find(|v| v.version <= max_version)
    }

    /// Row as of `max_version`
    pub fn get_at(&self, id: &AccountId, max_version: u64) -> Option<Account> {
        self.entry_at(id, max_version)?.to_account(id)
    }

    /// Newest committed row
    pub fn get_latest(&self, id: &AccountId) -> Option<Account> {
        self.rows.get(id)?.last()?.to_account(id)
    }

    /// Version of the entry visible at `max_version`, tombstones included;
    /// 0 if the id had never been written by then
    pub fn version_at(&self, id: &AccountId, max_version: u64) -> u64 {
        self.entry_at(id, max_version).map_or(0, |v| v.version)
    }

    /// Version of the newest entry, tombstones included; 0 if never written
    pub fn latest_version(&self, id: &AccountId) -> u64 {
        self.rows
            .get(id)
            .and_then(|chain| chain.last())
            .map_or(0, |v| v.version)
    }

    /// Live rows of `group` as of `max_version`, ordered by id
    pub fn scan_group_at(&self, group: i64, max_version: u64) -> Vec<Account> {
        self.rows
            .range(group_range(group))
            .filter_map(|(id, chain)| {
                chain
                    .iter()
                    .rev()
                    .find(|v| v.version <= max_version)
                    .and_then(|v| v.to_account(id))
            })
            .collect()
    }

    /// True if any row in `group` (including deletes and inserts) was
    /// committed after `version`
    pub fn group_modified_after(&self, group: i64, version: u64) -> bool {
        self.rows
            .range(group_range(group))
            .any(|(_, chain)| chain.last().is_some_and(|v| v.version > version))
    }

    /// Newest live version of every row, ordered by id
    pub fn latest_rows(&self) -> Vec<Account> {
        self.rows
            .iter()
            .filter_map(|(id, chain)| chain.last()?.to_account(id))
            .collect()
    }

    /// Append one committed entry per written id
    ///
    /// Entries older than the newest one at or below `horizon` are no longer
    /// reachable by any reader and are dropped from the touched chains.
    pub fn apply<I>(&mut self, writes: I, version: u64, horizon: u64)
    where
        I: IntoIterator<Item = (AccountId, Option<StoredRow>)>,
    {
        for (id, row) in writes {
            let chain = self.rows.entry(id).or_default();
            chain.push(RowVersion { version, row });
            prune_chain(chain, horizon);
        }
    }

    /// Total number of version entries held (live, old and tombstones)
    pub fn entry_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }
}

fn prune_chain(chain: &mut Vec<RowVersion>, horizon: u64) {
    let keep_from = chain
        .iter()
        .rposition(|v| v.version <= horizon)
        .unwrap_or(0);
    if keep_from > 0 {
        chain.drain(..keep_from);
    }
}
