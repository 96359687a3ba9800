//! `MemDatabase`: the reference store
//!
//! Holds the versioned rows, the transaction manager and the lock table
//! behind one `Arc`, so handles are cheap to clone and share between
//! workers.

use std::sync::Arc;
use std::time::Duration;

use isoprobe_core::{
    Account, AccountId, AccountSelection, Balance, Database, Error, IsolationLevel, Result,
    SeedConfig, Transaction,
};
use parking_lot::RwLock;
use rand::seq::SliceRandom;

use crate::locks::LockTable;
use crate::manager::TransactionManager;
use crate::store::{StoredRow, VersionedRows};
use crate::transaction::MemTransaction;

/// Default row lock wait timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Discriminator of seeded accounts
pub const SEED_DISCRIMINATOR: &str = "checking";

pub(crate) struct Shared {
    pub(crate) rows: RwLock<VersionedRows>,
    pub(crate) manager: TransactionManager,
    pub(crate) locks: LockTable,
    pub(crate) lock_timeout: Duration,
}

/// In-memory multi-version store implementing `Database`
#[derive(Clone)]
pub struct MemDatabase {
    shared: Arc<Shared>,
}

impl MemDatabase {
    /// Empty store with the default lock timeout
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Empty store whose lock waits give up after `lock_timeout`
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        MemDatabase {
            shared: Arc::new(Shared {
                rows: RwLock::new(VersionedRows::new()),
                manager: TransactionManager::default(),
                locks: LockTable::new(),
                lock_timeout,
            }),
        }
    }

    /// Row lock wait timeout
    pub fn lock_timeout(&self) -> Duration {
        self.shared.lock_timeout
    }

    /// Begin a transaction with the concrete type
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> MemTransaction {
        MemTransaction::begin(Arc::clone(&self.shared), isolation)
    }

    /// Commit `accounts` directly in one version, replacing existing rows
    ///
    /// Returns the commit version.
    pub fn load<I>(&self, accounts: I) -> u64
    where
        I: IntoIterator<Item = Account>,
    {
        let mut rows = self.shared.rows.write();
        let version = self.shared.manager.allocate_version();
        let horizon = self.shared.manager.horizon();
        rows.apply(
            accounts.into_iter().map(|a| {
                let row = StoredRow::from(&a);
                (a.id, Some(row))
            }),
            version,
            horizon,
        );
        version
    }

    /// Create `config.count` accounts, groups `1..=count`, each with
    /// `config.initial_balance`
    pub fn seed(&self, config: &SeedConfig) -> Vec<AccountId> {
        let accounts: Vec<Account> = (1..=config.count as i64)
            .map(|group| {
                Account::new(
                    AccountId::new(group, SEED_DISCRIMINATOR),
                    config.initial_balance,
                    format!("Account {}", group),
                )
            })
            .collect();
        let ids = accounts.iter().map(|a| a.id.clone()).collect();
        let version = self.load(accounts);
        tracing::info!(
            target: "isoprobe::store",
            count = config.count,
            initial_balance = %config.initial_balance,
            version,
            "Seeded accounts"
        );
        ids
    }

    /// Latest committed row, read outside any transaction
    pub fn get_committed(&self, id: &AccountId) -> Option<Account> {
        self.shared.rows.read().get_latest(id)
    }

    /// Latest committed rows of a group, ordered by id
    pub fn group_committed(&self, group: i64) -> Vec<Account> {
        let rows = self.shared.rows.read();
        rows.scan_group_at(group, self.shared.manager.current_version())
    }

    /// All live rows, ordered by id
    pub fn accounts(&self) -> Vec<Account> {
        self.shared.rows.read().latest_rows()
    }

    /// Sum of all live balances
    pub fn total_balance(&self) -> Balance {
        self.accounts().iter().map(|a| a.balance).sum()
    }

    /// Current commit version
    pub fn current_version(&self) -> u64 {
        self.shared.manager.current_version()
    }

    /// Rows currently locked by some transaction
    pub fn locked_rows(&self) -> usize {
        self.shared.locks.locked_rows()
    }

    /// Transactions currently holding a snapshot
    pub fn live_snapshots(&self) -> usize {
        self.shared.manager.live_snapshots()
    }
}

impl Default for MemDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for MemDatabase {
    fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(self.begin_transaction(isolation)))
    }

    fn find_target_accounts(&self, selection: &AccountSelection) -> Result<Vec<Account>> {
        let all = self.accounts();
        if all.len() < selection.count {
            return Err(Error::InvalidConfig(format!(
                "{} target accounts requested but only {} exist",
                selection.count,
                all.len()
            )));
        }

        let mut targets: Vec<Account> = if selection.random {
            all.choose_multiple(&mut rand::thread_rng(), selection.count)
                .cloned()
                .collect()
        } else {
            all.into_iter().take(selection.count).collect()
        };
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isoprobe_core::LockMode;

    fn seeded(count: usize) -> MemDatabase {
        let db = MemDatabase::new();
        db.seed(&SeedConfig {
            count,
            initial_balance: Balance::from_units(500),
        });
        db
    }

    #[test]
    fn test_seed_creates_one_account_per_group() {
        let db = seeded(5);
        let accounts = db.accounts();
        assert_eq!(accounts.len(), 5);
        assert_eq!(accounts[0].id, AccountId::new(1, "checking"));
        assert_eq!(accounts[4].id, AccountId::new(5, "checking"));
        assert_eq!(db.total_balance(), Balance::from_units(2500));
        assert_eq!(db.current_version(), 1);
    }

    #[test]
    fn test_find_target_accounts_ordered() {
        let db = seeded(20);
        let first = db
            .find_target_accounts(&AccountSelection {
                count: 4,
                random: false,
            })
            .unwrap();
        let groups: Vec<i64> = first.iter().map(|a| a.id.group).collect();
        assert_eq!(groups, vec![1, 2, 3, 4]);

        let sampled = db
            .find_target_accounts(&AccountSelection {
                count: 6,
                random: true,
            })
            .unwrap();
        assert_eq!(sampled.len(), 6);
        assert!(sampled.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_find_target_accounts_rejects_oversized_selection() {
        let db = seeded(3);
        let err = db
            .find_target_accounts(&AccountSelection {
                count: 4,
                random: false,
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_commit_applies_and_drop_discards() {
        let db = seeded(2);
        let id = AccountId::new(1, "checking");

        let mut txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        let account = txn.find_by_id(&id, LockMode::None).unwrap();
        txn.update_balance(&account.add_balance(Balance::from_units(1)))
            .unwrap();
        drop(txn);
        assert_eq!(db.get_committed(&id).unwrap().balance, Balance::from_units(500));
        assert_eq!(db.locked_rows(), 0);

        let mut txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        let account = txn.find_by_id(&id, LockMode::None).unwrap();
        txn.update_balance(&account.add_balance(Balance::from_units(1)))
            .unwrap();
        txn.commit().unwrap();
        let stored = db.get_committed(&id).unwrap();
        assert_eq!(stored.balance, Balance::from_units(501));
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_snapshot_released_on_finish() {
        let db = seeded(1);
        let txn = db.begin(IsolationLevel::RepeatableRead).unwrap();
        assert_eq!(db.live_snapshots(), 1);
        txn.rollback();
        assert_eq!(db.live_snapshots(), 0);
    }
}
