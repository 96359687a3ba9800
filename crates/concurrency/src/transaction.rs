//! In-memory transaction
//!
//! A `MemTransaction` buffers its writes and applies them atomically at
//! commit under one new version. What it reads, and which conflicts it
//! reports, depends on its isolation level:
//!
//! | Level           | Reads                     | Write conflicts                 |
//! |-----------------|---------------------------|---------------------------------|
//! | ReadCommitted   | latest committed per stmt | none (last writer wins)         |
//! | RepeatableRead  | snapshot at begin         | first-updater-wins              |
//! | Serializable    | snapshot at begin         | first-updater-wins + validation |

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use isoprobe_core::{
    Account, AccountId, AccountRepository, Error, IsolationLevel, LockMode, Result, Transaction,
};

use crate::database::Shared;
use crate::locks::LockKind;
use crate::store::{group_range, StoredRow};
use crate::validation::validate_transaction;

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Put(Account),
    Delete,
}

/// One transaction against a `MemDatabase`
pub struct MemTransaction {
    txn_id: u64,
    isolation: IsolationLevel,
    /// Version reads are evaluated at (snapshot levels only)
    snapshot_version: u64,
    shared: Arc<Shared>,
    write_set: BTreeMap<AccountId, PendingWrite>,
    /// Row id -> version seen (serializable only; 0 = absent)
    read_set: HashMap<AccountId, u64>,
    /// Groups scanned by predicate reads (serializable only)
    scanned_groups: BTreeSet<i64>,
    held_locks: HashSet<AccountId>,
    status: TransactionStatus,
    finished: bool,
}

impl MemTransaction {
    pub(crate) fn begin(shared: Arc<Shared>, isolation: IsolationLevel) -> Self {
        let txn_id = shared.manager.next_txn_id();
        let snapshot_version = if isolation.uses_snapshot() {
            // Hold the read lock so no commit lands between reading the
            // version and registering it.
            let _rows = shared.rows.read();
            let version = shared.manager.current_version();
            shared.manager.register_snapshot(version);
            version
        } else {
            0
        };

        tracing::trace!(
            target: "isoprobe::store",
            txn_id,
            %isolation,
            snapshot_version,
            "Transaction started"
        );

        MemTransaction {
            txn_id,
            isolation,
            snapshot_version,
            shared,
            write_set: BTreeMap::new(),
            read_set: HashMap::new(),
            scanned_groups: BTreeSet::new(),
            held_locks: HashSet::new(),
            status: TransactionStatus::Active,
            finished: false,
        }
    }

    /// Unique transaction id
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Isolation level
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Current lifecycle status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.write_set.len()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status == TransactionStatus::Active {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "Transaction {} is not active: {:?}",
                self.txn_id, self.status
            )))
        }
    }

    /// Version a statement starting now reads at
    ///
    /// Must be called with the row-store lock held.
    fn statement_version(&self) -> u64 {
        if self.isolation.uses_snapshot() {
            self.snapshot_version
        } else {
            self.shared.manager.current_version()
        }
    }

    fn committed_row(&mut self, id: &AccountId) -> Option<Account> {
        let rows = self.shared.rows.read();
        let version = self.statement_version();
        if self.isolation == IsolationLevel::Serializable {
            self.read_set
                .entry(id.clone())
                .or_insert_with(|| rows.version_at(id, version));
        }
        rows.get_at(id, version)
    }

    /// Row as this transaction sees it: own writes first, then the store
    fn visible(&mut self, id: &AccountId) -> Option<Account> {
        match self.write_set.get(id) {
            Some(PendingWrite::Put(account)) => Some(account.clone()),
            Some(PendingWrite::Delete) => None,
            None => self.committed_row(id),
        }
    }

    /// Row a write applies to: own writes first, then the latest commit
    fn current_row(&self, id: &AccountId) -> Option<Account> {
        match self.write_set.get(id) {
            Some(PendingWrite::Put(account)) => Some(account.clone()),
            Some(PendingWrite::Delete) => None,
            None => self.shared.rows.read().get_latest(id),
        }
    }

    fn lock_row(&mut self, id: &AccountId, kind: LockKind) -> Result<()> {
        self.shared
            .locks
            .acquire(self.txn_id, id, kind, self.shared.lock_timeout)?;
        self.held_locks.insert(id.clone());

        if self.isolation.uses_snapshot() {
            let latest = self.shared.rows.read().latest_version(id);
            if latest > self.snapshot_version {
                tracing::debug!(
                    target: "isoprobe::store",
                    txn_id = self.txn_id,
                    account = %id,
                    snapshot_version = self.snapshot_version,
                    latest,
                    "First-updater-wins conflict"
                );
                return Err(Error::conflict(format!(
                    "could not serialize access due to concurrent update of {}",
                    id
                )));
            }
        }
        Ok(())
    }

    fn scan_group(&mut self, group: i64) -> BTreeMap<AccountId, Account> {
        let mut found: BTreeMap<AccountId, Account> = {
            let rows = self.shared.rows.read();
            let version = self.statement_version();
            rows.scan_group_at(group, version)
                .into_iter()
                .map(|account| (account.id.clone(), account))
                .collect()
        };
        if self.isolation == IsolationLevel::Serializable {
            self.scanned_groups.insert(group);
        }
        for (id, pending) in self.write_set.range(group_range(group)) {
            match pending {
                PendingWrite::Put(account) => {
                    found.insert(id.clone(), account.clone());
                }
                PendingWrite::Delete => {
                    found.remove(id);
                }
            }
        }
        found
    }

    fn commit_inner(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;

        if self.write_set.is_empty() {
            // Read-only transactions always commit
            self.status = TransactionStatus::Committed;
            self.finish();
            return Ok(());
        }

        let mut rows = self.shared.rows.write();

        if self.isolation == IsolationLevel::Serializable {
            let result = validate_transaction(
                &self.read_set,
                &self.scanned_groups,
                self.snapshot_version,
                &rows,
            );
            if !result.is_valid() {
                drop(rows);
                let reason = result.reason();
                tracing::debug!(
                    target: "isoprobe::store",
                    txn_id = self.txn_id,
                    conflicts = result.conflict_count(),
                    "Serializable validation failed"
                );
                self.status = TransactionStatus::Aborted {
                    reason: reason.clone(),
                };
                self.write_set.clear();
                self.finish();
                return Err(Error::conflict(reason));
            }
        }

        let version = self.shared.manager.allocate_version();
        let horizon = self.shared.manager.horizon();
        let writes = std::mem::take(&mut self.write_set)
            .into_iter()
            .map(|(id, pending)| match pending {
                PendingWrite::Put(account) => (id, Some(StoredRow::from(&account))),
                PendingWrite::Delete => (id, None),
            });
        rows.apply(writes, version, horizon);
        drop(rows);

        tracing::trace!(
            target: "isoprobe::store",
            txn_id = self.txn_id,
            version,
            "Transaction committed"
        );
        self.status = TransactionStatus::Committed;
        self.finish();
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        if self.finished {
            return;
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.to_string(),
        };
        self.write_set.clear();
        self.finish();
    }

    /// Release locks and the snapshot registration; idempotent
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.shared.locks.release_all(self.txn_id, self.held_locks.iter());
        self.held_locks.clear();
        if self.isolation.uses_snapshot() {
            self.shared.manager.release_snapshot(self.snapshot_version);
        }
    }
}

impl AccountRepository for MemTransaction {
    fn find_by_id(&mut self, id: &AccountId, lock: LockMode) -> Result<Account> {
        self.ensure_active()?;
        if let Some(kind) = LockKind::for_mode(lock) {
            self.lock_row(id, kind)?;
        }
        self.visible(id).ok_or_else(|| Error::NotFound(id.clone()))
    }

    fn find_accounts_by_group(&mut self, group: i64, lock: LockMode) -> Result<Vec<Account>> {
        self.ensure_active()?;
        let mut found = self.scan_group(group);

        if let Some(kind) = LockKind::for_mode(lock) {
            let ids: Vec<AccountId> = found.keys().cloned().collect();
            for id in &ids {
                self.lock_row(id, kind)?;
            }
            if !self.isolation.uses_snapshot() {
                // Locked rows are re-evaluated against the latest commit;
                // rows deleted while waiting drop out.
                found = ids
                    .iter()
                    .filter_map(|id| self.visible(id).map(|account| (id.clone(), account)))
                    .collect();
            }
        }

        Ok(found.into_values().collect())
    }

    fn update_balance(&mut self, account: &Account) -> Result<()> {
        self.ensure_active()?;
        self.lock_row(&account.id, LockKind::Exclusive)?;
        let current = self
            .current_row(&account.id)
            .ok_or_else(|| Error::NotFound(account.id.clone()))?;
        self.write_set.insert(
            account.id.clone(),
            PendingWrite::Put(current.with_balance(account.balance)),
        );
        Ok(())
    }

    fn update_balance_cas(&mut self, account: &Account) -> Result<()> {
        self.ensure_active()?;
        self.lock_row(&account.id, LockKind::Exclusive)?;
        let current = self
            .current_row(&account.id)
            .ok_or_else(|| Error::NotFound(account.id.clone()))?;
        if current.version != account.version {
            return Err(Error::OptimisticPrecondition {
                id: account.id.clone(),
                expected_version: account.version,
                found_version: current.version,
            });
        }
        self.write_set.insert(
            account.id.clone(),
            PendingWrite::Put(current.with_balance(account.balance)),
        );
        Ok(())
    }

    fn create_account(&mut self, account: &Account) -> Result<()> {
        self.ensure_active()?;
        self.lock_row(&account.id, LockKind::Exclusive)?;
        if self.current_row(&account.id).is_some() {
            return Err(Error::ConstraintViolation(format!(
                "duplicate key value violates unique constraint: {}",
                account.id
            )));
        }
        let mut row = account.clone();
        row.version = 0;
        self.write_set
            .insert(account.id.clone(), PendingWrite::Put(row));
        Ok(())
    }

    fn delete_account(&mut self, id: &AccountId) -> Result<()> {
        self.ensure_active()?;
        self.lock_row(id, LockKind::Exclusive)?;
        if self.current_row(id).is_some() {
            self.write_set.insert(id.clone(), PendingWrite::Delete);
        }
        Ok(())
    }
}

impl Transaction for MemTransaction {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.commit_inner()
    }

    fn rollback(mut self: Box<Self>) {
        self.abort("rolled back");
    }
}

impl Drop for MemTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::trace!(
                target: "isoprobe::store",
                txn_id = self.txn_id,
                "Dropped without commit, rolling back"
            );
            self.abort("dropped without commit");
        }
    }
}
