//! Row lock table
//!
//! Shared and exclusive locks keyed by account id, held until the owning
//! transaction finishes. Waiters block on a condition variable up to the
//! configured timeout; a timeout surfaces as a retryable conflict, the same
//! way a database reports a lock wait timeout or deadlock victim.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use isoprobe_core::{AccountId, Error, LockMode, Result};
use parking_lot::{Condvar, Mutex};

/// Lock strength
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Compatible with other shared locks
    Shared,
    /// Compatible with nothing held by another transaction
    Exclusive,
}

impl LockKind {
    /// Lock a read with the given mode takes, if any
    pub fn for_mode(mode: LockMode) -> Option<LockKind> {
        match mode {
            LockMode::None => None,
            LockMode::ForShare => Some(LockKind::Shared),
            LockMode::ForUpdate => Some(LockKind::Exclusive),
        }
    }
}

#[derive(Debug, Default)]
struct RowLock {
    exclusive: Option<u64>,
    shared: HashSet<u64>,
}

impl RowLock {
    fn grantable(&self, txn_id: u64, kind: LockKind) -> bool {
        let exclusive_ok = self.exclusive.map_or(true, |owner| owner == txn_id);
        match kind {
            LockKind::Shared => exclusive_ok,
            // upgrade only when this transaction is the sole shared holder
            LockKind::Exclusive => exclusive_ok && self.shared.iter().all(|&t| t == txn_id),
        }
    }

    fn grant(&mut self, txn_id: u64, kind: LockKind) {
        match kind {
            LockKind::Shared => {
                if self.exclusive != Some(txn_id) {
                    self.shared.insert(txn_id);
                }
            }
            LockKind::Exclusive => {
                self.exclusive = Some(txn_id);
                self.shared.remove(&txn_id);
            }
        }
    }

    fn release(&mut self, txn_id: u64) {
        if self.exclusive == Some(txn_id) {
            self.exclusive = None;
        }
        self.shared.remove(&txn_id);
    }

    fn is_free(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }
}

/// Lock table shared by all transactions of one store
#[derive(Debug, Default)]
pub struct LockTable {
    rows: Mutex<HashMap<AccountId, RowLock>>,
    released: Condvar,
}

impl LockTable {
    /// Empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `kind` on `id` for `txn_id`, waiting up to `timeout`
    ///
    /// Re-acquiring a lock already held (or a weaker one) succeeds
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `Error::RetryableConflict` if the lock is not granted in time.
    pub fn acquire(
        &self,
        txn_id: u64,
        id: &AccountId,
        kind: LockKind,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut rows = self.rows.lock();
        loop {
            let lock = rows.entry(id.clone()).or_default();
            if lock.grantable(txn_id, kind) {
                lock.grant(txn_id, kind);
                return Ok(());
            }
            if self.released.wait_until(&mut rows, deadline).timed_out() {
                let lock = rows.entry(id.clone()).or_default();
                if lock.grantable(txn_id, kind) {
                    lock.grant(txn_id, kind);
                    return Ok(());
                }
                tracing::debug!(
                    target: "isoprobe::store",
                    txn_id,
                    account = %id,
                    ?kind,
                    "Lock wait timed out"
                );
                return Err(Error::conflict(format!(
                    "lock wait timeout on {} after {:?}",
                    id, timeout
                )));
            }
        }
    }

    /// Release every lock `txn_id` holds on `ids` and wake waiters
    pub fn release_all<'a, I>(&self, txn_id: u64, ids: I)
    where
        I: IntoIterator<Item = &'a AccountId>,
    {
        let mut rows = self.rows.lock();
        let mut released_any = false;
        for id in ids {
            if let Some(lock) = rows.get_mut(id) {
                lock.release(txn_id);
                released_any = true;
                if lock.is_free() {
                    rows.remove(id);
                }
            }
        }
        drop(rows);
        if released_any {
            self.released.notify_all();
        }
    }

    /// Number of rows with at least one holder
    pub fn locked_rows(&self) -> usize {
        self.rows.lock().len()
    }
}
