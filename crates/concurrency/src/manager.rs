//! Transaction manager: version and id allocation
//!
//! The global version counter is incremented once per committed write
//! transaction; every row written by that transaction carries the same
//! version. Snapshot transactions register the version they read at so that
//! old row versions they may still need are not pruned.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Allocates commit versions and transaction ids, tracks live snapshots
pub struct TransactionManager {
    /// Global version counter
    ///
    /// Monotonically increasing. Each committed write transaction increments by 1.
    version: AtomicU64,

    /// Next transaction ID
    next_txn_id: AtomicU64,

    /// Snapshot version -> number of live transactions reading at it
    snapshots: Mutex<BTreeMap<u64, usize>>,
}

impl TransactionManager {
    /// Create a manager starting at `initial_version`
    pub fn new(initial_version: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(1),
            snapshots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Get current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate next commit version (increment global version)
    ///
    /// Callers must hold the row-store write lock so that versions become
    /// visible in allocation order.
    pub fn allocate_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a live snapshot at `version`
    pub fn register_snapshot(&self, version: u64) {
        *self.snapshots.lock().entry(version).or_insert(0) += 1;
    }

    /// Release a snapshot previously registered at `version`
    pub fn release_snapshot(&self, version: u64) {
        let mut snapshots = self.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&version);
            }
        }
    }

    /// Oldest version any live snapshot may read; row versions older than
    /// the newest one at or below the horizon are unreachable
    pub fn horizon(&self) -> u64 {
        self.snapshots
            .lock()
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.current_version())
    }

    /// Number of live snapshots
    pub fn live_snapshots(&self) -> usize {
        self.snapshots.lock().values().sum()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(0)
    }
}
