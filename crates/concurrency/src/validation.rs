//! Commit-time validation for serializable transactions
//!
//! A serializable transaction that wrote something may only commit if
//! nothing it observed has changed since its snapshot:
//! - every row it read by id still carries the version it saw
//! - no row in a group it scanned was inserted, updated or deleted
//!
//! Read-only transactions always commit; their snapshot is already a
//! consistent serial point.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use isoprobe_core::AccountId;

use crate::store::VersionedRows;

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Row was read at one version but the current version differs
    ReadWriteConflict {
        /// Row that changed
        id: AccountId,
        /// Version recorded when read (0 = absent)
        read_version: u64,
        /// Current version at validation time
        current_version: u64,
    },

    /// A group scanned by the transaction gained, lost or changed a row
    PredicateConflict {
        /// Scanned group
        group: i64,
        /// Snapshot the scan was evaluated at
        snapshot_version: u64,
    },
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                id,
                read_version,
                current_version,
            } => write!(
                f,
                "{} read at version {} but is now at {}",
                id, read_version, current_version
            ),
            ConflictType::PredicateConflict {
                group,
                snapshot_version,
            } => write!(
                f,
                "group {} changed after snapshot {}",
                group, snapshot_version
            ),
        }
    }
}

/// Result of transaction validation
///
/// A transaction commits only if `is_valid()` returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Successful validation result (no conflicts)
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Store-style reason message for the first conflict
    pub fn reason(&self) -> String {
        match self.conflicts.first() {
            Some(first) => format!(
                "could not serialize access due to read/write dependencies ({})",
                first
            ),
            None => String::new(),
        }
    }
}

/// Validate a serializable transaction's reads against current storage
///
/// Callers must hold the row-store write lock for the duration of the
/// check and the subsequent apply.
pub fn validate_transaction(
    read_set: &HashMap<AccountId, u64>,
    scanned_groups: &BTreeSet<i64>,
    snapshot_version: u64,
    rows: &VersionedRows,
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    for (id, &read_version) in read_set {
        let current_version = rows.latest_version(id);
        if current_version != read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                id: id.clone(),
                read_version,
                current_version,
            });
        }
    }

    for &group in scanned_groups {
        if rows.group_modified_after(group, snapshot_version) {
            result.conflicts.push(ConflictType::PredicateConflict {
                group,
                snapshot_version,
            });
        }
    }

    result
}
