//! Operation counters
//!
//! Atomic counters per operation class, incremented by workers and read once
//! at report time. Relaxed ordering is enough: the counters synchronize
//! nothing, and the final read happens after the worker-join barrier.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operation class counted by a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read-path execution
    Read,
    /// Write-path execution
    Write,
    /// Predicate select execution
    Select,
    /// Row insert execution
    Insert,
    /// Row delete execution
    Delete,
    /// Withdrawal from a constrained pair
    Withdraw,
    /// Deposit into a constrained pair
    Deposit,
    /// Compare-and-swap update rejected (lost update prevented)
    Prevented,
}

impl Operation {
    /// Every operation class
    pub const ALL: [Operation; 8] = [
        Operation::Read,
        Operation::Write,
        Operation::Select,
        Operation::Insert,
        Operation::Delete,
        Operation::Withdraw,
        Operation::Deposit,
        Operation::Prevented,
    ];

    /// Report label
    pub fn label(self) -> &'static str {
        match self {
            Operation::Read => "Total reads",
            Operation::Write => "Total writes",
            Operation::Select => "Total selects",
            Operation::Insert => "Total inserts",
            Operation::Delete => "Total deletes",
            Operation::Withdraw => "Total withdrawals",
            Operation::Deposit => "Total deposits",
            Operation::Prevented => "Total prevented (CAS)",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One atomic counter per `Operation`
#[derive(Debug, Default)]
pub struct OperationCounters {
    counts: [AtomicU64; 8],
}

impl OperationCounters {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `op` by one
    pub fn incr(&self, op: Operation) {
        self.counts[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of `op`
    pub fn get(&self, op: Operation) -> u64 {
        self.counts[op.index()].load(Ordering::Relaxed)
    }

    /// Values of `ops`, in the given order
    pub fn snapshot(&self, ops: &[Operation]) -> Vec<(Operation, u64)> {
        ops.iter().map(|&op| (op, self.get(op))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_independent() {
        let counters = OperationCounters::new();
        counters.incr(Operation::Read);
        counters.incr(Operation::Read);
        counters.incr(Operation::Prevented);
        assert_eq!(counters.get(Operation::Read), 2);
        assert_eq!(counters.get(Operation::Prevented), 1);
        assert_eq!(counters.get(Operation::Write), 0);
        assert_eq!(
            counters.snapshot(&[Operation::Prevented, Operation::Read]),
            vec![(Operation::Prevented, 1), (Operation::Read, 2)]
        );
    }

    #[test]
    fn test_concurrent_increments_not_lost() {
        let counters = Arc::new(OperationCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.incr(Operation::Write);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counters.get(Operation::Write), 8000);
    }

    #[test]
    fn test_all_indices_in_range() {
        let counters = OperationCounters::new();
        for op in Operation::ALL {
            counters.incr(op);
            assert_eq!(counters.get(op), 1);
        }
    }
}
