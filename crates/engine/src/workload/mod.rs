//! Anomaly workloads
//!
//! Every variant follows the same lifecycle, driven by the runner:
//!
//! ```text
//! pre_validate()            settings sanity check, no store access
//! before_all_executions()   select the fixed target set (single-threaded)
//! execute_once() x N        concurrent; read path or a write path per call
//! after_all_executions()    drain ledger, report counters, return verdict
//! ```
//!
//! The variants share the disagreement detector (`Observations` +
//! `AnomalyLedger`) and the operation counters rather than a base type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use isoprobe_core::{
    Account, AccountId, Balance, Database, Error, LockMode, Reporter, Result, Settings,
    Transaction,
};
use rand::Rng;
use serde::Serialize;

use crate::transaction::TransactionWrapper;

mod counters;
mod detector;
mod kind;
mod lost_update;
mod non_repeatable_read;
mod phantom_read;
mod read_skew;
mod write_skew;

pub use counters::{Operation, OperationCounters};
pub use detector::{AnomalyLedger, Observations};
pub use kind::WorkloadType;
pub use lost_update::LostUpdate;
pub use non_repeatable_read::NonRepeatableRead;
pub use phantom_read::PhantomRead;
pub use read_skew::ReadSkew;
pub use write_skew::WriteSkew;

/// One anomaly scenario
///
/// Thread safety: `execute_once` is called concurrently by every worker,
/// so all state it mutates must be concurrency-safe (ledger, counters).
pub trait Workload: Send + Sync {
    /// Variant of this workload
    fn kind(&self) -> WorkloadType;

    /// Sanity-check settings before any execution; no store access
    fn pre_validate(&self) -> Result<()> {
        Ok(())
    }

    /// One-time setup before workers start
    fn before_all_executions(&mut self) -> Result<()>;

    /// One execution; appends the duration of every transaction attempt it
    /// made to `durations`, also when it fails
    ///
    /// # Errors
    ///
    /// Fatal store errors propagate and end the calling worker.
    fn execute_once(&self, durations: &mut Vec<Duration>) -> Result<()>;

    /// One-time teardown after all workers joined: report and decide
    fn after_all_executions(&self, reporter: &mut dyn Reporter) -> Result<Verdict>;
}

/// Outcome of one workload run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Workload that produced the verdict
    pub workload: WorkloadType,
    /// Number of ledger keys with recorded anomalies
    pub anomalies: usize,
    /// Compare-and-swap updates rejected (lost updates prevented)
    pub prevented: u64,
    /// Reported operation counters
    pub operations: Vec<(Operation, u64)>,
}

impl Verdict {
    /// True if no anomaly was observed
    pub fn is_clean(&self) -> bool {
        self.anomalies == 0
    }
}

/// Shared dependencies of every workload
#[derive(Clone)]
pub struct WorkloadContext {
    /// Store under test
    pub db: Arc<dyn Database>,
    /// Run settings
    pub settings: Arc<Settings>,
}

impl WorkloadContext {
    /// Bundle a store and settings
    pub fn new(db: Arc<dyn Database>, settings: Settings) -> Self {
        WorkloadContext {
            db,
            settings: Arc::new(settings),
        }
    }

    /// Wrapper configured with the run's isolation level and retry policy
    pub fn transaction_wrapper(&self) -> TransactionWrapper<'_> {
        TransactionWrapper::new(
            self.db.as_ref(),
            self.settings.isolation,
            self.settings.retry.clone(),
        )
    }

    /// Row lock mode for reads
    pub fn lock_mode(&self) -> LockMode {
        self.settings.lock_mode
    }

    /// Number of repeated reads per observed key
    pub fn repeated_reads(&self) -> usize {
        self.settings.repeated_reads
    }

    /// Per-call draw: true selects the read path
    pub fn takes_read_path(&self) -> bool {
        rand::thread_rng().gen::<f64>() < self.settings.read_write_ratio
    }

    /// Per-call draw among write paths: true selects the first one
    pub fn takes_first_write_path(&self) -> bool {
        rand::thread_rng().gen::<f64>() < self.settings.write_split
    }

    /// Fixed target set for this run
    pub fn find_target_accounts(&self) -> Result<Vec<Account>> {
        self.db.find_target_accounts(&self.settings.selection)
    }

    /// Write `account`'s balance, plain or compare-and-swap per settings
    pub fn write_balance(&self, txn: &mut dyn Transaction, account: &Account) -> Result<()> {
        if self.settings.optimistic_locking {
            txn.update_balance_cas(account)
        } else {
            txn.update_balance(account)
        }
    }

    /// Read every target by id in one transaction, outside the measured
    /// workload, at read committed
    pub(crate) fn read_committed(&self, ids: &[AccountId]) -> Result<Vec<Account>> {
        let wrapper = TransactionWrapper::new(
            self.db.as_ref(),
            isoprobe_core::IsolationLevel::ReadCommitted,
            self.settings.retry.clone(),
        );
        wrapper.execute(
            |txn| {
                ids.iter()
                    .map(|id| txn.find_by_id(id, LockMode::None))
                    .collect()
            },
            |_| {},
        )
    }
}

/// Absorb a compare-and-swap rejection: the transaction was rolled back,
/// the protection worked, count it and carry on
pub(crate) fn absorb_prevented<T>(
    result: Result<T>,
    counters: &OperationCounters,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::OptimisticPrecondition {
            id,
            expected_version,
            found_version,
        }) => {
            counters.incr(Operation::Prevented);
            tracing::debug!(
                target: "isoprobe::workload",
                account = %id,
                expected_version,
                found_version,
                "Lost update prevented"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Random transfer amount in [0.01, 100.00]
pub(crate) fn random_amount() -> Balance {
    Balance::from_cents(rand::thread_rng().gen_range(1..=10_000))
}

/// Fixed pairs of targets (first, second); an odd last target is unused
pub(crate) fn pair_up(accounts: &[Account]) -> Vec<(Account, Account)> {
    accounts
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

/// Require at least `needed` target accounts
pub(crate) fn require_targets(settings: &Settings, needed: usize, what: &str) -> Result<()> {
    if settings.selection.count < needed {
        return Err(Error::InvalidConfig(format!(
            "{} requires at least {} target accounts, selection count is {}",
            what, needed, settings.selection.count
        )));
    }
    Ok(())
}

/// Require the store to have returned at least `needed` targets
pub(crate) fn require_found(accounts: &[Account], needed: usize, what: &str) -> Result<()> {
    if accounts.len() < needed {
        return Err(Error::InvalidConfig(format!(
            "{} requires at least {} target accounts, store returned {}",
            what,
            needed,
            accounts.len()
        )));
    }
    Ok(())
}

/// Standard "Consistency Check" report shared by all variants
pub(crate) struct ConsistencyCheck<'a> {
    pub kind: WorkloadType,
    pub findings: Vec<String>,
    pub counters: &'a OperationCounters,
    pub operations: &'a [Operation],
    /// Summary line when anomalies were found, e.g. "accounts with lost updates"
    pub subject: &'a str,
    pub clean_hint: &'a str,
    pub anomaly_hint: &'a str,
}

impl ConsistencyCheck<'_> {
    pub(crate) fn report(self, reporter: &mut dyn Reporter) -> Verdict {
        reporter.header("Consistency Check");

        for finding in &self.findings {
            reporter.error(finding);
        }

        let operations = self.counters.snapshot(self.operations);
        for (op, count) in &operations {
            reporter.print_left(op.label(), &count.to_string());
        }
        let prevented = self.counters.get(Operation::Prevented);

        if self.findings.is_empty() {
            reporter.info(&format!("You are good! {}", HAPPY));
            reporter.info(self.clean_hint);
        } else {
            reporter.error(&format!(
                "Observed {} {}! {}",
                self.findings.len(),
                self.subject,
                FLIP_TABLE
            ));
            reporter.info(self.anomaly_hint);
        }

        Verdict {
            workload: self.kind,
            anomalies: self.findings.len(),
            prevented,
            operations,
        }
    }
}

const HAPPY: &str = "ʕ•ᴥ•ʔ";
const FLIP_TABLE: &str = "(╯°□°)╯︵ ┻━┻";

/// `[a, b, c]` rendering of an ordered value set
pub(crate) fn format_set<V: fmt::Display>(values: impl IntoIterator<Item = V>) -> String {
    let rendered: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}
