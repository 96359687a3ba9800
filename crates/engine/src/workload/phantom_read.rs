//! P3 phantom read
//!
//! Read path: inside one transaction, count the rows of every target's group
//! `repeated_reads` times; more than one distinct count for a group is an
//! anomaly. Write paths, split by `write_split`: insert a sibling row into
//! every target group, or delete every target row.

use std::time::Duration;

use isoprobe_core::{Account, AccountId, Balance, Reporter, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::{
    format_set, AnomalyLedger, ConsistencyCheck, Observations, Operation, OperationCounters,
    Verdict, Workload, WorkloadContext, WorkloadType,
};

const SIBLING_NAME: &str = "New Type";

/// Phantom read workload
pub struct PhantomRead {
    ctx: WorkloadContext,
    accounts: Vec<Account>,
    ledger: AnomalyLedger<i64, usize>,
    counters: OperationCounters,
}

fn random_discriminator() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

impl PhantomRead {
    /// New workload over `ctx`
    pub fn new(ctx: WorkloadContext) -> Self {
        PhantomRead {
            ctx,
            accounts: Vec::new(),
            ledger: AnomalyLedger::new(),
            counters: OperationCounters::new(),
        }
    }

    /// Anomalies recorded so far, keyed by group
    pub fn ledger(&self) -> &AnomalyLedger<i64, usize> {
        &self.ledger
    }

    fn select_rows(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let mut observations = Observations::new();
        let lock = self.ctx.lock_mode();
        let repeated = self.ctx.repeated_reads();

        self.ctx.transaction_wrapper().execute(
            |txn| {
                observations.clear();
                for target in &self.accounts {
                    let group = target.id.group;
                    for _ in 0..repeated {
                        let rows = txn.find_accounts_by_group(group, lock)?;
                        observations.observe(group, rows.len());
                    }
                }
                Ok(())
            },
            |d| durations.extend(d),
        )?;

        self.ledger.record_disagreements(&observations);
        Ok(())
    }

    fn create_rows(&self, durations: &mut Vec<Duration>) -> Result<()> {
        self.ctx.transaction_wrapper().execute(
            |txn| {
                for target in &self.accounts {
                    let sibling = Account::new(
                        AccountId::new(target.id.group, random_discriminator()),
                        Balance::from_units(10),
                        SIBLING_NAME,
                    );
                    txn.create_account(&sibling)?;
                }
                Ok(())
            },
            |d| durations.extend(d),
        )?;
        Ok(())
    }

    fn delete_rows(&self, durations: &mut Vec<Duration>) -> Result<()> {
        self.ctx.transaction_wrapper().execute(
            |txn| {
                for target in &self.accounts {
                    txn.delete_account(&target.id)?;
                }
                Ok(())
            },
            |d| durations.extend(d),
        )?;
        Ok(())
    }
}

impl Workload for PhantomRead {
    fn kind(&self) -> WorkloadType {
        WorkloadType::PhantomRead
    }

    fn before_all_executions(&mut self) -> Result<()> {
        self.accounts = self.ctx.find_target_accounts()?;
        Ok(())
    }

    fn execute_once(&self, durations: &mut Vec<Duration>) -> Result<()> {
        if self.ctx.takes_read_path() {
            self.counters.incr(Operation::Select);
            return self.select_rows(durations);
        }
        if self.ctx.takes_first_write_path() {
            self.counters.incr(Operation::Insert);
            return self.create_rows(durations);
        }
        self.counters.incr(Operation::Delete);
        self.delete_rows(durations)
    }

    fn after_all_executions(&self, reporter: &mut dyn Reporter) -> Result<Verdict> {
        let findings = self
            .ledger
            .snapshot()
            .into_iter()
            .map(|(group, counts)| {
                format!(
                    "Observed phantom values for key {}: {}",
                    group,
                    format_set(counts)
                )
            })
            .collect();

        Ok(ConsistencyCheck {
            kind: self.kind(),
            findings,
            counters: &self.counters,
            operations: &[Operation::Select, Operation::Insert, Operation::Delete],
            subject: "accounts returning phantom reads",
            clean_hint: "To observe anomalies, try read-committed without locking (ex: --isolation rc)",
            anomaly_hint: "To avoid anomalies, try repeatable-read or higher isolation (ex: --isolation rr)",
        }
        .report(reporter))
    }
}
