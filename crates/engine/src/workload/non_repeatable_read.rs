//! P2 non-repeatable read
//!
//! Read path: inside one transaction, read every target's balance
//! `repeated_reads` times; more than one distinct balance for an account is
//! an anomaly. Write path: increment every target's balance by 1.00.

use std::time::Duration;

use isoprobe_core::{Account, AccountId, Balance, Reporter, Result};

use super::{
    absorb_prevented, format_set, AnomalyLedger, ConsistencyCheck, Observations, Operation,
    OperationCounters, Verdict, Workload, WorkloadContext, WorkloadType,
};

/// Non-repeatable read workload
pub struct NonRepeatableRead {
    ctx: WorkloadContext,
    accounts: Vec<Account>,
    ledger: AnomalyLedger<AccountId, Balance>,
    counters: OperationCounters,
}

impl NonRepeatableRead {
    /// New workload over `ctx`
    pub fn new(ctx: WorkloadContext) -> Self {
        NonRepeatableRead {
            ctx,
            accounts: Vec::new(),
            ledger: AnomalyLedger::new(),
            counters: OperationCounters::new(),
        }
    }

    /// Anomalies recorded so far
    pub fn ledger(&self) -> &AnomalyLedger<AccountId, Balance> {
        &self.ledger
    }

    fn read_rows(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let mut observations = Observations::new();
        let lock = self.ctx.lock_mode();
        let repeated = self.ctx.repeated_reads();

        self.ctx.transaction_wrapper().execute(
            |txn| {
                // retries start from an empty buffer
                observations.clear();
                for target in &self.accounts {
                    for _ in 0..repeated {
                        let account = txn.find_by_id(&target.id, lock)?;
                        observations.observe(target.id.clone(), account.balance);
                    }
                }
                Ok(())
            },
            |d| durations.extend(d),
        )?;

        self.ledger.record_disagreements(&observations);
        Ok(())
    }

    fn write_rows(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let lock = self.ctx.lock_mode();

        let result = self.ctx.transaction_wrapper().execute(
            |txn| {
                for target in &self.accounts {
                    let account = txn.find_by_id(&target.id, lock)?;
                    self.ctx
                        .write_balance(txn, &account.add_balance(Balance::from_units(1)))?;
                }
                Ok(())
            },
            |d| durations.extend(d),
        );
        absorb_prevented(result, &self.counters)?;
        Ok(())
    }
}

impl Workload for NonRepeatableRead {
    fn kind(&self) -> WorkloadType {
        WorkloadType::NonRepeatableRead
    }

    fn before_all_executions(&mut self) -> Result<()> {
        self.accounts = self.ctx.find_target_accounts()?;
        Ok(())
    }

    fn execute_once(&self, durations: &mut Vec<Duration>) -> Result<()> {
        if self.ctx.takes_read_path() {
            self.counters.incr(Operation::Read);
            self.read_rows(durations)
        } else {
            self.counters.incr(Operation::Write);
            self.write_rows(durations)
        }
    }

    fn after_all_executions(&self, reporter: &mut dyn Reporter) -> Result<Verdict> {
        let findings = self
            .ledger
            .snapshot()
            .into_iter()
            .map(|(id, balances)| {
                format!(
                    "Observed non-repeatable values for key {}: {}",
                    id,
                    format_set(balances)
                )
            })
            .collect();

        Ok(ConsistencyCheck {
            kind: self.kind(),
            findings,
            counters: &self.counters,
            operations: &[Operation::Read, Operation::Write, Operation::Prevented],
            subject: "accounts with non-repeatable reads",
            clean_hint: "To observe anomalies, try read-committed without locking (ex: --isolation rc)",
            anomaly_hint: "To avoid anomalies, try read-committed with locking or repeatable-read or higher isolation (ex: --lock for_share)",
        }
        .report(reporter))
    }
}
