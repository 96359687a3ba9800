//! A5B write skew
//!
//! Targets are paired under the constraint `a + b >= 0`. Withdrawals check
//! the constraint by reading both rows and then take the full pair sum out
//! of one member only; two concurrent withdrawals against different members
//! can both pass the check and drive the sum negative. Deposits add a
//! random amount to one member.
//!
//! With optimistic locking the untouched sibling is compare-and-swap
//! written with its unchanged balance, which turns the read dependency into
//! a write conflict.
//!
//! Read path: re-read each pair's sum `repeated_reads` times; negative sums
//! are anomalies. Teardown additionally checks the committed sums.

use std::time::Duration;

use isoprobe_core::{AccountId, Balance, Reporter, Result};
use rand::Rng;

use super::{
    absorb_prevented, format_set, pair_up, random_amount, require_found, require_targets,
    AnomalyLedger, ConsistencyCheck, Observations, Operation, OperationCounters, Verdict,
    Workload, WorkloadContext, WorkloadType,
};

/// Write skew workload
pub struct WriteSkew {
    ctx: WorkloadContext,
    pairs: Vec<(AccountId, AccountId)>,
    ledger: AnomalyLedger<AccountId, Balance>,
    counters: OperationCounters,
}

impl WriteSkew {
    /// New workload over `ctx`
    pub fn new(ctx: WorkloadContext) -> Self {
        WriteSkew {
            ctx,
            pairs: Vec::new(),
            ledger: AnomalyLedger::new(),
            counters: OperationCounters::new(),
        }
    }

    /// Negative pair sums recorded so far, keyed by the first account
    pub fn ledger(&self) -> &AnomalyLedger<AccountId, Balance> {
        &self.ledger
    }

    fn random_pair(&self) -> (&AccountId, &AccountId, bool) {
        let mut rng = rand::thread_rng();
        let (first, second) = &self.pairs[rng.gen_range(0..self.pairs.len())];
        (first, second, rng.gen::<bool>())
    }

    fn withdraw(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let (first, second, pick_first) = self.random_pair();
        let lock = self.ctx.lock_mode();
        let optimistic = self.ctx.settings.optimistic_locking;

        let result = self.ctx.transaction_wrapper().execute(
            |txn| {
                let a = txn.find_by_id(first, lock)?;
                let b = txn.find_by_id(second, lock)?;
                let sum = a.balance + b.balance;
                if !sum.is_positive() {
                    return Ok(());
                }
                let (drained, sibling) = if pick_first { (a, b) } else { (b, a) };
                self.ctx.write_balance(txn, &drained.add_balance(-sum))?;
                if optimistic {
                    txn.update_balance_cas(&sibling)?;
                }
                Ok(())
            },
            |d| durations.extend(d),
        );
        absorb_prevented(result, &self.counters)?;
        Ok(())
    }

    fn deposit(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let (first, second, pick_first) = self.random_pair();
        let member = if pick_first { first } else { second };
        let amount = random_amount();
        let lock = self.ctx.lock_mode();

        let result = self.ctx.transaction_wrapper().execute(
            |txn| {
                let account = txn.find_by_id(member, lock)?;
                self.ctx.write_balance(txn, &account.add_balance(amount))
            },
            |d| durations.extend(d),
        );
        absorb_prevented(result, &self.counters)?;
        Ok(())
    }

    fn read_sums(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let mut observations = Observations::new();
        let lock = self.ctx.lock_mode();
        let repeated = self.ctx.repeated_reads();

        self.ctx.transaction_wrapper().execute(
            |txn| {
                observations.clear();
                for (first, second) in &self.pairs {
                    for _ in 0..repeated {
                        let a = txn.find_by_id(first, lock)?;
                        let b = txn.find_by_id(second, lock)?;
                        observations.observe(first.clone(), a.balance + b.balance);
                    }
                }
                Ok(())
            },
            |d| durations.extend(d),
        )?;

        for (id, negative) in observations.violations(|sum| !sum.is_negative()) {
            self.ledger.record(id, negative);
        }
        Ok(())
    }

    fn verify_committed_sums(&self) -> Result<()> {
        let ids: Vec<AccountId> = self
            .pairs
            .iter()
            .flat_map(|(a, b)| [a.clone(), b.clone()])
            .collect();
        let accounts = self.ctx.read_committed(&ids)?;
        for pair in accounts.chunks_exact(2) {
            let sum = pair[0].balance + pair[1].balance;
            if sum.is_negative() {
                self.ledger.record(pair[0].id.clone(), [sum]);
            }
        }
        Ok(())
    }
}

impl Workload for WriteSkew {
    fn kind(&self) -> WorkloadType {
        WorkloadType::WriteSkew
    }

    fn pre_validate(&self) -> Result<()> {
        require_targets(&self.ctx.settings, 2, "write_skew")
    }

    fn before_all_executions(&mut self) -> Result<()> {
        let accounts = self.ctx.find_target_accounts()?;
        require_found(&accounts, 2, "write_skew")?;
        self.pairs = pair_up(&accounts)
            .into_iter()
            .map(|(a, b)| (a.id, b.id))
            .collect();
        Ok(())
    }

    fn execute_once(&self, durations: &mut Vec<Duration>) -> Result<()> {
        if self.ctx.takes_read_path() {
            self.counters.incr(Operation::Read);
            return self.read_sums(durations);
        }
        if self.ctx.takes_first_write_path() {
            self.counters.incr(Operation::Withdraw);
            return self.withdraw(durations);
        }
        self.counters.incr(Operation::Deposit);
        self.deposit(durations)
    }

    fn after_all_executions(&self, reporter: &mut dyn Reporter) -> Result<Verdict> {
        self.verify_committed_sums()?;

        let findings = self
            .ledger
            .snapshot()
            .into_iter()
            .map(|(id, sums)| {
                format!(
                    "Observed negative sums for pair starting at {}: {}",
                    id,
                    format_set(sums)
                )
            })
            .collect();

        Ok(ConsistencyCheck {
            kind: self.kind(),
            findings,
            counters: &self.counters,
            operations: &[
                Operation::Read,
                Operation::Withdraw,
                Operation::Deposit,
                Operation::Prevented,
            ],
            subject: "account pairs with write skew",
            clean_hint: "To observe anomalies, try repeatable-read without CAS (ex: --isolation rr)",
            anomaly_hint: "To avoid anomalies, try --cas or serializable isolation (ex: --isolation serializable)",
        }
        .report(reporter))
    }
}
