//! A5A read skew
//!
//! Targets are paired; transfers only move money within a pair, so every
//! pair sum is invariant. Read path: inside one transaction, read each
//! pair's sum `repeated_reads` times, each sum being two separate
//! single-row reads. More than one distinct sum within the transaction is
//! an anomaly, recorded under the pair's first account. Drift of the
//! committed sum between transactions is not read skew and is not checked.

use std::collections::BTreeMap;
use std::time::Duration;

use isoprobe_core::{Account, AccountId, Balance, Reporter, Result};
use rand::Rng;

use super::{
    absorb_prevented, format_set, pair_up, random_amount, require_found, require_targets,
    AnomalyLedger, ConsistencyCheck, Observations, Operation, OperationCounters, Verdict,
    Workload, WorkloadContext, WorkloadType,
};

/// Read skew workload
pub struct ReadSkew {
    ctx: WorkloadContext,
    pairs: Vec<(Account, Account)>,
    /// Opening sum per pair, keyed by the pair's first account
    opening: BTreeMap<AccountId, Balance>,
    ledger: AnomalyLedger<AccountId, Balance>,
    counters: OperationCounters,
}

impl ReadSkew {
    /// New workload over `ctx`
    pub fn new(ctx: WorkloadContext) -> Self {
        ReadSkew {
            ctx,
            pairs: Vec::new(),
            opening: BTreeMap::new(),
            ledger: AnomalyLedger::new(),
            counters: OperationCounters::new(),
        }
    }

    /// Anomalies recorded so far, keyed by the first account of each pair
    pub fn ledger(&self) -> &AnomalyLedger<AccountId, Balance> {
        &self.ledger
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
                        let a = txn.find_by_id(&first.id, lock)?;
                        let b = txn.find_by_id(&second.id, lock)?;
                        observations.observe(first.id.clone(), a.balance + b.balance);
                    }
                }
                Ok(())
            },
            |d| durations.extend(d),
        )?;

        self.ledger.record_disagreements(&observations);
        Ok(())
    }

    fn transfer_within_pair(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let mut rng = rand::thread_rng();
        let (first, second) = &self.pairs[rng.gen_range(0..self.pairs.len())];
        let (from, to) = if rng.gen::<bool>() {
            (&first.id, &second.id)
        } else {
            (&second.id, &first.id)
        };
        let amount = random_amount();
        let lock = self.ctx.lock_mode();

        let result = self.ctx.transaction_wrapper().execute(
            |txn| {
                let source = txn.find_by_id(from, lock)?;
                let target = txn.find_by_id(to, lock)?;
                self.ctx.write_balance(txn, &source.add_balance(-amount))?;
                self.ctx.write_balance(txn, &target.add_balance(amount))?;
                Ok(())
            },
            |d| durations.extend(d),
        );
        absorb_prevented(result, &self.counters)?;
        Ok(())
    }
}

impl Workload for ReadSkew {
    fn kind(&self) -> WorkloadType {
        WorkloadType::ReadSkew
    }

    fn pre_validate(&self) -> Result<()> {
        require_targets(&self.ctx.settings, 2, "read_skew")
    }

    fn before_all_executions(&mut self) -> Result<()> {
        let accounts = self.ctx.find_target_accounts()?;
        require_found(&accounts, 2, "read_skew")?;
        self.pairs = pair_up(&accounts);
        self.opening = self
            .pairs
            .iter()
            .map(|(a, b)| (a.id.clone(), a.balance + b.balance))
            .collect();
        if accounts.len() % 2 == 1 {
            tracing::warn!(
                target: "isoprobe::workload",
                targets = accounts.len(),
                "Odd target count, last account left unpaired"
            );
        }
        Ok(())
    }

    fn execute_once(&self, durations: &mut Vec<Duration>) -> Result<()> {
        if self.ctx.takes_read_path() {
            self.counters.incr(Operation::Read);
            self.read_sums(durations)
        } else {
            self.counters.incr(Operation::Write);
            self.transfer_within_pair(durations)
        }
    }

    fn after_all_executions(&self, reporter: &mut dyn Reporter) -> Result<Verdict> {
        let findings = self
            .ledger
            .snapshot()
            .into_iter()
            .map(|(id, sums)| {
                format!(
                    "Observed read skew for pair starting at {} (opening sum {}): {}",
                    id,
                    self.opening.get(&id).copied().unwrap_or(Balance::ZERO),
                    format_set(sums)
                )
            })
            .collect();

        Ok(ConsistencyCheck {
            kind: self.kind(),
            findings,
            counters: &self.counters,
            operations: &[Operation::Read, Operation::Write, Operation::Prevented],
            subject: "account pairs with read skew",
            clean_hint: "To observe anomalies, try read-committed without locking (ex: --isolation rc)",
            anomaly_hint: "To avoid anomalies, try read-committed with --sfu or repeatable-read or higher isolation (ex: --isolation rr)",
        }
        .report(reporter))
    }
}
