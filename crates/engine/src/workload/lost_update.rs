//! P4 lost update
//!
//! Write path: transfer a random amount between two random targets, reading
//! both rows (with the configured lock mode) and writing both balances
//! (plain or compare-and-swap). Each committed transfer is booked into the
//! expected per-account deltas. Read path: read all targets in one
//! transaction.
//!
//! Teardown re-reads every target; a balance that differs from its opening
//! balance plus the committed deltas lost an update.

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use isoprobe_core::{Account, AccountId, Balance, Reporter, Result, Settings};
use rand::seq::index::sample;

use super::{
    absorb_prevented, random_amount, require_found, require_targets, AnomalyLedger,
    ConsistencyCheck, Operation, OperationCounters, Verdict, Workload, WorkloadContext,
    WorkloadType,
};

/// Lost update workload
pub struct LostUpdate {
    ctx: WorkloadContext,
    accounts: Vec<Account>,
    opening: BTreeMap<AccountId, Balance>,
    /// Net effect of every committed transfer, per account
    deltas: DashMap<AccountId, Balance>,
    ledger: AnomalyLedger<AccountId, Balance>,
    counters: OperationCounters,
}

impl LostUpdate {
    /// New workload over `ctx`
    pub fn new(ctx: WorkloadContext) -> Self {
        LostUpdate {
            ctx,
            accounts: Vec::new(),
            opening: BTreeMap::new(),
            deltas: DashMap::new(),
            ledger: AnomalyLedger::new(),
            counters: OperationCounters::new(),
        }
    }

    /// Anomalies recorded at teardown: `{expected, actual}` per account
    pub fn ledger(&self) -> &AnomalyLedger<AccountId, Balance> {
        &self.ledger
    }

    fn book(&self, id: &AccountId, delta: Balance) {
        *self.deltas.entry(id.clone()).or_insert(Balance::ZERO) += delta;
    }

    fn transfer(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let picked = sample(&mut rand::thread_rng(), self.accounts.len(), 2);
        let from = self.accounts[picked.index(0)].id.clone();
        let to = self.accounts[picked.index(1)].id.clone();
        let amount = random_amount();
        let lock = self.ctx.lock_mode();

        let result = self.ctx.transaction_wrapper().execute(
            |txn| {
                let source = txn.find_by_id(&from, lock)?;
                let target = txn.find_by_id(&to, lock)?;
                self.ctx.write_balance(txn, &source.add_balance(-amount))?;
                self.ctx.write_balance(txn, &target.add_balance(amount))?;
                Ok(())
            },
            |d| durations.extend(d),
        );

        if absorb_prevented(result, &self.counters)?.is_some() {
            self.book(&from, -amount);
            self.book(&to, amount);
        }
        Ok(())
    }

    fn read_all(&self, durations: &mut Vec<Duration>) -> Result<()> {
        let lock = self.ctx.lock_mode();
        self.ctx.transaction_wrapper().execute(
            |txn| {
                for target in &self.accounts {
                    txn.find_by_id(&target.id, lock)?;
                }
                Ok(())
            },
            |d| durations.extend(d),
        )?;
        Ok(())
    }

    /// Compare committed balances with the booked deltas; returns one
    /// finding per drifted account
    fn verify_balances(&self) -> Result<Vec<String>> {
        let ids: Vec<AccountId> = self.opening.keys().cloned().collect();
        let mut findings = Vec::new();
        for account in self.ctx.read_committed(&ids)? {
            let opening = self.opening.get(&account.id).copied().unwrap_or(Balance::ZERO);
            let delta = self
                .deltas
                .get(&account.id)
                .map(|d| *d.value())
                .unwrap_or(Balance::ZERO);
            let expected = opening + delta;
            if account.balance != expected {
                findings.push(format!(
                    "Observed lost update for key {}: expected {}, found {}",
                    account.id, expected, account.balance
                ));
                self.ledger.record(account.id.clone(), [expected, account.balance]);
            }
        }
        Ok(findings)
    }
}

fn validate(settings: &Settings) -> Result<()> {
    require_targets(settings, 2, "lost_update")
}

impl Workload for LostUpdate {
    fn kind(&self) -> WorkloadType {
        WorkloadType::LostUpdate
    }

    fn pre_validate(&self) -> Result<()> {
        validate(&self.ctx.settings)
    }

    fn before_all_executions(&mut self) -> Result<()> {
        self.accounts = self.ctx.find_target_accounts()?;
        require_found(&self.accounts, 2, "lost_update")?;
        self.opening = self
            .accounts
            .iter()
            .map(|a| (a.id.clone(), a.balance))
            .collect();
        self.deltas.clear();
        Ok(())
    }

    fn execute_once(&self, durations: &mut Vec<Duration>) -> Result<()> {
        if self.ctx.takes_read_path() {
            self.counters.incr(Operation::Read);
            self.read_all(durations)
        } else {
            self.counters.incr(Operation::Write);
            self.transfer(durations)
        }
    }

    fn after_all_executions(&self, reporter: &mut dyn Reporter) -> Result<Verdict> {
        let findings = self.verify_balances()?;

        Ok(ConsistencyCheck {
            kind: self.kind(),
            findings,
            counters: &self.counters,
            operations: &[Operation::Read, Operation::Write, Operation::Prevented],
            subject: "accounts with lost updates",
            clean_hint: "To observe anomalies, try read-committed without locking or CAS (ex: --isolation rc)",
            anomaly_hint: "To avoid anomalies, try --sfu or --cas, or repeatable-read or higher isolation (ex: --isolation rr)",
        }
        .report(reporter))
    }
}
