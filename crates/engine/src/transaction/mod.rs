//! Transaction wrapper with retry and per-attempt timing
//!
//! `TransactionWrapper::execute` runs a unit of work inside one store
//! transaction. On a retryable conflict the transaction is rolled back and
//! the unit of work is invoked again from scratch, so it must reset any
//! per-attempt state it keeps (observation buffers in particular).
//!
//! Every attempt's wall-clock duration is recorded, in attempt order, and
//! handed to the caller whether the call ultimately succeeds or not: one
//! logical call produces exactly `1 + retries` durations. Backoff sleeps
//! between attempts are not part of any attempt's duration.

use std::thread;
use std::time::{Duration, Instant};

use isoprobe_core::{Database, Error, IsolationLevel, Result, RetryConfig, Transaction};
use tracing::{debug, warn};

/// Executes units of work transactionally, retrying on conflicts
///
/// # Example
///
/// ```ignore
/// let wrapper = TransactionWrapper::new(&db, IsolationLevel::ReadCommitted, RetryConfig::default());
/// let mut durations = Vec::new();
/// let balance = wrapper.execute(
///     |txn| Ok(txn.find_by_id(&id, LockMode::None)?.balance),
///     |attempts| durations = attempts,
/// )?;
/// ```
pub struct TransactionWrapper<'a> {
    db: &'a dyn Database,
    isolation: IsolationLevel,
    retry: RetryConfig,
}

impl<'a> TransactionWrapper<'a> {
    /// Create a wrapper over `db`
    pub fn new(db: &'a dyn Database, isolation: IsolationLevel, retry: RetryConfig) -> Self {
        TransactionWrapper {
            db,
            isolation,
            retry,
        }
    }

    /// Isolation level every attempt runs at
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Retry policy
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run `work` until it commits or fails with a non-retryable error
    ///
    /// `on_durations` receives the duration of every attempt exactly once,
    /// before this method returns.
    ///
    /// # Errors
    ///
    /// Non-retryable errors from `work` or the store propagate unchanged.
    /// When the retry budget is used up, returns `Error::RetriesExhausted`.
    pub fn execute<T, F, D>(&self, mut work: F, on_durations: D) -> Result<T>
    where
        F: FnMut(&mut dyn Transaction) -> Result<T>,
        D: FnOnce(Vec<Duration>),
    {
        let mut durations = Vec::with_capacity(1);
        let mut retries = 0usize;

        let result = loop {
            let started = Instant::now();
            let attempt = self.attempt(&mut work);
            durations.push(started.elapsed());

            match attempt {
                Ok(value) => break Ok(value),
                Err(e) if e.is_retryable() => {
                    if !self.retry.allows_retry(retries) {
                        warn!(
                            target: "isoprobe::txn",
                            attempts = retries + 1,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        break Err(Error::RetriesExhausted {
                            attempts: retries + 1,
                            last: e.to_string(),
                        });
                    }
                    let delay = self.retry.calculate_delay(retries);
                    retries += 1;
                    debug!(
                        target: "isoprobe::txn",
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after conflict"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(e) => break Err(e),
            }
        };

        on_durations(durations);
        result
    }

    fn attempt<T, F>(&self, work: &mut F) -> Result<T>
    where
        F: FnMut(&mut dyn Transaction) -> Result<T>,
    {
        let mut txn = self.db.begin(self.isolation)?;
        match work(&mut *txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }
}
