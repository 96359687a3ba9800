//! Workload runner
//!
//! Drives one workload through its lifecycle with a fixed pool of workers.
//! Each worker calls `execute_once` sequentially until the stop condition
//! is met; in-flight executions always finish (soft join). A fatal error
//! ends only the worker that hit it: it is logged, counted, and the other
//! workers keep going.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use isoprobe_core::{Reporter, Result, Settings, StopCondition};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

use crate::stats::LatencyStats;
use crate::workload::{Verdict, Workload};

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// No anomaly, no fatal error
    Clean,
    /// At least one anomaly observed
    AnomaliesObserved,
    /// At least one worker stopped by a fatal error
    FatalErrors,
}

impl ExitStatus {
    /// Process exit code
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::AnomaliesObserved => 1,
            ExitStatus::FatalErrors => 2,
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Executions started across all workers
    pub executions: u64,
    /// Workers stopped by a fatal error
    pub failures: usize,
    /// Every attempt duration, in completion order per worker
    #[serde(skip)]
    pub durations: Vec<Duration>,
    /// Wall-clock time of the execution phase
    #[serde(skip)]
    pub elapsed: Duration,
    /// Latency summary over `durations`
    pub latency: LatencyStats,
    /// Workload verdict
    pub verdict: Verdict,
}

impl RunOutcome {
    /// Exit status; fatal errors take precedence over anomalies
    pub fn exit_status(&self) -> ExitStatus {
        if self.failures > 0 {
            ExitStatus::FatalErrors
        } else if !self.verdict.is_clean() {
            ExitStatus::AnomaliesObserved
        } else {
            ExitStatus::Clean
        }
    }
}

/// Runs a workload with `workers` concurrent workers until `stop`
#[derive(Debug, Clone)]
pub struct WorkloadRunner {
    workers: usize,
    stop: StopCondition,
}

impl WorkloadRunner {
    /// Create a runner; at least one worker always runs
    pub fn new(workers: usize, stop: StopCondition) -> Self {
        WorkloadRunner {
            workers: workers.max(1),
            stop,
        }
    }

    /// Runner configured from settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.workers, settings.stop_condition())
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Stop condition
    pub fn stop_condition(&self) -> StopCondition {
        self.stop
    }

    /// Drive `workload` through its full lifecycle
    ///
    /// The report (verdict, then latency) is always rendered, whether or
    /// not anomalies or worker failures occurred.
    ///
    /// # Errors
    ///
    /// Fails only if validation, setup or teardown fail; worker errors are
    /// isolated and counted in `RunOutcome::failures`.
    pub fn run(&self, workload: &mut dyn Workload, reporter: &mut dyn Reporter) -> Result<RunOutcome> {
        let kind = workload.kind();
        workload.pre_validate()?;
        workload.before_all_executions()?;

        info!(
            target: "isoprobe::runner",
            workload = %kind,
            workers = self.workers,
            stop = %self.stop,
            "Starting workload"
        );

        let executions = AtomicU64::new(0);
        let failures = AtomicUsize::new(0);
        let durations = Mutex::new(Vec::new());
        let started = Instant::now();

        {
            let shared: &dyn Workload = &*workload;
            thread::scope(|scope| {
                for worker in 0..self.workers {
                    let (executions, failures, durations) = (&executions, &failures, &durations);
                    scope.spawn(move || {
                        self.worker_loop(worker, shared, started, executions, failures, durations)
                    });
                }
            });
        }

        let elapsed = started.elapsed();
        let executions = executions.into_inner();
        let failures = failures.into_inner();
        let durations = durations.into_inner();

        info!(
            target: "isoprobe::runner",
            workload = %kind,
            executions,
            attempts = durations.len(),
            failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "Workers joined"
        );

        let verdict = workload.after_all_executions(reporter)?;
        let latency = LatencyStats::from_durations(&durations, elapsed);
        latency.report(reporter);

        if failures > 0 {
            reporter.error(&format!(
                "{} of {} worker(s) stopped by fatal errors (see log)",
                failures, self.workers
            ));
        }

        Ok(RunOutcome {
            executions,
            failures,
            durations,
            elapsed,
            latency,
            verdict,
        })
    }

    /// Claim the next execution; false once the stop condition is met
    fn claim(&self, started: Instant, executions: &AtomicU64) -> bool {
        match self.stop {
            StopCondition::Duration(limit) => {
                if started.elapsed() >= limit {
                    return false;
                }
                executions.fetch_add(1, Ordering::Relaxed);
                true
            }
            StopCondition::Iterations(budget) => executions
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    (n < budget).then_some(n + 1)
                })
                .is_ok(),
        }
    }

    fn worker_loop(
        &self,
        worker: usize,
        workload: &dyn Workload,
        started: Instant,
        executions: &AtomicU64,
        failures: &AtomicUsize,
        durations: &Mutex<Vec<Duration>>,
    ) {
        let mut local = 0u64;
        let mut attempts = Vec::new();
        while self.claim(started, executions) {
            let result = workload.execute_once(&mut attempts);
            // failed executions still took time
            durations.lock().append(&mut attempts);
            match result {
                Ok(()) => local += 1,
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        target: "isoprobe::runner",
                        worker,
                        completed = local,
                        error = %e,
                        "Worker stopped by fatal error"
                    );
                    return;
                }
            }
        }
        tracing::debug!(target: "isoprobe::runner", worker, completed = local, "Worker finished");
    }
}
