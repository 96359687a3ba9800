//! Output formatting: the workload table, the JSON run summary and errors.

use chrono::{DateTime, Utc};
use isoprobe_core::{Error, Settings};
use isoprobe_engine::{ExitStatus, RunOutcome, WorkloadType};
use serde::Serialize;

/// Machine-readable summary of one run, printed with `--json`.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub finished_at: DateTime<Utc>,
    pub workload: WorkloadType,
    pub anomaly: &'static str,
    pub settings: &'a Settings,
    pub elapsed_secs: f64,
    pub attempts: usize,
    pub outcome: &'a RunOutcome,
    pub exit_status: ExitStatus,
}

impl<'a> RunSummary<'a> {
    pub fn new(workload: WorkloadType, settings: &'a Settings, outcome: &'a RunOutcome) -> Self {
        RunSummary {
            finished_at: Utc::now(),
            workload,
            anomaly: workload.anomaly(),
            settings,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            attempts: outcome.durations.len(),
            outcome,
            exit_status: outcome.exit_status(),
        }
    }
}

/// Pretty JSON rendering of a run summary.
pub fn format_summary(summary: &RunSummary<'_>) -> String {
    serde_json::to_string_pretty(summary)
        .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Format an error for stderr.
pub fn format_error(err: &Error) -> String {
    format!("(error) {}", err)
}

/// Table of every workload with its anomaly code and guidance.
pub fn format_workload_table() -> String {
    let name_width = WorkloadType::ALL
        .iter()
        .map(|k| k.name().len())
        .max()
        .unwrap_or(0);

    let mut out = format!("{:<name_width$}  {:<7}  {}\n", "WORKLOAD", "ANOMALY", "DESCRIPTION");
    for kind in WorkloadType::ALL {
        out.push_str(&format!(
            "{:<name_width$}  {:<7}  {}\n",
            kind.name(),
            kind.anomaly(),
            kind.title()
        ));
        if !kind.note().is_empty() {
            out.push_str(&format!("{:<name_width$}  {:<7}  ({})\n", "", "", kind.note()));
        }
    }
    out
}
