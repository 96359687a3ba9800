//! isoprobe CLI: run an anomaly workload against the reference store.
//!
//! - `isoprobe [flags] <workload>`: seed the store, run the workload, print
//!   the consistency report and latency summary, exit with the run status
//! - `isoprobe list`: print the workload table
//!
//! Exit codes: 0 clean, 1 anomalies observed, 2 fatal errors (including
//! invalid settings).

mod commands;
mod format;
mod parse;

use std::process;
use std::sync::Arc;

use isoprobe_concurrency::MemDatabase;
use isoprobe_core::{Database, Result};
use isoprobe_engine::{ConsoleReporter, ExitStatus, WorkloadContext, WorkloadRunner};
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{format_error, format_summary, format_workload_table, RunSummary};
use parse::{matches_to_action, CliAction, RunRequest};

fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"), matches.get_flag("quiet"));

    let exit_code = match matches_to_action(&matches) {
        Ok(CliAction::List) => {
            print!("{}", format_workload_table());
            ExitStatus::Clean.code()
        }
        Ok(CliAction::Run(request)) => match run_workload(request, matches.get_flag("json")) {
            Ok(status) => status.code(),
            Err(e) => {
                eprintln!("{}", format_error(&e));
                ExitStatus::FatalErrors.code()
            }
        },
        Err(e) => {
            eprintln!("{}", format_error(&e));
            ExitStatus::FatalErrors.code()
        }
    };
    process::exit(exit_code);
}

/// Logs go to stderr so the report on stdout stays clean. `RUST_LOG`
/// takes precedence over the flags.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn run_workload(request: RunRequest, json: bool) -> Result<ExitStatus> {
    let RunRequest { workload, settings } = request;

    let store = MemDatabase::with_lock_timeout(settings.lock_timeout());
    store.seed(&settings.accounts);
    let db: Arc<dyn Database> = Arc::new(store);

    tracing::info!(
        target: "isoprobe::cli",
        workload = %workload,
        isolation = %settings.isolation,
        lock_mode = %settings.lock_mode,
        optimistic_locking = settings.optimistic_locking,
        "Running workload"
    );

    let runner = WorkloadRunner::from_settings(&settings);
    let mut probe = workload.create(WorkloadContext::new(db, settings.clone()));
    let mut reporter = ConsoleReporter::stdout();
    let outcome = runner.run(probe.as_mut(), &mut reporter)?;

    if json {
        println!(
            "{}",
            format_summary(&RunSummary::new(workload, &settings, &outcome))
        );
    }
    Ok(outcome.exit_status())
}
