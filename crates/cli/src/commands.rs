//! Clap command tree definition.
//!
//! `isoprobe [flags] <workload>` runs one workload against the reference
//! store; `isoprobe list` prints the workload table.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("isoprobe")
        .about("Provoke and detect transaction isolation anomalies")
        .subcommand_negates_reqs(true)
        .args_conflicts_with_subcommands(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More log output (repeat for debug / trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Also print a JSON summary after the report")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("workload")
                .help("Workload to run: lost_update, read_skew, write_skew, non_repeatable_read, phantom_read (or P4, A5A, A5B, P2, P3)")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("TOML settings file; flags override its values"),
        )
        .args(run_args())
        .subcommand(build_list())
}

fn run_args() -> Vec<Arg> {
    vec![
        Arg::new("workers")
            .long("workers")
            .short('w')
            .value_name("N")
            .help("Concurrent workers (default: 8)")
            .value_parser(value_parser!(usize)),
        Arg::new("duration")
            .long("duration")
            .short('d')
            .value_name("SECS")
            .help("Run for SECS seconds (default: 30)")
            .value_parser(value_parser!(u64))
            .conflicts_with("iterations"),
        Arg::new("iterations")
            .long("iterations")
            .short('n')
            .value_name("N")
            .help("Run exactly N executions across all workers")
            .value_parser(value_parser!(u64)),
        Arg::new("ratio")
            .long("ratio")
            .value_name("F")
            .help("Probability of the read path, in [0,1) (default: 0.95)")
            .value_parser(value_parser!(f64)),
        Arg::new("write-split")
            .long("write-split")
            .value_name("F")
            .help("Probability of the first write path, in [0,1] (default: 0.5)")
            .value_parser(value_parser!(f64)),
        Arg::new("selection")
            .long("selection")
            .value_name("N")
            .help("Number of target accounts (default: 10)")
            .value_parser(value_parser!(usize)),
        Arg::new("random")
            .long("random")
            .help("Sample target accounts randomly instead of by id")
            .action(ArgAction::SetTrue),
        Arg::new("lock")
            .long("lock")
            .value_name("MODE")
            .help("Row lock for reads: none, for_share, for_update"),
        Arg::new("sfu")
            .long("sfu")
            .help("Shorthand for --lock for_update")
            .action(ArgAction::SetTrue)
            .conflicts_with("lock"),
        Arg::new("cas")
            .long("cas")
            .help("Compare-and-swap balance updates (optimistic locking)")
            .action(ArgAction::SetTrue),
        Arg::new("isolation")
            .long("isolation")
            .short('i')
            .value_name("LEVEL")
            .help("Isolation level: rc, rr, serializable (default: rc)"),
        Arg::new("repeated-reads")
            .long("repeated-reads")
            .value_name("N")
            .help("Reads per key in one read transaction (default: 10)")
            .value_parser(value_parser!(usize)),
        Arg::new("retries")
            .long("retries")
            .value_name("N|unbounded")
            .help("Retries per transaction on conflicts (default: 10)"),
        Arg::new("lock-timeout")
            .long("lock-timeout")
            .value_name("MS")
            .help("Row lock wait timeout in milliseconds (default: 1000)")
            .value_parser(value_parser!(u64)),
        Arg::new("accounts")
            .long("accounts")
            .value_name("N")
            .help("Accounts seeded into the store (default: 100)")
            .value_parser(value_parser!(usize)),
    ]
}

fn build_list() -> Command {
    Command::new("list").about("List workloads and the anomalies they probe")
}
