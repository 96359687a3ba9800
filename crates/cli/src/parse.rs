//! ArgMatches → run request conversion.
//!
//! Settings are resolved in three layers: defaults, then the `--config`
//! TOML file, then individual flags. The result is validated before any
//! store is created.

use clap::ArgMatches;
use isoprobe_core::{Error, IsolationLevel, LockMode, Result, RetryConfig, Settings};
use isoprobe_engine::WorkloadType;

/// The result of parsing the command line.
#[derive(Debug)]
pub enum CliAction {
    /// Print the workload table.
    List,
    /// Run one workload.
    Run(RunRequest),
}

/// A fully resolved workload run.
#[derive(Debug)]
pub struct RunRequest {
    pub workload: WorkloadType,
    pub settings: Settings,
}

/// Convert parsed arguments into an action.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction> {
    if let Some(("list", _)) = matches.subcommand() {
        return Ok(CliAction::List);
    }

    let workload: WorkloadType = matches
        .get_one::<String>("workload")
        .ok_or_else(|| Error::InvalidConfig("no workload given".to_string()))?
        .parse()?;

    let mut settings = match matches.get_one::<String>("config") {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    apply_overrides(&mut settings, matches)?;
    settings.validate()?;

    Ok(CliAction::Run(RunRequest { workload, settings }))
}

/// Apply every flag present on the command line to `settings`.
pub fn apply_overrides(settings: &mut Settings, matches: &ArgMatches) -> Result<()> {
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        settings.workers = workers;
    }
    if let Some(&secs) = matches.get_one::<u64>("duration") {
        settings.duration_secs = Some(secs);
        settings.iterations = None;
    }
    if let Some(&n) = matches.get_one::<u64>("iterations") {
        settings.iterations = Some(n);
    }
    if let Some(&ratio) = matches.get_one::<f64>("ratio") {
        settings.read_write_ratio = ratio;
    }
    if let Some(&split) = matches.get_one::<f64>("write-split") {
        settings.write_split = split;
    }
    if let Some(&count) = matches.get_one::<usize>("selection") {
        settings.selection.count = count;
    }
    if matches.get_flag("random") {
        settings.selection.random = true;
    }
    if let Some(mode) = matches.get_one::<String>("lock") {
        settings.lock_mode = mode.parse::<LockMode>()?;
    }
    if matches.get_flag("sfu") {
        settings.lock_mode = LockMode::ForUpdate;
    }
    if matches.get_flag("cas") {
        settings.optimistic_locking = true;
    }
    if let Some(level) = matches.get_one::<String>("isolation") {
        settings.isolation = level.parse::<IsolationLevel>()?;
    }
    if let Some(&reads) = matches.get_one::<usize>("repeated-reads") {
        settings.repeated_reads = reads;
    }
    if let Some(retries) = matches.get_one::<String>("retries") {
        settings.retry = parse_retries(retries, &settings.retry)?;
    }
    if let Some(&ms) = matches.get_one::<u64>("lock-timeout") {
        settings.lock_timeout_ms = ms;
    }
    if let Some(&count) = matches.get_one::<usize>("accounts") {
        settings.accounts.count = count;
    }
    Ok(())
}

/// `N` bounds retries at N, `unbounded` removes the bound; delays are kept.
fn parse_retries(value: &str, current: &RetryConfig) -> Result<RetryConfig> {
    let mut retry = current.clone();
    if value.eq_ignore_ascii_case("unbounded") {
        retry.unbounded = true;
        return Ok(retry);
    }
    let max_retries = value.parse::<usize>().map_err(|_| {
        Error::InvalidConfig(format!(
            "invalid --retries '{}' (expected a number or 'unbounded')",
            value
        ))
    })?;
    retry.unbounded = false;
    retry.max_retries = max_retries;
    Ok(retry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build_cli;
    use isoprobe_core::StopCondition;
    use std::io::Write;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Result<CliAction> {
        let matches = build_cli()
            .try_get_matches_from(std::iter::once("isoprobe").chain(args.iter().copied()))
            .unwrap();
        matches_to_action(&matches)
    }

    fn run_request(args: &[&str]) -> RunRequest {
        match parse(args).unwrap() {
            CliAction::Run(request) => request,
            CliAction::List => panic!("expected a run request"),
        }
    }

    #[test]
    fn test_list_subcommand() {
        assert!(matches!(parse(&["list"]).unwrap(), CliAction::List));
    }

    #[test]
    fn test_defaults() {
        let request = run_request(&["lost_update"]);
        assert_eq!(request.workload, WorkloadType::LostUpdate);
        assert_eq!(request.settings, Settings::default());
    }

    #[test]
    fn test_workload_by_anomaly_code() {
        assert_eq!(run_request(&["A5B"]).workload, WorkloadType::WriteSkew);
        assert_eq!(
            run_request(&["non-repeatable-read"]).workload,
            WorkloadType::NonRepeatableRead
        );
    }

    #[test]
    fn test_unknown_workload_rejected() {
        assert!(matches!(parse(&["dirty_write"]), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_flags_override_defaults() {
        let request = run_request(&[
            "p3",
            "--workers",
            "2",
            "--iterations",
            "50",
            "--ratio",
            "0.5",
            "--selection",
            "4",
            "--random",
            "--sfu",
            "--cas",
            "--isolation",
            "rr",
            "--accounts",
            "20",
            "--retries",
            "unbounded",
        ]);
        let s = request.settings;
        assert_eq!(s.workers, 2);
        assert_eq!(s.stop_condition(), StopCondition::Iterations(50));
        assert_eq!(s.read_write_ratio, 0.5);
        assert_eq!(s.selection.count, 4);
        assert!(s.selection.random);
        assert_eq!(s.lock_mode, LockMode::ForUpdate);
        assert!(s.optimistic_locking);
        assert_eq!(s.isolation, IsolationLevel::RepeatableRead);
        assert_eq!(s.accounts.count, 20);
        assert!(s.retry.unbounded);
    }

    #[test]
    fn test_bounded_retries() {
        let s = run_request(&["p4", "--retries", "3"]).settings;
        assert!(!s.retry.unbounded);
        assert_eq!(s.retry.max_retries, 3);
        assert!(matches!(
            parse(&["p4", "--retries", "lots"]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        assert!(matches!(
            parse(&["p4", "--ratio", "1.0"]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            parse(&["p4", "--selection", "500"]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            parse(&["p4", "--lock", "exclusive"]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "workers = 3\nduration_secs = 5\nisolation = \"serializable\"\n\n[selection]\ncount = 6"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let s = run_request(&["p2", "--config", path, "--workers", "5"]).settings;
        assert_eq!(s.workers, 5);
        assert_eq!(s.isolation, IsolationLevel::Serializable);
        assert_eq!(s.selection.count, 6);
        assert_eq!(s.stop_condition(), StopCondition::Duration(Duration::from_secs(5)));
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        assert!(matches!(
            parse(&["p2", "--config", "/nonexistent/isoprobe.toml"]),
            Err(Error::Io(_))
        ));
    }
}
