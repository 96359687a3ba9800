//! Run configuration
//!
//! Settings are read from an optional TOML file and then overridden by
//! command-line flags. Every field has a default, so an empty file (or no
//! file at all) is a valid configuration.
//!
//! # Example
//!
//! ```toml
//! workers = 8
//! duration_secs = 30
//! read_write_ratio = 0.95
//! isolation = "read_committed"
//! lock_mode = "for_update"
//! optimistic_locking = false
//!
//! [selection]
//! count = 10
//! random = false
//!
//! [retry]
//! max_retries = 10
//! unbounded = false
//!
//! [accounts]
//! count = 100
//! initial_balance = "500.00"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::balance::Balance;
use crate::error::{Error, Result};

/// Row lock requested by a read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Plain read, no row lock
    #[default]
    None,
    /// Shared row lock (`SELECT .. FOR SHARE`)
    ForShare,
    /// Exclusive row lock (`SELECT .. FOR UPDATE`)
    ForUpdate,
}

impl LockMode {
    /// True unless this is `LockMode::None`
    pub fn is_locking(self) -> bool {
        !matches!(self, LockMode::None)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockMode::None => "none",
            LockMode::ForShare => "for_share",
            LockMode::ForUpdate => "for_update",
        };
        f.write_str(name)
    }
}

impl FromStr for LockMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LockMode::None),
            "for_share" | "share" | "ssu" => Ok(LockMode::ForShare),
            "for_update" | "update" | "sfu" => Ok(LockMode::ForUpdate),
            other => Err(Error::InvalidConfig(format!(
                "unknown lock mode '{}' (expected none, for_share or for_update)",
                other
            ))),
        }
    }
}

/// Transaction isolation level requested from the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Each statement sees the latest committed data
    #[default]
    ReadCommitted,
    /// Snapshot isolation: all reads see the snapshot taken at begin
    RepeatableRead,
    /// Snapshot isolation plus commit-time read validation
    Serializable,
}

impl IsolationLevel {
    /// True for levels that read from a transaction-wide snapshot
    pub fn uses_snapshot(self) -> bool {
        self >= IsolationLevel::RepeatableRead
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "rc" | "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "rr" | "repeatable_read" | "snapshot" | "si" => Ok(IsolationLevel::RepeatableRead),
            "1sr" | "ser" | "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(Error::InvalidConfig(format!(
                "unknown isolation level '{}' (expected rc, rr or serializable)",
                other
            ))),
        }
    }
}

/// How the fixed target-account set is chosen before workers start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSelection {
    /// Number of target accounts
    pub count: usize,
    /// Random sample instead of the first `count` accounts by id
    pub random: bool,
}

impl Default for AccountSelection {
    fn default() -> Self {
        Self {
            count: 10,
            random: false,
        }
    }
}

/// Accounts created in the store before a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Number of accounts (one per group)
    pub count: usize,
    /// Opening balance of each account
    pub initial_balance: Balance,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            count: 100,
            initial_balance: Balance::from_units(500),
        }
    }
}

/// Configuration for retry on retryable conflicts
///
/// Retries use exponential backoff capped at `max_delay_ms`. With
/// `unbounded = true` the wrapper retries until the transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (ignored when unbounded)
    pub max_retries: usize,
    /// Retry forever
    pub unbounded: bool,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            unbounded: false,
            base_delay_ms: 1,
            max_delay_ms: 50,
        }
    }
}

impl RetryConfig {
    /// Create a RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryConfig with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            unbounded: false,
            ..Default::default()
        }
    }

    /// Create a RetryConfig that retries until commit
    pub fn unbounded() -> Self {
        Self {
            unbounded: true,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self.unbounded = false;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// True if another retry is allowed after `retries` retries
    pub fn allows_retry(&self, retries: usize) -> bool {
        self.unbounded || retries < self.max_retries
    }

    /// Calculate delay for a given retry (exponential backoff)
    pub fn calculate_delay(&self, retry: usize) -> Duration {
        // Cap the shift to prevent overflow (1 << 63 is the max for u64)
        let shift = retry.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// When the runner stops starting new executions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Stop after this much wall-clock time
    Duration(Duration),
    /// Stop after this many executions across all workers
    Iterations(u64),
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCondition::Duration(d) => write!(f, "{}s", d.as_secs_f64()),
            StopCondition::Iterations(n) => write!(f, "{} iterations", n),
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of concurrent workers
    pub workers: usize,
    /// Run duration in seconds (used when `iterations` is unset)
    pub duration_secs: Option<u64>,
    /// Total execution budget across workers (takes precedence over duration)
    pub iterations: Option<u64>,
    /// Probability in [0,1) that an execution takes the read path
    pub read_write_ratio: f64,
    /// Probability split between the first and second write sub-path
    pub write_split: f64,
    /// Target-account selection policy
    pub selection: AccountSelection,
    /// Row lock mode for reads
    pub lock_mode: LockMode,
    /// Use compare-and-swap updates instead of plain updates
    pub optimistic_locking: bool,
    /// Isolation level for every transaction
    pub isolation: IsolationLevel,
    /// Number of repeated in-transaction reads per observed entity
    pub repeated_reads: usize,
    /// Retry policy for retryable conflicts
    pub retry: RetryConfig,
    /// Row lock wait timeout in milliseconds
    pub lock_timeout_ms: u64,
    /// Accounts seeded into the store
    pub accounts: SeedConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 8,
            duration_secs: Some(30),
            iterations: None,
            read_write_ratio: 0.95,
            write_split: 0.50,
            selection: AccountSelection::default(),
            lock_mode: LockMode::None,
            optimistic_locking: false,
            isolation: IsolationLevel::ReadCommitted,
            repeated_reads: 10,
            retry: RetryConfig::default(),
            lock_timeout_ms: 1000,
            accounts: SeedConfig::default(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Stop condition derived from `iterations` / `duration_secs`
    pub fn stop_condition(&self) -> StopCondition {
        match (self.iterations, self.duration_secs) {
            (Some(n), _) => StopCondition::Iterations(n),
            (None, Some(secs)) => StopCondition::Duration(Duration::from_secs(secs)),
            (None, None) => StopCondition::Duration(Duration::from_secs(30)),
        }
    }

    /// Row lock wait timeout
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Check settings for values no run can work with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.read_write_ratio) {
            return Err(Error::InvalidConfig(format!(
                "read_write_ratio must be in [0,1), got {}",
                self.read_write_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.write_split) {
            return Err(Error::InvalidConfig(format!(
                "write_split must be in [0,1], got {}",
                self.write_split
            )));
        }
        if self.repeated_reads == 0 {
            return Err(Error::InvalidConfig(
                "repeated_reads must be at least 1".to_string(),
            ));
        }
        if self.selection.count == 0 {
            return Err(Error::InvalidConfig(
                "selection count must be at least 1".to_string(),
            ));
        }
        if self.selection.count > self.accounts.count {
            return Err(Error::InvalidConfig(format!(
                "selection count {} exceeds seeded account count {}",
                self.selection.count, self.accounts.count
            )));
        }
        match self.stop_condition() {
            StopCondition::Iterations(0) => {
                return Err(Error::InvalidConfig("iterations must be at least 1".to_string()))
            }
            StopCondition::Duration(d) if d.is_zero() => {
                return Err(Error::InvalidConfig(
                    "duration must be at least 1 second".to_string(),
                ))
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.read_write_ratio, 0.95);
        assert_eq!(settings.write_split, 0.50);
        assert_eq!(
            settings.stop_condition(),
            StopCondition::Duration(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_toml() {
        let settings = Settings::from_toml_str(
            r#"
            workers = 4
            iterations = 500
            isolation = "serializable"
            lock_mode = "for_update"
            optimistic_locking = true

            [selection]
            count = 2
            random = true

            [retry]
            unbounded = true

            [accounts]
            count = 20
            initial_balance = "100.50"
            "#,
        )
        .unwrap();

        assert_eq!(settings.workers, 4);
        assert_eq!(settings.stop_condition(), StopCondition::Iterations(500));
        assert_eq!(settings.isolation, IsolationLevel::Serializable);
        assert_eq!(settings.lock_mode, LockMode::ForUpdate);
        assert!(settings.optimistic_locking);
        assert_eq!(settings.selection.count, 2);
        assert!(settings.selection.random);
        assert!(settings.retry.unbounded);
        assert_eq!(settings.accounts.initial_balance, Balance::from_cents(10050));
        // Untouched fields keep defaults
        assert_eq!(settings.repeated_reads, 10);
    }

    #[test]
    fn test_parse_error() {
        let err = Settings::from_toml_str("isolation = \"chaos\"").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = 3\nread_write_ratio = 0.5").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.workers, 3);
        assert_eq!(settings.read_write_ratio, 0.5);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Settings::load("/nonexistent/isoprobe.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    fn assert_rejected(mutate: impl FnOnce(&mut Settings)) {
        let mut settings = Settings::default();
        mutate(&mut settings);
        assert!(
            matches!(settings.validate(), Err(Error::InvalidConfig(_))),
            "expected rejection for {:?}",
            settings
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_rejected(|s| s.workers = 0);
        assert_rejected(|s| s.read_write_ratio = 1.0);
        assert_rejected(|s| s.read_write_ratio = -0.1);
        assert_rejected(|s| s.write_split = 1.5);
        assert_rejected(|s| s.repeated_reads = 0);
        assert_rejected(|s| s.selection.count = 0);
        assert_rejected(|s| s.selection.count = 101);
        assert_rejected(|s| s.iterations = Some(0));
        assert_rejected(|s| s.duration_secs = Some(0));
    }

    #[test]
    fn test_lock_mode_from_str() {
        assert_eq!("sfu".parse::<LockMode>().unwrap(), LockMode::ForUpdate);
        assert_eq!("FOR_SHARE".parse::<LockMode>().unwrap(), LockMode::ForShare);
        assert_eq!("none".parse::<LockMode>().unwrap(), LockMode::None);
        assert!("exclusive".parse::<LockMode>().is_err());
        assert!(LockMode::ForShare.is_locking());
        assert!(!LockMode::None.is_locking());
    }

    #[test]
    fn test_isolation_from_str() {
        assert_eq!(
            "rc".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "repeatable-read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!(
            "1SR".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
        assert!("dirty".parse::<IsolationLevel>().is_err());
        assert!(!IsolationLevel::ReadCommitted.uses_snapshot());
        assert!(IsolationLevel::Serializable.uses_snapshot());
    }

    #[test]
    fn test_retry_config() {
        let config = RetryConfig::default();
        assert!(config.allows_retry(9));
        assert!(!config.allows_retry(10));
        assert!(!RetryConfig::no_retry().allows_retry(0));
        assert!(RetryConfig::unbounded().allows_retry(usize::MAX));

        let config = RetryConfig::new()
            .with_base_delay_ms(10)
            .with_max_delay_ms(100);
        assert_eq!(config.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(20));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(80));
        assert_eq!(config.calculate_delay(4), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(200), Duration::from_millis(100));
    }
}
