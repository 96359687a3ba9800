//! Error types for isoprobe
//!
//! The taxonomy separates three very different outcomes of a repository call:
//! - `RetryableConflict`: the store could not serialize the transaction; the
//!   transaction wrapper re-runs the unit of work
//! - `OptimisticPrecondition`: a compare-and-swap update found a newer row;
//!   the protection worked, nothing is retried and nothing is an anomaly
//! - everything else: fatal for the calling worker

use std::io;

use thiserror::Error;

use crate::types::AccountId;

/// Result type alias for isoprobe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for isoprobe
#[derive(Debug, Error)]
pub enum Error {
    /// Store signalled a serialization failure, lock timeout or
    /// first-updater-wins conflict; the transaction must restart
    #[error("Retryable conflict: {reason}")]
    RetryableConflict {
        /// Store-provided reason
        reason: String,
    },

    /// Compare-and-swap update found a different row version than was read
    #[error("Optimistic precondition failed for {id}: expected version {expected_version}, found {found_version}")]
    OptimisticPrecondition {
        /// Account whose update was rejected
        id: AccountId,
        /// Version carried by the caller
        expected_version: u64,
        /// Version currently stored
        found_version: u64,
    },

    /// Account not found
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Constraint violation (e.g. duplicate key)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Connection to the store failed or was lost
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    /// Bounded retry budget was used up by retryable conflicts
    #[error("Retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        /// Number of attempts made, including the first
        attempts: usize,
        /// Message of the last retryable conflict
        last: String,
    },

    /// Settings failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Settings file could not be parsed
    #[error("Settings parse error: {0}")]
    Parse(String),

    /// I/O error (settings file, output)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invariant violated inside the harness itself
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a retryable conflict
    pub fn conflict(reason: impl Into<String>) -> Self {
        Error::RetryableConflict {
            reason: reason.into(),
        }
    }

    /// True for store conflicts the transaction wrapper re-attempts
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RetryableConflict { .. })
    }

    /// True for compare-and-swap mismatches (a prevented lost update)
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::OptimisticPrecondition { .. })
    }

    /// True for errors that terminate the calling worker
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable() && !self.is_precondition()
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let conflict = Error::conflict("could not serialize access");
        assert!(conflict.is_retryable());
        assert!(!conflict.is_precondition());
        assert!(!conflict.is_fatal());

        let cas = Error::OptimisticPrecondition {
            id: AccountId::new(1, "checking"),
            expected_version: 3,
            found_version: 4,
        };
        assert!(cas.is_precondition());
        assert!(!cas.is_retryable());
        assert!(!cas.is_fatal());

        for fatal in [
            Error::NotFound(AccountId::new(1, "checking")),
            Error::ConstraintViolation("duplicate key".to_string()),
            Error::Connectivity("connection reset".to_string()),
            Error::RetriesExhausted {
                attempts: 4,
                last: "x".to_string(),
            },
        ] {
            assert!(fatal.is_fatal(), "{} should be fatal", fatal);
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::OptimisticPrecondition {
            id: AccountId::new(7, "checking"),
            expected_version: 42,
            found_version: 43,
        };
        let msg = err.to_string();
        assert!(msg.contains("7:checking"));
        assert!(msg.contains("42"));
        assert!(msg.contains("43"));

        let err = Error::RetriesExhausted {
            attempts: 11,
            last: "lock timeout".to_string(),
        };
        assert!(err.to_string().contains("11 attempt(s)"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_fatal());
    }
}
