//! Exact decimal balance type
//!
//! Balances are stored as a signed count of hundredths (two fractional
//! digits). All arithmetic is integer arithmetic, so sums and differences are
//! exact and equality comparisons between observed values are meaningful.
//!
//! The textual form is `[-]units[.fraction]` with at most two fractional
//! digits, e.g. `"500.00"`, `"-12.5"`, `"7"`.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of hundredths in one unit
const SCALE: i64 = 100;

/// Exact two-digit decimal amount
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Balance(i64);

/// Error returned when a balance string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceParseError {
    /// Input was empty (or only a sign)
    #[error("empty balance")]
    Empty,
    /// Input contained a character that is not a digit, sign or dot
    #[error("invalid balance '{0}'")]
    Invalid(String),
    /// More than two fractional digits were given
    #[error("balance '{0}' has more than two fractional digits")]
    TooPrecise(String),
    /// Value does not fit in the underlying representation
    #[error("balance '{0}' is out of range")]
    Overflow(String),
}

impl Balance {
    /// Zero balance
    pub const ZERO: Balance = Balance(0);

    /// Create a balance from a count of hundredths
    pub const fn from_cents(cents: i64) -> Self {
        Balance(cents)
    }

    /// Create a balance from whole units
    pub const fn from_units(units: i64) -> Self {
        Balance(units * SCALE)
    }

    /// Raw count of hundredths
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// True if the balance is strictly below zero
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// True if the balance is strictly above zero
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Balance) -> Option<Balance> {
        self.0.checked_add(other.0).map(Balance)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE as u64;
        write!(f, "{}{}.{:02}", sign, abs / scale, abs % scale)
    }
}

impl FromStr for Balance {
    type Err = BalanceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if body.is_empty() {
            return Err(BalanceParseError::Empty);
        }

        let (units, fraction) = match body.split_once('.') {
            Some((u, f)) => (u, f),
            None => (body, ""),
        };
        if units.is_empty() && fraction.is_empty() {
            return Err(BalanceParseError::Invalid(s.to_string()));
        }
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(units) || !all_digits(fraction) {
            return Err(BalanceParseError::Invalid(s.to_string()));
        }
        if fraction.len() > 2 {
            return Err(BalanceParseError::TooPrecise(s.to_string()));
        }

        let overflow = || BalanceParseError::Overflow(s.to_string());
        let whole: i64 = if units.is_empty() {
            0
        } else {
            units.parse().map_err(|_| overflow())?
        };
        let frac: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| overflow())? * 10,
            _ => fraction.parse().map_err(|_| overflow())?,
        };
        let cents = whole
            .checked_mul(SCALE)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(overflow)?;

        Ok(Balance(if negative { -cents } else { cents }))
    }
}

impl TryFrom<String> for Balance {
    type Error = BalanceParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Balance> for String {
    fn from(value: Balance) -> Self {
        value.to_string()
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Balance {
        Balance(self.0 + rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Balance) {
        self.0 += rhs.0;
    }
}

impl Sub for Balance {
    type Output = Balance;

    fn sub(self, rhs: Balance) -> Balance {
        Balance(self.0 - rhs.0)
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Balance) {
        self.0 -= rhs.0;
    }
}

impl Neg for Balance {
    type Output = Balance;

    fn neg(self) -> Balance {
        Balance(-self.0)
    }
}

impl Sum for Balance {
    fn sum<I: Iterator<Item = Balance>>(iter: I) -> Balance {
        iter.fold(Balance::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Balance> for Balance {
    fn sum<I: Iterator<Item = &'a Balance>>(iter: I) -> Balance {
        iter.copied().sum()
    }
}
