//! Fixed-point amount comparison at a bounded decimal precision.
//!
//! Settlement amounts are 18-decimal fixed-point integers. The simulator and
//! the contract perform the same chain of multiplications and divisions with
//! different arithmetic, so their results can disagree in the last few
//! digits. Amounts are therefore compared after rounding their decimal form
//! (`value / 10^18`) to [`Precision`] fractional digits, never bit-for-bit.
//!
//! Amounts are unsigned: a negative amount cannot be represented and is
//! rejected when the simulator report or the event log is decoded.

use alloy::primitives::U256;
use alloy::primitives::utils::format_units;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Number of decimals of every settlement amount.
pub const TOKEN_DECIMALS: u8 = 18;

const DEFAULT_PRECISION_DIGITS: u8 = 8;

/// Number of fractional digits two amounts must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Precision(u8);

impl Precision {
    pub const fn new(digits: u8) -> Self {
        Self(digits)
    }

    pub const fn digits(self) -> u8 {
        self.0
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self(DEFAULT_PRECISION_DIGITS)
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} decimals", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "amount {} does not match {} at {precision}",
    display_amount(*expected),
    display_amount(*actual)
)]
pub struct ToleranceViolation {
    pub expected: U256,
    pub actual: U256,
    pub precision: Precision,
}

/// Rounds the decimal form of `value` half-up to `precision` fractional
/// digits and returns it scaled by `10^precision`.
///
/// Precisions of 18 digits or more keep the value unchanged, since the
/// fixed-point representation carries no further digits.
pub fn round_to_precision(value: U256, precision: Precision) -> U256 {
    if precision.0 >= TOKEN_DECIMALS {
        return value;
    }

    let unit = U256::from(10u8).pow(U256::from(TOKEN_DECIMALS - precision.0));
    let quotient = value / unit;
    let remainder = value % unit;

    // remainder < unit <= 10^18, doubling cannot overflow
    if remainder * U256::from(2u8) >= unit {
        quotient + U256::from(1u8)
    } else {
        quotient
    }
}

/// Requires `expected` and `actual` to agree once rounded to `precision`.
pub fn amounts_match(
    expected: U256,
    actual: U256,
    precision: Precision,
) -> Result<(), ToleranceViolation> {
    if round_to_precision(expected, precision) == round_to_precision(actual, precision) {
        Ok(())
    } else {
        Err(ToleranceViolation {
            expected,
            actual,
            precision,
        })
    }
}

/// Renders an 18-decimal amount as a decimal string for error messages.
pub(crate) fn display_amount(value: U256) -> String {
    format_units(value, TOKEN_DECIMALS).unwrap_or_else(|_| value.to_string())
}
