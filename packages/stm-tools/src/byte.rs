use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

const KIBI: i64 = 1 << 10;
const MEBI: i64 = 1 << 20;

#[derive(Error, Debug, PartialEq)]
pub enum ByteError {
    #[error("Empty byte quantity.")]
    Empty,

    #[error("Invalid number in byte quantity: {0:?}")]
    InvalidNumber(String),

    #[error("Unknown byte unit: {0:?}")]
    UnknownUnit(String),

    #[error("Byte quantity is out of range: {0:?}")]
    OutOfRange(String),
}

/// A signed amount of memory in bytes.
///
/// Signed because the free space of an overflowing region is negative.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Byte(i64);

impl Byte {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, ByteError> {
        self.0
            .checked_add(rhs.0)
            .map(Byte)
            .ok_or_else(|| ByteError::OutOfRange(format!("{} + {}", self.0, rhs.0)))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, ByteError> {
        self.0
            .checked_sub(rhs.0)
            .map(Byte)
            .ok_or_else(|| ByteError::OutOfRange(format!("{} - {}", self.0, rhs.0)))
    }

    pub fn checked_sum(iter: impl IntoIterator<Item = Self>) -> Result<Self, ByteError> {
        iter.into_iter()
            .try_fold(Byte::default(), |total, bytes| total.checked_add(bytes))
    }
}

/// Multiplier for a unit suffix. Units beyond the range of `i64` are still
/// recognized so that fractional quantities of them can be reported as out of
/// range instead of unknown.
fn unit_multiplier(unit: &str) -> Option<f64> {
    let binary = |power: i32| 2f64.powi(power);
    let decimal = |power: i32| 10f64.powi(power);

    let multiplier = match unit {
        "B" => 1.0,
        "K" | "KB" | "KiB" => binary(10),
        "M" | "MiB" => binary(20),
        "GiB" => binary(30),
        "TiB" => binary(40),
        "PiB" => binary(50),
        "EiB" => binary(60),
        "ZiB" => binary(70),
        "YiB" => binary(80),
        "kB" => decimal(3),
        "MB" => decimal(6),
        "GB" => decimal(9),
        "TB" => decimal(12),
        "PB" => decimal(15),
        "EB" => decimal(18),
        "ZB" => decimal(21),
        "YB" => decimal(24),
        _ => return None,
    };

    Some(multiplier)
}

impl FromStr for Byte {
    type Err = ByteError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        if text.is_empty() {
            return Err(ByteError::Empty);
        }

        if text.bytes().all(|b| b.is_ascii_digit()) {
            return text
                .parse()
                .map(Byte)
                .map_err(|_| ByteError::OutOfRange(input.to_string()));
        }

        if let Some(hex) = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
        {
            // `from_str_radix` accepts a sign, the linker does not.
            if hex.starts_with(['+', '-']) {
                return Err(ByteError::InvalidNumber(input.to_string()));
            }
            return i64::from_str_radix(hex, 16)
                .map(Byte)
                .map_err(|_| ByteError::InvalidNumber(input.to_string()));
        }

        let split = text
            .find(|c: char| c.is_alphabetic())
            .ok_or_else(|| ByteError::InvalidNumber(input.to_string()))?;
        let (number, unit) = text.split_at(split);

        let number: f64 = number
            .trim()
            .parse()
            .map_err(|_| ByteError::InvalidNumber(input.to_string()))?;
        let unit = unit.trim();
        let multiplier =
            unit_multiplier(unit).ok_or_else(|| ByteError::UnknownUnit(unit.to_string()))?;

        let bytes = (number * multiplier).trunc();
        if !bytes.is_finite() || bytes >= i64::MAX as f64 || bytes < i64::MIN as f64 {
            return Err(ByteError::OutOfRange(input.to_string()));
        }

        Ok(Byte(bytes as i64))
    }
}

impl fmt::Display for Byte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0 as f64;

        let text = if self.0 >= MEBI {
            format!("{:.1} MiB", value / MEBI as f64)
        } else if self.0 >= KIBI {
            format!("{:.1} KiB", value / KIBI as f64)
        } else {
            format!("{:.1} B", value)
        };

        // Padding is applied to the whole string so tables can right-align it.
        f.pad(&text)
    }
}
