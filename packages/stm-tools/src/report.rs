use anyhow::{bail, Result};
use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::byte::Byte;

/// Serializes tests that flip the process wide colour override.
#[cfg(test)]
pub static COLOR_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Total width of a table, borders included.
pub const TABLE_COLUMNS: usize = 30;
const TABLE_WIDTH: usize = TABLE_COLUMNS - 2;

pub fn percentage(used: Byte, total: Byte) -> Result<f64> {
    if total.value() == 0 {
        bail!("Memory region has a length of zero.");
    }

    Ok(used.value() as f64 / (total.value() as f64 / 100.0))
}

/// Formats like printf's `%g`: `precision` significant digits, trailing zeros
/// removed, scientific notation for very large or small exponents.
pub fn format_general(value: f64, precision: usize) -> String {
    let precision = precision.max(1);

    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }

    let scientific = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLevel {
    Low,
    Medium,
    High,
}

impl UsageLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent < 60.0 {
            Self::Low
        } else if percent < 80.0 {
            Self::Medium
        } else {
            Self::High
        }
    }

    fn paint(self, text: &str) -> ColoredString {
        match self {
            Self::Low => text.on_green().bright_black().bold(),
            Self::Medium => text.on_yellow().black().bold(),
            Self::High => text.on_red().black().bold(),
        }
    }
}

/// Usage of one memory region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionUsage {
    pub name: String,
    pub total: Byte,
    pub used: Byte,
    pub free: Byte,
    pub percent: f64,
}

impl RegionUsage {
    pub fn new(name: impl Into<String>, used: Byte, total: Byte) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            total,
            used,
            free: total.checked_sub(used)?,
            percent: percentage(used, total)?,
        })
    }

    /// Draws the usage box. The header is highlighted up to the used fraction.
    pub fn render(&self, color: bool) -> Vec<String> {
        let bar = if self.percent >= 100.0 {
            TABLE_WIDTH
        } else {
            (TABLE_WIDTH as f64 * self.percent / 100.0).max(0.0) as usize
        };

        let title = format!(
            "{} MEMORY {} %",
            self.name,
            format_general(self.percent, 2)
        );
        let title = format!("{title:^width$}", width = TABLE_WIDTH);
        let split = title
            .char_indices()
            .nth(bar)
            .map(|(index, _)| index)
            .unwrap_or(title.len());
        let (filled, empty) = title.split_at(split);

        let filled = if color {
            UsageLevel::from_percent(self.percent).paint(filled)
        } else {
            filled.bold()
        };

        let row = |label: &str, value: Byte| {
            let width = TABLE_WIDTH - label.len();
            format!("║{label}{value:>width$}║")
        };

        vec![
            format!("╔{}╗", "═".repeat(TABLE_WIDTH)),
            format!("║{filled}{}║", empty.bold()),
            format!("╟{}╢", "─".repeat(TABLE_WIDTH)),
            row("All:", self.total),
            row("Use:", self.used),
            row("Free:", self.free),
            format!("╚{}╝", "═".repeat(TABLE_WIDTH)),
        ]
    }
}

/// Places tables next to each other, one space apart.
pub fn side_by_side(left: &[String], right: &[String]) -> Vec<String> {
    left.iter()
        .zip(right)
        .map(|(left, right)| format!("{left} {right}"))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub regions: Vec<RegionUsage>,
}
