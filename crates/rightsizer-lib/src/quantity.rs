//! Kubernetes resource quantity codec
//!
//! Converts between the canonical quantity strings found on pod specs
//! (`"320m"`, `"70Mi"`, `"1e3"`) and [`Decimal`] values expressed in base
//! units: cores for CPU, bytes for memory.

use crate::error::QuantityError;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Suffix used when writing CPU requests
pub const CPU_SUFFIX: &str = "m";

/// Suffix used when writing memory requests
pub const MEMORY_SUFFIX: &str = "Mi";

/// SI (base 1000) and binary SI (base 1024) suffixes accepted by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    Nano,
    Micro,
    Milli,
    Kilo,
    Mega,
    Giga,
    Tera,
    Peta,
    Exa,
    Kibi,
    Mebi,
    Gibi,
    Tebi,
    Pebi,
    Exbi,
}

impl Suffix {
    fn base(&self) -> u64 {
        match self {
            Self::Kibi | Self::Mebi | Self::Gibi | Self::Tebi | Self::Pebi | Self::Exbi => 1024,
            _ => 1000,
        }
    }

    fn exponent(&self) -> i32 {
        match self {
            Self::Nano => -3,
            Self::Micro => -2,
            Self::Milli => -1,
            Self::Kilo | Self::Kibi => 1,
            Self::Mega | Self::Mebi => 2,
            Self::Giga | Self::Gibi => 3,
            Self::Tera | Self::Tebi => 4,
            Self::Peta | Self::Pebi => 5,
            Self::Exa | Self::Exbi => 6,
        }
    }

    /// `base ^ |exponent|`, the factor between one unit of this suffix and
    /// the base unit
    fn magnitude(&self) -> Decimal {
        let base = Decimal::from(self.base());
        (0..self.exponent().unsigned_abs()).fold(Decimal::ONE, |acc, _| acc * base)
    }

    /// Convert a value in this suffix's scale to base units
    fn to_base(self, value: Decimal) -> Option<Decimal> {
        if self.exponent() < 0 {
            value.checked_div(self.magnitude())
        } else {
            value.checked_mul(self.magnitude())
        }
    }

    /// Convert a value in base units to this suffix's scale
    fn from_base(self, value: Decimal) -> Option<Decimal> {
        if self.exponent() < 0 {
            value.checked_mul(self.magnitude())
        } else {
            value.checked_div(self.magnitude())
        }
    }
}

impl FromStr for Suffix {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suffix = match s {
            "n" => Self::Nano,
            "u" => Self::Micro,
            "m" => Self::Milli,
            "k" | "K" => Self::Kilo,
            "M" => Self::Mega,
            "G" => Self::Giga,
            "T" => Self::Tera,
            "P" => Self::Peta,
            "E" => Self::Exa,
            "Ki" => Self::Kibi,
            "Mi" => Self::Mebi,
            "Gi" => Self::Gibi,
            "Ti" => Self::Tebi,
            "Pi" => Self::Pebi,
            "Ei" => Self::Exbi,
            other => {
                return Err(QuantityError::malformed(
                    other,
                    "unknown quantity suffix",
                ))
            }
        };
        Ok(suffix)
    }
}

/// Characters that may open a suffix, i.e. the keys of the exponent table
fn is_suffix_head(c: char) -> bool {
    matches!(c, 'n' | 'u' | 'm' | 'k' | 'K' | 'M' | 'G' | 'T' | 'P' | 'E')
}

/// Split a quantity into its numeric part and optional suffix
fn split_suffix(text: &str) -> (&str, Option<&str>) {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    if n >= 2 && chars[n - 1] == 'i' && is_suffix_head(chars[n - 2]) {
        let at = text.len() - chars[n - 2].len_utf8() - 1;
        return (&text[..at], Some(&text[at..]));
    }
    if n >= 1 && is_suffix_head(chars[n - 1]) {
        let at = text.len() - chars[n - 1].len_utf8();
        return (&text[..at], Some(&text[at..]));
    }
    (text, None)
}

fn parse_number(number: &str) -> Option<Decimal> {
    let number = number.strip_prefix('+').unwrap_or(number);
    if number.is_empty() {
        return None;
    }
    if number.contains(['e', 'E']) {
        Decimal::from_scientific(number).ok()
    } else {
        Decimal::from_str(number).ok()
    }
}

/// Parse a canonical quantity string into base units
pub fn parse_quantity(text: &str) -> Result<Decimal, QuantityError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::malformed(text, "empty quantity"));
    }

    let (number, suffix) = split_suffix(trimmed);
    let mantissa = parse_number(number)
        .ok_or_else(|| QuantityError::malformed(text, "non-numeric mantissa"))?;

    match suffix {
        None => Ok(mantissa),
        Some(suffix) => {
            let suffix = Suffix::from_str(suffix)
                .map_err(|_| QuantityError::malformed(text, "unknown quantity suffix"))?;
            suffix
                .to_base(mantissa)
                .ok_or_else(|| QuantityError::malformed(text, "quantity out of range"))
        }
    }
}

/// Format a base-unit value with `suffix`, rounded to whole units of that suffix
pub fn format_quantity(value: Decimal, suffix: &str) -> Result<String, QuantityError> {
    format_quantity_with(value, suffix, Some(Decimal::ONE))
}

/// Format a base-unit value with `suffix`, rounded to the `quantize` step
///
/// An empty suffix returns the plain decimal string. A `None` or zero step
/// skips rounding. Ties round to even.
pub fn format_quantity_with(
    value: Decimal,
    suffix: &str,
    quantize: Option<Decimal>,
) -> Result<String, QuantityError> {
    if suffix.is_empty() {
        return Ok(value.to_string());
    }

    let scale = Suffix::from_str(suffix)?;
    let out_of_range = || QuantityError::malformed(value.to_string(), "quantity out of range");

    let mut scaled = scale.from_base(value).ok_or_else(out_of_range)?;
    if let Some(step) = quantize.filter(|s| !s.is_zero()) {
        scaled = scaled
            .checked_div(step)
            .map(|steps| steps.round())
            .and_then(|steps| steps.checked_mul(step))
            .ok_or_else(out_of_range)?;
    }

    Ok(format!("{}{}", scaled, suffix))
}

/// `|a - b| / max(|a|, |b|)`; zero when both values are zero
pub fn relative_difference(a: Decimal, b: Decimal) -> Decimal {
    let larger = a.abs().max(b.abs());
    if larger.is_zero() {
        return Decimal::ZERO;
    }
    match a.checked_sub(b) {
        Some(diff) => diff.abs() / larger,
        // Opposite signs near the Decimal limits; each term is at most one
        None => (a / larger - b / larger).abs(),
    }
}
