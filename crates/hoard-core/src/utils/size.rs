//! Byte size helpers used by logging and configuration.

use crate::error::{HoardError, HoardResult};

pub fn to_kib(value: u64) -> f64 {
    value as f64 / 1024.0
}

pub fn to_mib(value: u64) -> f64 {
    value as f64 / 1024.0 / 1024.0
}

/// Format a byte count in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Parse a size such as `4096`, `512KiB`, `32 MiB` or `2GB`.
///
/// Decimal and binary suffixes are both treated as powers of 1024.
pub fn parse_size(input: &str) -> HoardResult<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    let invalid = |reason: &str| HoardError::ConfigValidation {
        field: "size".to_string(),
        reason: format!("'{}': {}", input, reason),
    };

    if digits.is_empty() {
        return Err(invalid("expected a number"));
    }
    let value: u64 = digits.parse().map_err(|_| invalid("number out of range"))?;

    let shift = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        _ => return Err(invalid("unknown unit")),
    };

    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| invalid("size overflows 64 bits"))
}
