//! Human-readable size strings.
//!
//! Sizes are written as a decimal count followed by an optional unit letter:
//! `b` (bytes), `k`, `m`, `g`, `t`, `p` (powers of 1024). Unit letters are
//! case-insensitive, so `"8k"`, `"8K"` and `"8192"` all mean 8192 bytes.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("malformed size string: {0:?}")]
    Malformed(String),

    #[error("size {0:?} does not fit in 64 bits")]
    Overflow(String),
}

const UNITS: [(char, u64); 6] = [
    ('b', 1),
    ('k', 1 << 10),
    ('m', 1 << 20),
    ('g', 1 << 30),
    ('t', 1 << 40),
    ('p', 1 << 50),
];

fn multiplier(unit: char) -> Option<u64> {
    let unit = unit.to_ascii_lowercase();
    UNITS.iter().find(|(u, _)| *u == unit).map(|(_, m)| *m)
}

/// Parse a size string into a byte count.
///
/// ```
/// use nfv_config::size::parse_size;
/// assert_eq!(parse_size("8k").unwrap(), 8192);
/// assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
/// assert_eq!(parse_size("100").unwrap(), 100);
/// ```
pub fn parse_size(raw: &str) -> Result<u64, SizeError> {
    let trimmed = raw.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(digits_end);
    if digits.is_empty() {
        return Err(SizeError::Malformed(raw.to_string()));
    }

    let mut suffix_chars = suffix.chars();
    let factor = match (suffix_chars.next(), suffix_chars.next()) {
        (None, _) => 1,
        (Some(unit), None) => multiplier(unit).ok_or_else(|| SizeError::Malformed(raw.to_string()))?,
        _ => return Err(SizeError::Malformed(raw.to_string())),
    };

    let count: u64 = digits
        .parse()
        .map_err(|_| SizeError::Overflow(raw.to_string()))?;
    count
        .checked_mul(factor)
        .ok_or_else(|| SizeError::Overflow(raw.to_string()))
}

/// Render a byte count with the largest unit that divides it exactly.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0b".to_string();
    }
    for (unit, factor) in UNITS.iter().rev() {
        if *factor > 1 && bytes % factor == 0 {
            return format!("{}{}", bytes / factor, unit);
        }
    }
    format!("{}b", bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_table() {
        assert_eq!(parse_size("1b").unwrap(), 1);
        assert_eq!(parse_size("1k").unwrap(), 1024);
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1t").unwrap(), 1u64 << 40);
        assert_eq!(parse_size("1p").unwrap(), 1u64 << 50);
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(parse_size("8K").unwrap(), 8192);
        assert_eq!(parse_size(" 4k ").unwrap(), 4096);
        assert_eq!(parse_size("10240").unwrap(), 10240);
    }

    #[test]
    fn test_malformed() {
        for bad in ["", "k", "abc", "8kb", "8x", "-1", "1.5m", "8 k"] {
            assert!(
                matches!(parse_size(bad), Err(SizeError::Malformed(_))),
                "{:?} should be malformed",
                bad
            );
        }
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(parse_size("99999999p"), Err(SizeError::Overflow(_))));
        assert!(matches!(
            parse_size("999999999999999999999999"),
            Err(SizeError::Overflow(_))
        ));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0b");
        assert_eq!(format_size(8192), "8k");
        assert_eq!(format_size(3 * 1024 * 1024), "3m");
        assert_eq!(format_size(1000), "1000b");
        assert_eq!(parse_size(&format_size(10240)).unwrap(), 10240);
    }
}
