//! Go style duration strings, e.g. "15s", "1m30s", "1.5h" or "250ms".

use std::fmt::{Display, Formatter};
use std::time::Duration;

const NANOSECOND: u128 = 1;
const MICROSECOND: u128 = 1000 * NANOSECOND;
const MILLISECOND: u128 = 1000 * MICROSECOND;
const SECOND: u128 = 1000 * MILLISECOND;
const MINUTE: u128 = 60 * SECOND;
const HOUR: u128 = 60 * MINUTE;
const DAY: u128 = 24 * HOUR;

// what fits in `Duration`, seconds are an u64
const MAX_NANOS: u128 = u64::MAX as u128 * SECOND + (SECOND - 1);

#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub enum ParseDurationError {
    InvalidDuration,
    MissingUnit,
    UnknownUnit,
    Overflow,
}

impl Display for ParseDurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ParseDurationError::InvalidDuration => "invalid duration",
            ParseDurationError::MissingUnit => "missing unit in duration",
            ParseDurationError::UnknownUnit => "unknown unit in duration",
            ParseDurationError::Overflow => "duration out of range",
        };

        f.write_str(msg)
    }
}

impl std::error::Error for ParseDurationError {}

/// Consumes the leading [0-9]*, returns the value, the number of digits
/// and the remaining input.
fn leading_int(s: &str) -> Result<(u128, usize, &str), ParseDurationError> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();

    let value = s[..digits].bytes().try_fold(0u128, |acc, c| {
        acc.checked_mul(10)?.checked_add((c - b'0') as u128)
    });

    match value {
        Some(value) if value <= MAX_NANOS => Ok((value, digits, &s[digits..])),
        _ => Err(ParseDurationError::Overflow),
    }
}

/// Consumes the leading [0-9]* of a fraction. Digits past what u128 can
/// hold only lose precision, they are not an error.
fn leading_fraction(s: &str) -> (u128, u128, usize, &str) {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let mut value = 0u128;
    let mut scale = 1u128;

    for c in s[..digits].bytes() {
        match (value.checked_mul(10), scale.checked_mul(10)) {
            (Some(v), Some(sc)) if sc <= 10u128.pow(20) => {
                value = v + (c - b'0') as u128;
                scale = sc;
            }
            _ => break,
        }
    }

    (value, scale, digits, &s[digits..])
}

fn unit(s: &str) -> Option<u128> {
    let unit = match s {
        "ns" => NANOSECOND,
        // "µs" U+00B5 and "μs" U+03BC
        "us" | "\u{b5}s" | "\u{3bc}s" => MICROSECOND,
        "ms" => MILLISECOND,
        "s" => SECOND,
        "m" => MINUTE,
        "h" => HOUR,
        "d" => DAY,
        _ => return None,
    };

    Some(unit)
}

/// Parses a duration string, a sequence of decimal numbers, each with
/// optional fraction and a unit suffix. Valid units are "ns", "us" (or "µs"),
/// "ms", "s", "m", "h" and "d". Negative durations are rejected.
pub fn parse_duration(text: &str) -> Result<Duration, ParseDurationError> {
    let mut s = text.strip_prefix('+').unwrap_or(text);

    // special case, a bare zero needs no unit
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    if s.is_empty() {
        return Err(ParseDurationError::InvalidDuration);
    }

    let mut total = 0u128;
    while !s.is_empty() {
        let (int, int_digits, remain) = leading_int(s)?;
        s = remain;

        let (mut frac, mut scale, mut frac_digits) = (0, 1, 0);
        if let Some(remain) = s.strip_prefix('.') {
            (frac, scale, frac_digits, s) = leading_fraction(remain);
        }

        if int_digits == 0 && frac_digits == 0 {
            // no digits, e.g. ".s" or "-5s"
            return Err(ParseDurationError::InvalidDuration);
        }

        let end = s
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        if end == 0 {
            return Err(ParseDurationError::MissingUnit);
        }
        let unit = unit(&s[..end]).ok_or(ParseDurationError::UnknownUnit)?;
        s = &s[end..];

        let value = int
            .checked_mul(unit)
            .and_then(|v| v.checked_add(frac * unit / scale))
            .ok_or(ParseDurationError::Overflow)?;

        total = total
            .checked_add(value)
            .filter(|total| *total <= MAX_NANOS)
            .ok_or(ParseDurationError::Overflow)?;
    }

    Ok(Duration::new(
        (total / SECOND) as u64,
        (total % SECOND) as u32,
    ))
}

/// Formats a duration so that `parse_duration` reads it back.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    if d.subsec_nanos() != 0 {
        let nanos = d.as_nanos();
        return if nanos % MILLISECOND == 0 {
            format!("{}ms", nanos / MILLISECOND)
        } else if nanos % MICROSECOND == 0 {
            format!("{}us", nanos / MICROSECOND)
        } else {
            format!("{nanos}ns")
        };
    }

    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    let mut buf = String::new();
    if h != 0 {
        buf.push_str(&format!("{h}h"));
    }
    if m != 0 {
        buf.push_str(&format!("{m}m"));
    }
    if s != 0 {
        buf.push_str(&format!("{s}s"));
    }

    buf
}

/// For `#[serde(with = "crate::duration::serde")]`
pub mod serde {
    use std::time::Duration;

    use ::serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(::serde::de::Error::custom)
    }
}
