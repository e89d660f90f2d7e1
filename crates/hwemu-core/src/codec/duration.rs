//! Timer period notation: `1h2m3s4ms`.
//!
//! A period is a run of `<integer><unit>` tokens.  Units must appear in
//! strictly decreasing order (`h`, `m`, `s`, `ms`), each at most once.  Minutes
//! and seconds are bounded by 59 and milliseconds by 999; hours are bounded
//! only by the total, which must fit in a `u32` count of milliseconds.

use std::time::Duration;

use thiserror::Error;

/// Reasons a timer period fails to parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty time value")]
    Empty,

    /// A token does not start with a decimal number.
    #[error("no time value before '{0}'")]
    MissingValue(String),

    /// A number is followed by something other than `h`, `m`, `s` or `ms`.
    #[error("invalid time unit '{0}'")]
    UnknownUnit(String),

    /// Units repeat or are not in decreasing order (e.g. `1s2m`).
    #[error("time unit '{0}' out of order")]
    UnitOrder(&'static str),

    #[error("time value {value}{unit} out of range")]
    ValueOutOfRange { value: u64, unit: &'static str },

    #[error("time value too large")]
    Overflow,

    #[error("zero time value")]
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Unit {
    Hours,
    Minutes,
    Seconds,
    Millis,
}

impl Unit {
    const ALL: [Unit; 4] = [Unit::Hours, Unit::Minutes, Unit::Seconds, Unit::Millis];

    fn symbol(self) -> &'static str {
        match self {
            Unit::Hours => "h",
            Unit::Minutes => "m",
            Unit::Seconds => "s",
            Unit::Millis => "ms",
        }
    }

    fn millis(self) -> u64 {
        match self {
            Unit::Hours => 60 * 60 * 1000,
            Unit::Minutes => 60 * 1000,
            Unit::Seconds => 1000,
            Unit::Millis => 1,
        }
    }

    fn max_value(self) -> u64 {
        match self {
            Unit::Hours => u64::MAX,
            Unit::Minutes | Unit::Seconds => 59,
            Unit::Millis => 999,
        }
    }

    fn from_symbol(symbol: &str) -> Option<Unit> {
        Unit::ALL.into_iter().find(|u| u.symbol() == symbol)
    }
}

/// Parses a period such as `2s` or `1h30m`.
///
/// # Errors
///
/// Returns a [`DurationError`] describing the first problem found.
pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    if text.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut rest = text;
    let mut previous: Option<Unit> = None;
    let mut total: u64 = 0;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(DurationError::MissingValue(rest.to_string()));
        }
        let (digits, tail) = rest.split_at(digits_end);

        let unit_end = tail
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(tail.len());
        let (symbol, tail) = tail.split_at(unit_end);
        let unit =
            Unit::from_symbol(symbol).ok_or_else(|| DurationError::UnknownUnit(symbol.to_string()))?;

        if previous.is_some_and(|p| unit <= p) {
            return Err(DurationError::UnitOrder(unit.symbol()));
        }

        let value: u64 = digits.parse().map_err(|_| DurationError::Overflow)?;
        if value > unit.max_value() {
            return Err(DurationError::ValueOutOfRange {
                value,
                unit: unit.symbol(),
            });
        }

        total = value
            .checked_mul(unit.millis())
            .and_then(|ms| total.checked_add(ms))
            .filter(|&t| t <= u64::from(u32::MAX))
            .ok_or(DurationError::Overflow)?;

        previous = Some(unit);
        rest = tail;
    }

    if total == 0 {
        return Err(DurationError::Zero);
    }
    Ok(Duration::from_millis(total))
}

/// Renders a period in canonical form: non-zero components only, largest
/// unit first, e.g. `1h5ms`.
///
/// Sub-millisecond precision is truncated.  A zero period renders as `0ms`.
pub fn format_duration(period: Duration) -> String {
    let mut remaining = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
    if remaining == 0 {
        return "0ms".to_string();
    }

    let mut out = String::new();
    for unit in Unit::ALL {
        let value = remaining / unit.millis();
        remaining %= unit.millis();
        if value > 0 {
            out.push_str(&value.to_string());
            out.push_str(unit.symbol());
        }
    }
    out
}
