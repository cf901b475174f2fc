use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Errors produced while parsing a duration string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("duration is empty")]
    Empty,
    #[error("invalid number in duration: {0:?}")]
    InvalidNumber(String),
    #[error("missing unit in duration (expected one of ns, us, ms, s, m, h)")]
    MissingUnit,
    #[error("unknown unit {0:?} in duration")]
    UnknownUnit(String),
    #[error("negative durations are not allowed")]
    Negative,
    #[error("duration is too large")]
    Overflow,
}

/// Parses a duration written as a sequence of decimal numbers with unit
/// suffixes, such as `300ms`, `1m0s`, `1.5h` or `2h45m`.
///
/// Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is
/// accepted as zero. A leading `-` is only accepted when the total is zero;
/// negative spans are rejected because `Duration` cannot represent them.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    let (negative, mut rest) = match s.as_bytes().first() {
        None => return Err(DurationError::Empty),
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        Some(_) => (false, s),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_end];
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        if number.is_empty() {
            return Err(DurationError::InvalidNumber(unit.to_string()));
        }
        if unit.is_empty() {
            return Err(DurationError::MissingUnit);
        }

        let span = component_nanos(number, unit_nanos(unit)?)?;
        total = total.checked_add(span).ok_or(DurationError::Overflow)?;
    }

    if negative && total > 0 {
        return Err(DurationError::Negative);
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| DurationError::Overflow)?;
    // Remainder is always below one second
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

fn unit_nanos(unit: &str) -> Result<u128, DurationError> {
    match unit {
        "ns" => Ok(1),
        "us" | "µs" | "μs" => Ok(1_000),
        "ms" => Ok(1_000_000),
        "s" => Ok(NANOS_PER_SEC),
        "m" => Ok(60 * NANOS_PER_SEC),
        "h" => Ok(3_600 * NANOS_PER_SEC),
        other => Err(DurationError::UnknownUnit(other.to_string())),
    }
}

/// Converts one `<number><unit>` component to nanoseconds, truncating
/// fractional nanoseconds.
fn component_nanos(number: &str, unit: u128) -> Result<u128, DurationError> {
    let invalid = || DurationError::InvalidNumber(number.to_string());

    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut nanos = whole.checked_mul(unit).ok_or(DurationError::Overflow)?;

    if !frac.is_empty() {
        // Digits beyond nanosecond precision of the largest unit cannot change the result
        let digits = &frac[..frac.len().min(18)];
        let value: u128 = digits.parse().map_err(|_| invalid())?;
        nanos = nanos
            .checked_add(value * unit / 10u128.pow(digits.len() as u32))
            .ok_or(DurationError::Overflow)?;
    }

    Ok(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parses_common_forms() {
        assert_eq!(parse_duration("1m0s"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("300ms"), Ok(Duration::from_millis(300)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("2h45m"), Ok(Duration::from_secs(9_900)));
        assert_eq!(parse_duration("10µs"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("+30s"), Ok(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_forms() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("-0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert_eq!(parse_duration("   "), Err(DurationError::Empty));
        assert_eq!(parse_duration("-"), Err(DurationError::Empty));
        assert_eq!(parse_duration("60"), Err(DurationError::MissingUnit));
        assert_eq!(parse_duration("1m30"), Err(DurationError::MissingUnit));
        assert_eq!(parse_duration("5d"), Err(DurationError::UnknownUnit("d".into())));
        assert_eq!(parse_duration("-1m"), Err(DurationError::Negative));
        assert!(matches!(parse_duration("1..5s"), Err(DurationError::InvalidNumber(_))));
        assert!(matches!(parse_duration("s"), Err(DurationError::InvalidNumber(_))));
        assert!(parse_duration(".").is_err());
    }

    #[test]
    fn test_overflow_detected() {
        let huge = format!("{}h", u128::MAX);
        assert!(parse_duration(&huge).is_err());
        assert_eq!(
            parse_duration("9999999999999999999h"),
            Err(DurationError::Overflow)
        );
        // Whole part fits, the fraction tips it over
        assert_eq!(
            parse_duration("94522879700260684295381835.9h"),
            Err(DurationError::Overflow)
        );
    }

    proptest! {
        #[test]
        fn hours_minutes_seconds_sum(h in 0u64..1_000, m in 0u64..60, s in 0u64..60) {
            let parsed = parse_duration(&format!("{h}h{m}m{s}s")).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(h * 3_600 + m * 60 + s));
        }

        #[test]
        fn never_panics(input in "\\PC{0,16}") {
            let _ = parse_duration(&input);
        }
    }
}
