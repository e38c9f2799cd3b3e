//! Parsers for the string forms configuration values arrive in.

use std::time::Duration;

/// Error returned by [`parse_duration`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    /// The input was empty or whitespace.
    #[error("empty duration")]
    Empty,

    /// A component had no digits in front of its unit.
    #[error("missing number before unit in {0:?}")]
    MissingNumber(String),

    /// A unit other than `ms`, `s`, `m` or `h` was used.
    #[error("unknown duration unit {unit:?} in {input:?}")]
    UnknownUnit {
        /// The offending unit.
        unit: String,
        /// The full input.
        input: String,
    },

    /// The value does not fit in a `Duration`.
    #[error("duration {0:?} is too large")]
    Overflow(String),
}

/// Parses a duration such as `10s`, `500ms`, `1m30s`, `2h` or a bare number
/// of seconds (`15`).
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(DurationParseError::MissingNumber(trimmed.to_string()));
        }
        let amount: u64 = rest[..digits_end]
            .parse()
            .map_err(|_| DurationParseError::Overflow(trimmed.to_string()))?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let part = match unit {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => amount
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| DurationParseError::Overflow(trimmed.to_string()))?,
            "h" => amount
                .checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or_else(|| DurationParseError::Overflow(trimmed.to_string()))?,
            other => {
                return Err(DurationParseError::UnknownUnit {
                    unit: other.to_string(),
                    input: trimmed.to_string(),
                })
            }
        };
        total = total
            .checked_add(part)
            .ok_or_else(|| DurationParseError::Overflow(trimmed.to_string()))?;
    }
    Ok(total)
}

/// Parses a boolean flag. Accepts `true/false`, `1/0`, `yes/no` and `on/off`
/// in any case.
pub fn parse_flag(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 1m30s "), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1s500ms"), Ok(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert!(matches!(
            parse_duration("ms"),
            Err(DurationParseError::MissingNumber(_))
        ));
        assert!(matches!(
            parse_duration("5d"),
            Err(DurationParseError::UnknownUnit { .. })
        ));
        assert!(matches!(
            parse_duration("-5s"),
            Err(DurationParseError::MissingNumber(_))
        ));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("on"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("No"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
