//! Human-readable duration strings used in the config file and env overrides.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(ms|h|m|s)").expect("valid duration regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration \"{0}\" (expected e.g. 500ms, 30s, 2m, 1h30m)")]
pub struct DurationParseError(pub String);

/// Parse `500ms`, `30s`, `2m`, `1h`, combinations like `1h30m`, or a bare
/// integer meaning seconds.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError(input.to_string()));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in SEGMENT_PATTERN.captures_iter(s) {
        let whole = caps.get(0).ok_or_else(|| DurationParseError(input.to_string()))?;
        // Segments must be contiguous; anything in between is garbage.
        if whole.start() != consumed {
            return Err(DurationParseError(input.to_string()));
        }
        consumed = whole.end();

        let value: u64 = caps[1]
            .parse()
            .map_err(|_| DurationParseError(input.to_string()))?;
        total += match &caps[2] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            _ => Duration::from_secs(value * 3600),
        };
    }

    if consumed != s.len() {
        return Err(DurationParseError(input.to_string()));
    }
    Ok(total)
}

/// Inverse of [`parse_duration`], choosing the largest exact units.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }

    let mut secs = d.as_secs();
    let mut out = String::new();
    for (unit, size) in [("h", 3600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{unit}", secs / size));
            secs %= size;
        }
    }
    out
}

/// Serde adapter storing `Duration` as a duration string.
pub mod serde_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parses_combined_and_bare_seconds() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten seconds").is_err());
        assert!(parse_duration("10s junk").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn formats_largest_units() {
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
    }
}
