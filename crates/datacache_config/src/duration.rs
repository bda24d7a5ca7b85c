//! Parsing of human-readable durations such as `"7d"` or `"30m"`.

use std::time::Duration;

use crate::error::ConfigError;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// Parses a duration like `"90"`, `"90s"`, `"30m"`, `"24h"`, `"7d"` or `"2w"`.
///
/// A bare number is seconds. Whitespace and case are ignored.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let text = input.trim().to_ascii_lowercase();
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let scale = match unit.trim() {
        "" | "s" => 1,
        "m" => MINUTE,
        "h" => HOUR,
        "d" => DAY,
        "w" => WEEK,
        _ => return Err(invalid()),
    };

    value
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Composes a tolerance from days, hours, minutes and seconds, saturating
/// at `u64::MAX` seconds.
pub fn tolerance(days: u64, hours: u64, minutes: u64, seconds: u64) -> Duration {
    let secs = seconds
        .saturating_add(MINUTE.saturating_mul(minutes))
        .saturating_add(HOUR.saturating_mul(hours))
        .saturating_add(DAY.saturating_mul(days));
    Duration::from_secs(secs)
}
