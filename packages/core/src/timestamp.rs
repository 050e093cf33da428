//! Text encoding for time columns.
//!
//! SQLite has no native datetime type, so every time column is TEXT and the
//! time indexes order rows lexicographically. Writes therefore use a single
//! fixed-width RFC 3339 form (nanosecond precision, `Z` suffix) so string
//! order and chronological order agree.
//!
//! Rows written by other tools may use a different UTC suffix for the same
//! second (`Z`, `+00:00`, any fractional width). Range scans therefore
//! compare against whole-second keys with no suffix, which bracket every
//! spelling of a second, and the caller filters the decoded instants.

use chrono::{DateTime, Datelike, Duration, DurationRound, NaiveDateTime, SecondsFormat, Utc};

use crate::error::StoreError;

/// Encode a UTC timestamp in the canonical stored form,
/// e.g. `2024-01-01T00:00:00.000000000Z`.
pub fn encode(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Inclusive lower scan key: the second containing `instant`, with no
/// fraction or suffix. Every spelling of that second sorts at or after it.
pub fn lower_bound_key(instant: &DateTime<Utc>) -> String {
    second_key(instant)
}

/// Exclusive upper scan key: the second after the one containing `instant`.
/// Every spelling of `instant`'s second sorts before it.
pub fn upper_bound_key(instant: &DateTime<Utc>) -> String {
    instant
        .checked_add_signed(Duration::seconds(1))
        .map(|next| second_key(&next))
        .unwrap_or_else(|| AFTER_ALL_KEYS.to_string())
}

/// Sorts after any key that starts with a digit.
const AFTER_ALL_KEYS: &str = "~";

/// Years outside 0..=9999 do not format as four digits, so they map to the
/// ends of the key space instead.
fn second_key(instant: &DateTime<Utc>) -> String {
    match instant.year() {
        year if year < 0 => String::new(),
        year if year > 9999 => AFTER_ALL_KEYS.to_string(),
        _ => instant
            .duration_trunc(Duration::seconds(1))
            .unwrap_or(*instant)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
    }
}

/// Decode a stored time column.
///
/// Accepts any RFC 3339 string, plus SQLite's own
/// `YYYY-MM-DD HH:MM:SS[.fff]` form for rows written by `datetime('now')`.
pub fn decode(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::corrupt_row(format!("unparseable timestamp '{}'", raw)))
}
