//! UTC timestamp normalization policy.
//!
//! Every `created_at` / `fetched_at` / `observed_at` value crossing a
//! repository boundary is an ISO8601 string with an explicit UTC offset.
//! Naive inputs are coerced to UTC on write; malformed stored values read
//! back as the epoch sentinel, never as an error.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Current instant as a stored timestamp string.
pub fn now_stored() -> String {
    to_stored(Utc::now())
}

/// Format an instant per the storage policy (RFC3339, `+00:00` offset).
pub fn to_stored(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Normalize an arbitrary incoming timestamp string for storage.
///
/// Offset-carrying inputs are converted to UTC; naive inputs are assumed
/// to already be UTC wall-clock; anything unparseable becomes the epoch.
pub fn normalize_for_storage(input: &str) -> String {
    to_stored(parse_lenient(input))
}

/// Parse a stored timestamp, falling back to the epoch sentinel.
pub fn parse_stored(stored: &str) -> DateTime<Utc> {
    parse_lenient(stored)
}

/// Epoch sentinel returned for malformed stored values.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

fn parse_lenient(input: &str) -> DateTime<Utc> {
    let trimmed = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.with_timezone(&Utc);
    }

    // Naive forms: seconds or fractional seconds, with either separator.
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Utc.from_utc_datetime(&naive);
        }
    }

    epoch()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn stored_format_has_utc_offset() {
        let stored = now_stored();
        assert!(stored.ends_with("+00:00"), "got: {stored}");
    }

    #[test]
    fn offset_input_converted_to_utc() {
        let stored = normalize_for_storage("2026-03-01T12:00:00+02:00");
        assert_eq!(stored, "2026-03-01T10:00:00.000000+00:00");
    }

    #[test]
    fn naive_input_assumed_utc() {
        let stored = normalize_for_storage("2026-03-01T12:30:45");
        assert_eq!(stored, "2026-03-01T12:30:45.000000+00:00");
        let parsed = parse_stored(&stored);
        assert_eq!(parsed.hour(), 12);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn naive_space_separator_accepted() {
        let stored = normalize_for_storage("2026-03-01 08:00:00.25");
        assert_eq!(stored, "2026-03-01T08:00:00.250000+00:00");
    }

    #[test]
    fn naive_roundtrip_preserves_wall_clock() {
        let stored = normalize_for_storage("2024-06-15T23:59:59");
        let parsed = parse_stored(&stored);
        assert_eq!(to_stored(parsed), stored);
    }

    #[test]
    fn malformed_reads_back_as_epoch() {
        assert_eq!(parse_stored("not a timestamp"), epoch());
        assert_eq!(parse_stored(""), epoch());
        assert_eq!(parse_stored("2026-13-45T99:99:99"), epoch());
    }

    #[test]
    fn epoch_is_utc_zero() {
        assert_eq!(epoch().timestamp(), 0);
    }

    #[test]
    fn stored_values_parse_as_utc_aware() {
        // The parse path never loses the UTC offset.
        let parsed = parse_stored("2026-03-01T10:00:00.000000+00:00");
        assert_eq!(parsed.timezone(), Utc);
    }
}
