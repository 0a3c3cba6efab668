// Export timestamp handling
//
// Exports write naive UTC timestamps as `YYYY-MM-DD HH:MM:SS[.ffffff]`;
// subsystem payloads use a `T` separator, an optional zone suffix and
// sometimes more than microsecond precision.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

const EXPORT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse an export timestamp into microseconds since the Unix epoch
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let trimmed = raw.trim().trim_end_matches('Z');
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replacen('T', " ", 1);
    NaiveDateTime::parse_from_str(&normalized, EXPORT_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_micros())
}

/// Content-subsystem timestamps: at most millisecond precision is kept
pub fn parse_content_timestamp(raw: &str) -> Option<i64> {
    let end = raw.char_indices().nth(23).map_or(raw.len(), |(i, _)| i);
    parse_timestamp(&raw[..end])
}

/// Entitlement-subsystem timestamps: the `+hhmm` zone suffix is dropped
pub fn parse_entitlement_timestamp(raw: &str) -> Option<i64> {
    raw.split('+').next().and_then(parse_timestamp)
}

/// Parse a user-supplied point in time: seconds since epoch or an export timestamp
pub fn parse_time_arg(raw: &str) -> Option<i64> {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() => Some((secs * 1_000_000.0).round() as i64),
        Ok(_) => None,
        Err(_) => parse_timestamp(raw),
    }
}

/// Current wall-clock time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// RFC 3339 rendering with microsecond precision
pub fn format_micros(micros: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, false))
        .unwrap_or_else(|| micros.to_string())
}
