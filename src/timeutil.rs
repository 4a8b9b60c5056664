//! TAXII timestamps and relative time ranges

use chrono::{DateTime, Duration, Utc};

use crate::error::FeedError;

/// Wire format for every timestamp the feed produces
pub const TAXII_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const ERR_DATE_RANGE: &str = "date_range must be \"number date_range_unit\", examples: (2 hours, 4 minutes, 6 months, 1 day, etc.)";

pub fn format_taxii_time(ts: DateTime<Utc>) -> String {
    ts.format(TAXII_TIME_FORMAT).to_string()
}

/// Parse a server timestamp. Accepts any RFC 3339 form.
pub fn parse_taxii_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolve `"<number> <unit>"` to the instant that far before `now`.
///
/// Absolute RFC 3339 timestamps are accepted too and returned unchanged
/// (re-rendered in the wire format).
pub fn parse_date_range(expr: &str, now: DateTime<Utc>) -> Result<String, FeedError> {
    if let Some(ts) = parse_taxii_time(expr) {
        return Ok(format_taxii_time(ts));
    }

    let mut parts = expr.split_whitespace();
    let (Some(number), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FeedError::config(ERR_DATE_RANGE));
    };
    let number: i64 = number
        .parse()
        .map_err(|_| FeedError::config(ERR_DATE_RANGE))?;

    let delta = match unit.to_lowercase().as_str() {
        "minute" | "minutes" | "min" | "mins" => Duration::try_minutes(number),
        "hour" | "hours" => Duration::try_hours(number),
        "day" | "days" => Duration::try_days(number),
        "week" | "weeks" => Duration::try_weeks(number),
        "month" | "months" => number.checked_mul(30).and_then(Duration::try_days),
        "year" | "years" => number.checked_mul(365).and_then(Duration::try_days),
        _ => None,
    };

    // Out-of-range amounts are rejected like malformed ones
    delta
        .and_then(|delta| now.checked_sub_signed(delta))
        .map(format_taxii_time)
        .ok_or_else(|| FeedError::config(ERR_DATE_RANGE))
}
