//! Second-precision timestamp handling.
//!
//! Every timestamp in the system — ingested, persisted, compared, or
//! emitted — is normalized to UTC and truncated to whole seconds.
//! Range filters are inclusive at second precision, so a single
//! normalization point avoids false exclusion at the boundaries.

use time::error;
use time::format_description::well_known::Rfc3339;
use time::macros::{format_description, time};
use time::{Date, OffsetDateTime};

/// Normalize a timestamp: shift to UTC and drop sub-second precision.
pub fn truncate_to_second(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(time::UtcOffset::UTC);
    utc.replace_nanosecond(0).unwrap_or(utc)
}

/// The current wall-clock time, already normalized.
pub fn now_utc_second() -> OffsetDateTime {
    truncate_to_second(OffsetDateTime::now_utc())
}

/// Format a normalized timestamp as RFC 3339.
///
/// Because every persisted timestamp is UTC at whole seconds, the
/// output is uniform and lexicographic string order equals
/// chronological order, which the storage layer's range queries rely
/// on.
pub fn format_rfc3339(ts: OffsetDateTime) -> Result<String, error::Format> {
    truncate_to_second(ts).format(&Rfc3339)
}

/// Parse an RFC 3339 timestamp, normalizing the result.
pub fn parse_rfc3339(s: &str) -> Result<OffsetDateTime, error::Parse> {
    OffsetDateTime::parse(s, &Rfc3339).map(truncate_to_second)
}

/// Format a calendar day as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> Result<String, error::Format> {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format)
}

/// Parse a strict `YYYY-MM-DD` calendar day.
pub fn parse_date(s: &str) -> Result<Date, error::Parse> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(s, &format)
}

/// First instant of a calendar day, UTC.
pub fn day_start(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}

/// Last whole second of a calendar day, UTC. Pairs with [`day_start`]
/// to turn an inclusive date range into an inclusive timestamp range.
pub fn day_end(date: Date) -> OffsetDateTime {
    date.with_time(time!(23:59:59)).assume_utc()
}
