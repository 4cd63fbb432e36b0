//! Wall-clock helpers. All scheduler timestamps are milliseconds since the Unix epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

/// Convert a duration expressed in (possibly fractional) seconds to milliseconds.
///
/// `None` for negative or non-finite input and for values too large to
/// represent as a [`Duration`].
pub fn secs_to_ms(secs: f64) -> Option<u128> {
    Duration::try_from_secs_f64(secs).ok().map(|d| d.as_millis())
}

/// Milliseconds since epoch for a UTC timestamp, `None` when it predates the epoch.
pub fn datetime_to_ms(dt: &DateTime<Utc>) -> Option<u128> {
    u128::try_from(dt.timestamp_millis()).ok()
}

/// Render an epoch-millisecond timestamp as RFC 3339 for wire responses.
pub fn ms_to_rfc3339(ms: u128) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339())
}
