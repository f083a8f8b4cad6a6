//! Wall-clock helpers. The cluster speaks microseconds since the epoch.

use time::macros::format_description;
use time::OffsetDateTime;

pub const USECS_PER_SEC: i64 = 1_000_000;
pub const USECS_PER_DAY: i64 = 86_400 * USECS_PER_SEC;

pub fn now_usecs() -> i64 {
    usecs(OffsetDateTime::now_utc())
}

fn usecs(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000) as i64
}

fn local(t: OffsetDateTime) -> OffsetDateTime {
    match time::UtcOffset::current_local_offset() {
        Ok(offset) => t.to_offset(offset),
        Err(_) => t,
    }
}

fn format(t: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    t.format(&fmt).unwrap_or_else(|_| t.unix_timestamp().to_string())
}

/// `YYYY-MM-DD HH:MM:SS` in local time, falling back to UTC when the local
/// offset cannot be determined.
pub fn usecs_to_date(usecs: i64) -> String {
    match OffsetDateTime::from_unix_timestamp_nanos(i128::from(usecs) * 1_000) {
        Ok(t) => format(local(t)),
        Err(_) => usecs.to_string(),
    }
}

pub fn timestamp() -> String {
    format(local(OffsetDateTime::now_utc()))
}
