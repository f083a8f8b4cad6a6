//! Retention arithmetic for replicated snapshots.

use crate::clock::USECS_PER_DAY;

/// Days a replica must be kept so it expires together with the original
/// snapshot. Rounded half-to-even, never less than one day.
pub fn days_until_expiry(expiry_usecs: i64, now_usecs: i64) -> u32 {
    let days = ((expiry_usecs - now_usecs) as f64 / USECS_PER_DAY as f64).round_ties_even();
    if days < 1.0 {
        1
    } else {
        days as u32
    }
}

/// Retention for a replica: the operator's fixed value when one was given
/// (`keep_for > 0`), otherwise derived from the original expiry.
pub fn replica_days(keep_for: u32, expiry_usecs: Option<i64>, now_usecs: i64) -> Option<u32> {
    if keep_for > 0 {
        return Some(keep_for);
    }
    expiry_usecs.map(|e| days_until_expiry(e, now_usecs))
}
