//! Warranty clock arithmetic
//!
//! Pure helpers for converting a finish time plus a warranty-day count into
//! an expiry instant, and for measuring what is left of a running window.
//! Business logic never reads the ambient clock; callers pass `now` in.

use chrono::{DateTime, Days, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Compute the warranty expiry instant: `finished_at` plus `warranty_days`
/// calendar days. Negative day counts are treated as zero.
pub fn compute_expiry(finished_at: DateTime<Utc>, warranty_days: i64) -> DateTime<Utc> {
    let days = warranty_days.max(0) as u64;
    finished_at
        .checked_add_days(Days::new(days))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole days left before `expires_at`, rounded up, floored at zero.
pub fn remaining_days(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    let millis = (expires_at - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    }
}

/// Whether the window has closed at `now`. The boundary instant counts as
/// expired.
pub fn is_expired(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
    now >= expires_at
}
