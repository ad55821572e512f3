//! Streak calculation from distinct activity dates
//!
//! A streak is the run of consecutive UTC days with at least one
//! qualifying completion, ending today or yesterday. A student who was
//! active yesterday but not yet today still holds their streak.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;

/// Longest walk the calculator performs before giving up.
pub const MAX_STREAK_DAYS: u32 = 365;

/// Count consecutive active days ending at `today` (or yesterday when
/// today has no activity yet). Returns 0 when neither is present.
pub fn streak_from(today: NaiveDate, active_days: &BTreeSet<NaiveDate>) -> u32 {
    let yesterday = today - Duration::days(1);

    let mut cursor = if active_days.contains(&today) {
        today
    } else if active_days.contains(&yesterday) {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0u32;
    while active_days.contains(&cursor) && streak < MAX_STREAK_DAYS {
        streak += 1;
        cursor -= Duration::days(1);
    }

    streak
}
