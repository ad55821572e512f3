//! Period boundaries for activity idempotency keys
//!
//! All boundaries are computed in UTC. Callers never pass local time.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

/// Current UTC calendar day.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// ISO week number identifying a gauntlet period. The ISO year can differ
/// from the calendar year around January 1st, so both parts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoWeek {
    pub year: i32,
    pub week: i32,
}

pub fn iso_week_of(date: NaiveDate) -> IsoWeek {
    let iso = date.iso_week();
    IsoWeek {
        year: iso.year(),
        week: iso.week() as i32,
    }
}

/// Start of the current UTC calendar month, for monthly reconciliation.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_week_mid_year() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let week = iso_week_of(date);
        assert_eq!(week.year, 2026);
        assert_eq!(week.week, 32);
    }

    #[test]
    fn test_iso_week_year_boundary() {
        // Jan 1st 2027 falls in ISO week 53 of 2026.
        let date = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        let week = iso_week_of(date);
        assert_eq!(week.year, 2026);
        assert_eq!(week.week, 53);
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 15, 30, 0).unwrap();
        let start = month_start(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap());
    }
}
