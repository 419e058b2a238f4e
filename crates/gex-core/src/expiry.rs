//! Expiration calendar utilities.
//!
//! Provides:
//! - Standard monthly expiration detection (third Friday)
//! - Root remapping for index options with separate weekly roots
//! - Default expiry selection (nearest Friday)

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Underliers whose non-standard expirations trade under an alternate root.
const WEEKLY_ROOTS: [(&str, &str); 3] = [("SPX", "SPXW"), ("NDX", "NDXP"), ("RUT", "RUTW")];

/// Third Friday of the given month: first Friday plus 14 days.
#[must_use]
pub fn third_friday(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let days_to_friday = (Weekday::Fri.num_days_from_monday() + 7
        - first.weekday().num_days_from_monday())
        % 7;
    Some(first + Duration::days(i64::from(days_to_friday) + 14))
}

/// Check if a date is the standard monthly expiration.
#[must_use]
pub fn is_third_friday(date: NaiveDate) -> bool {
    third_friday(date.year(), date.month()) == Some(date)
}

/// Root used in option identifiers for `root` expiring on `expiry`.
///
/// SPX, NDX and RUT list their non-monthly expirations under SPXW, NDXP and
/// RUTW. On the third Friday the standard root is kept.
#[must_use]
pub fn option_root(root: &str, expiry: NaiveDate) -> String {
    if is_third_friday(expiry) {
        return root.to_string();
    }
    WEEKLY_ROOTS
        .iter()
        .find(|(standard, _)| *standard == root)
        .map(|(_, weekly)| (*weekly).to_string())
        .unwrap_or_else(|| root.to_string())
}

/// Nearest Friday on or after `from`.
#[must_use]
pub fn nearest_friday(from: NaiveDate) -> NaiveDate {
    let days_ahead = (Weekday::Fri.num_days_from_monday() + 7
        - from.weekday().num_days_from_monday())
        % 7;
    from + Duration::days(i64::from(days_ahead))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_third_friday_month_starting_friday() {
        // 2025-08-01 is a Friday
        assert_eq!(third_friday(2025, 8), Some(date(2025, 8, 15)));
    }

    #[test]
    fn test_third_friday_month_starting_saturday() {
        // 2025-02-01 is a Saturday
        assert_eq!(third_friday(2025, 2), Some(date(2025, 2, 21)));
    }

    #[test]
    fn test_third_friday_various_months() {
        assert_eq!(third_friday(2025, 1), Some(date(2025, 1, 17)));
        assert_eq!(third_friday(2025, 3), Some(date(2025, 3, 21)));
        assert_eq!(third_friday(2025, 9), Some(date(2025, 9, 19)));
        assert_eq!(third_friday(2026, 10), Some(date(2026, 10, 16)));
    }

    #[test]
    fn test_third_friday_invalid_month() {
        assert_eq!(third_friday(2025, 13), None);
    }

    #[test]
    fn test_is_third_friday() {
        assert!(is_third_friday(date(2025, 1, 17)));
        assert!(!is_third_friday(date(2025, 1, 10)));
        assert!(!is_third_friday(date(2025, 1, 24)));
        // Thursday before the third Friday
        assert!(!is_third_friday(date(2025, 1, 16)));
    }

    #[test]
    fn test_option_root_weekly_remap() {
        let weekly = date(2025, 1, 29);
        assert_eq!(option_root("SPX", weekly), "SPXW");
        assert_eq!(option_root("NDX", weekly), "NDXP");
        assert_eq!(option_root("RUT", weekly), "RUTW");
    }

    #[test]
    fn test_option_root_monthly_unchanged() {
        let monthly = date(2025, 1, 17);
        assert_eq!(option_root("SPX", monthly), "SPX");
        assert_eq!(option_root("NDX", monthly), "NDX");
    }

    #[test]
    fn test_option_root_other_underliers_unchanged() {
        assert_eq!(option_root("SPY", date(2025, 1, 29)), "SPY");
        assert_eq!(option_root("QQQ", date(2025, 1, 17)), "QQQ");
    }

    #[test]
    fn test_nearest_friday() {
        // 2026-10-16 is a Friday
        assert_eq!(nearest_friday(date(2026, 10, 16)), date(2026, 10, 16));
        assert_eq!(nearest_friday(date(2026, 10, 12)), date(2026, 10, 16));
        // Saturday rolls to the next week
        assert_eq!(nearest_friday(date(2026, 10, 17)), date(2026, 10, 23));
    }
}
