//! CPU-hour consumption arithmetic.

use chrono::Days;

use crate::types::{start_of_day, Timestamp};

/// Value reported when there is no consumption or the ratio is undefined.
pub const ZERO_USAGE: &str = "0%";

/// Format consumption against a grant as a percentage string.
///
/// Zero consumption yields `"0%"`; otherwise one decimal place is kept,
/// e.g. `"25.0%"`. Returns `None` when the ratio cannot be computed
/// (zero or negative grant), so callers can log before falling back.
pub fn try_usage_percent(consumed: i64, granted: i64) -> Option<String> {
    if consumed == 0 {
        return Some(ZERO_USAGE.to_string());
    }
    if granted <= 0 {
        return None;
    }
    let ratio = consumed as f64 / granted as f64 * 100.0;
    ratio.is_finite().then(|| format!("{ratio:.1}%"))
}

/// Sum project-wide sample rows, ignoring rows attributed to a single user.
pub fn project_total<'a, I>(samples: I) -> i64
where
    I: IntoIterator<Item = (Option<&'a str>, i64)>,
{
    samples
        .into_iter()
        .filter(|(login, _)| login.is_none())
        .map(|(_, hours)| hours)
        .sum()
}

/// Split `[since, until)` at UTC midnights.
///
/// Each window covers at most one calendar day, so one sample per day sums
/// to the consumption of the whole interval. Empty when `since >= until`.
pub fn daily_windows(since: Timestamp, until: Timestamp) -> Vec<(Timestamp, Timestamp)> {
    let mut windows = Vec::new();
    let mut start = since;
    while start < until {
        let next_midnight = start
            .date_naive()
            .checked_add_days(Days::new(1))
            .map(start_of_day)
            .unwrap_or(until);
        let end = next_midnight.min(until);
        windows.push((start, end));
        start = end;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn zero_consumption_is_zero_percent() {
        assert_eq!(try_usage_percent(0, 100).as_deref(), Some("0%"));
        assert_eq!(try_usage_percent(0, 0).as_deref(), Some("0%"));
    }

    #[test]
    fn quarter_consumption_keeps_one_decimal() {
        assert_eq!(try_usage_percent(25, 100).as_deref(), Some("25.0%"));
        assert_eq!(try_usage_percent(1, 3).as_deref(), Some("33.3%"));
    }

    #[test]
    fn zero_grant_does_not_divide() {
        assert_eq!(try_usage_percent(10, 0), None);
        assert_eq!(try_usage_percent(10, -5), None);
    }

    #[test]
    fn overconsumption_exceeds_one_hundred() {
        assert_eq!(try_usage_percent(150, 100).as_deref(), Some("150.0%"));
    }

    #[test]
    fn project_total_skips_user_rows() {
        let rows = vec![(None, 40), (Some("alice"), 30), (Some("bob"), 10), (None, 5)];
        assert_eq!(project_total(rows), 45);
    }

    #[test]
    fn windows_break_at_midnight() {
        let since = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 1, 12, 6, 30, 0).unwrap();
        let windows = daily_windows(since, until);
        assert_eq!(
            windows,
            vec![
                (since, Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap()),
                (
                    Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap()
                ),
                (Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap(), until),
            ]
        );
    }

    #[test]
    fn empty_interval_has_no_window() {
        let at = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(daily_windows(at, at).is_empty());
        assert!(daily_windows(at, at - chrono::Duration::hours(1)).is_empty());
    }
}
