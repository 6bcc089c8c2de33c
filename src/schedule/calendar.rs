use chrono::{Datelike, NaiveDate, Weekday};

use crate::domain::DeliveryMode;

/// The next `count` calendar dates starting at (and possibly including)
/// `start` that are valid under `mode` (S3): `WeekdayDaily` skips Saturday
/// and Sunday, `SundayOnly` keeps only Sundays.
pub fn next_valid_dates(start: NaiveDate, count: usize, mode: DeliveryMode) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = start;
    while dates.len() < count {
        let valid = match mode {
            DeliveryMode::WeekdayDaily => !matches!(day.weekday(), Weekday::Sat | Weekday::Sun),
            DeliveryMode::SundayOnly => day.weekday() == Weekday::Sun,
        };
        if valid {
            dates.push(day);
        }
        day = day.succ_opt().expect("chrono date range exceeded");
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_daily_skips_the_weekend() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(); // Monday
        let dates = next_valid_dates(start, 7, DeliveryMode::WeekdayDaily);
        let expected: Vec<NaiveDate> = ["2024-06-03", "2024-06-04", "2024-06-05", "2024-06-06", "2024-06-07", "2024-06-10", "2024-06-11"]
            .iter()
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
            .collect();
        assert_eq!(dates, expected);
    }

    #[test]
    fn sunday_only_keeps_just_sundays() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(); // Monday
        let dates = next_valid_dates(start, 3, DeliveryMode::SundayOnly);
        for d in &dates {
            assert_eq!(d.weekday(), Weekday::Sun);
        }
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2024, 6, 23).unwrap());
    }

    #[test]
    fn start_date_itself_counts_if_valid() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap(); // Sunday
        let dates = next_valid_dates(start, 1, DeliveryMode::SundayOnly);
        assert_eq!(dates[0], start);
    }
}
