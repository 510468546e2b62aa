//! Plan-year calendar helpers
//!
//! Plan years are calendar years. All day counts are inclusive of both the
//! first and last day worked.

use chrono::{Datelike, NaiveDate};

/// First day of a plan year
pub fn year_start(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Last day of a plan year
pub fn year_end(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Number of days in a plan year (365 or 366)
pub fn days_in_year(year: i32) -> u32 {
    year_end(year).ordinal()
}

/// Date for a zero-based day index within a year, clamped to the year
pub fn day_of_year(year: i32, ordinal0: u32) -> NaiveDate {
    let ordinal = (ordinal0 + 1).min(days_in_year(year));
    NaiveDate::from_yo_opt(year, ordinal).unwrap_or_else(|| year_start(year))
}

/// First day of `month` in `year`, clamped to a valid month
pub fn month_start(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month.clamp(1, 12), 1).unwrap_or_else(|| year_start(year))
}

/// Whole years elapsed between two dates (birthdays, service anniversaries)
pub fn completed_years(from: NaiveDate, to: NaiveDate) -> u32 {
    if to < from {
        return 0;
    }
    let mut years = to.year() - from.year();
    if (to.month(), to.day()) < (from.month(), from.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Elapsed years between two dates as a fraction (365.25-day years)
pub fn fractional_years(from: NaiveDate, to: NaiveDate) -> f64 {
    if to < from {
        return 0.0;
    }
    (to - from).num_days() as f64 / 365.25
}

/// Days worked in `year` for an employment span, inclusive on both ends
///
/// A hire on zero-based day `d` works `days_in_year - d` days; a termination
/// on one-based ordinal `t` stops after day `t`.
pub fn days_employed(year: i32, hire_date: NaiveDate, termination_date: Option<NaiveDate>) -> u32 {
    let start = hire_date.max(year_start(year));
    let end = termination_date.map_or(year_end(year), |t| t.min(year_end(year)));
    if end < start {
        return 0;
    }
    ((end - start).num_days() + 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_in_year_handles_leap_years() {
        assert_eq!(days_in_year(2025), 365);
        assert_eq!(days_in_year(2028), 366);
    }

    #[test]
    fn test_completed_years_respects_anniversary() {
        assert_eq!(completed_years(date(1990, 6, 15), date(2025, 6, 14)), 34);
        assert_eq!(completed_years(date(1990, 6, 15), date(2025, 6, 15)), 35);
        assert_eq!(completed_years(date(2025, 6, 15), date(2024, 1, 1)), 0);
    }

    #[test]
    fn test_hire_on_day_300_works_65_days() {
        let hire = day_of_year(2025, 300);
        assert_eq!(days_employed(2025, hire, None), 65);
    }

    #[test]
    fn test_full_year_and_prior_hire() {
        assert_eq!(days_employed(2025, date(2010, 3, 1), None), 365);
        assert_eq!(days_employed(2025, date(2025, 1, 1), None), 365);
    }

    #[test]
    fn test_termination_truncates_span() {
        assert_eq!(days_employed(2025, date(2010, 3, 1), Some(date(2025, 1, 31))), 31);
        assert_eq!(days_employed(2025, date(2025, 2, 1), Some(date(2025, 1, 31))), 0);
    }
}
