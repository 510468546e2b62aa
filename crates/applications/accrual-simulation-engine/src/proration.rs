//! Partial-year proration
//!
//! Earned compensation is the day-weighted average of the salary rates in
//! effect while the employee was employed, against the plan year's day count.
//! Hours are credited against a 2080-hour annual baseline in the same
//! proportion.

use accrual_core::calendar;
use chrono::NaiveDate;

/// Full-time hours in a plan year
pub const ANNUAL_HOURS: f64 = 2080.0;

/// A salary rate taking effect on a date
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SalaryChange {
    pub effective_date: NaiveDate,
    pub annual_salary: f64,
}

/// Employment span and salary history for one employee-year
#[derive(Debug, Clone)]
pub struct EmploymentSpan<'a> {
    pub year: i32,
    pub hire_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
    /// Rate in effect on the first day worked in the year
    pub starting_salary: f64,
    /// Rate changes within the year, in date order
    pub changes: &'a [SalaryChange],
}

impl EmploymentSpan<'_> {
    /// Days employed in the plan year, inclusive
    pub fn days_employed(&self) -> u32 {
        calendar::days_employed(self.year, self.hire_date, self.termination_date)
    }

    /// Fraction of the plan year employed
    pub fn fraction(&self) -> f64 {
        self.days_employed() as f64 / calendar::days_in_year(self.year) as f64
    }

    /// Credited hours against the 2080-hour baseline
    pub fn hours_worked(&self) -> f64 {
        ANNUAL_HOURS * self.fraction()
    }

    /// Compensation earned in the plan year
    ///
    /// Each salary segment contributes `rate * days_in_segment / days_in_year`.
    /// With no changes this reduces to `salary * days_employed / days_in_year`.
    pub fn earned_compensation(&self) -> f64 {
        let days_in_year = calendar::days_in_year(self.year) as f64;
        let first = self.hire_date.max(calendar::year_start(self.year));
        let last = self
            .termination_date
            .map_or(calendar::year_end(self.year), |t| t.min(calendar::year_end(self.year)));
        if last < first {
            return 0.0;
        }

        let mut earned = 0.0;
        let mut rate = self.starting_salary;
        let mut segment_start = first;
        for change in self.changes {
            if change.effective_date <= segment_start {
                rate = change.annual_salary;
                continue;
            }
            if change.effective_date > last {
                break;
            }
            let days = (change.effective_date - segment_start).num_days() as f64;
            earned += rate * days / days_in_year;
            segment_start = change.effective_date;
            rate = change.annual_salary;
        }
        let days = ((last - segment_start).num_days() + 1) as f64;
        earned += rate * days / days_in_year;
        accrual_core::round_cents(earned)
    }
}
