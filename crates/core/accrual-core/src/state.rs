//! Per-employee, per-year plan state
//!
//! [`EmployeeYearState`] is the accumulator's output for one employee in one
//! year. A [`YearSnapshot`] holds every employee's state for a year and can
//! only be mutated until it is finalized.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calendar;
use crate::error::{AccrualError, Result};
use crate::types::{
    EmployeeId, EmploymentStatus, EnrollmentSource, EnrollmentStatus, Level, PerformanceTier,
};

/// Accumulated state for one employee at the end of one simulation year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeYearState {
    pub employee_id: EmployeeId,
    pub simulation_year: i32,
    pub status: EmploymentStatus,

    pub birth_date: NaiveDate,
    pub hire_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
    pub hired_this_year: bool,
    pub terminated_this_year: bool,

    pub level: Level,
    pub performance_tier: PerformanceTier,

    /// Salary rate in effect at year end (or at termination)
    pub annual_salary: f64,
    /// Compensation actually earned in the year, prorated by days employed
    pub prorated_compensation: f64,
    /// Hours credited in the year against the 2080-hour baseline
    pub hours_worked: f64,

    /// Age at year end (or at termination)
    pub age: u32,
    /// Completed years of service at year end (or at termination)
    pub tenure_years: u32,
    pub tenure_fraction: f64,

    pub deferral_rate: f64,
    /// Rate reported by the census import, kept as the last-resort fallback
    pub census_deferral_rate: Option<f64>,
    pub enrollment_status: EnrollmentStatus,
    pub enrollment_source: Option<EnrollmentSource>,
    pub enrollment_date: Option<NaiveDate>,

    pub employee_deferrals: f64,
    pub employer_match: f64,
    pub employer_core: f64,
    /// Whether the statutory compensation limit capped this year's formula base
    pub compensation_capped: bool,
    pub cumulative_employer_contributions: f64,

    /// Years credited toward vesting
    pub vesting_service_years: u32,
}

impl EmployeeYearState {
    pub fn is_active(&self) -> bool {
        self.status == EmploymentStatus::Active
    }

    pub fn is_enrolled(&self) -> bool {
        self.enrollment_status == EnrollmentStatus::Enrolled
    }

    /// Employer money credited in this year
    pub fn employer_contributions(&self) -> f64 {
        self.employer_match + self.employer_core
    }

    /// Age on a given date
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        calendar::completed_years(self.birth_date, date)
    }

    /// Completed service on a given date
    pub fn tenure_on(&self, date: NaiveDate) -> u32 {
        calendar::completed_years(self.hire_date, date)
    }
}

/// One record from the baseline workforce census
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensusRecord {
    pub employee_id: EmployeeId,
    pub birth_date: NaiveDate,
    pub hire_date: NaiveDate,
    pub level: Level,
    pub annual_salary: f64,
    #[serde(default)]
    pub performance_tier: PerformanceTier,
    #[serde(default)]
    pub deferral_rate: Option<f64>,
    #[serde(default)]
    pub vesting_service_years: Option<u32>,
    #[serde(default)]
    pub cumulative_employer_contributions: f64,
}

impl CensusRecord {
    /// Convert into the state for the year preceding the first simulated year
    fn into_state(self, baseline_year: i32) -> Result<EmployeeYearState> {
        let year_end = calendar::year_end(baseline_year);
        if self.hire_date > year_end {
            return Err(AccrualError::data_quality(
                baseline_year,
                "census_hire_date",
                format!("{} hired {} after baseline year end", self.employee_id, self.hire_date),
            ));
        }
        if self.annual_salary <= 0.0 {
            return Err(AccrualError::data_quality(
                baseline_year,
                "census_salary",
                format!("{} has non-positive salary {}", self.employee_id, self.annual_salary),
            ));
        }
        if let Some(rate) = self.deferral_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AccrualError::data_quality(
                    baseline_year,
                    "deferral_rate_range",
                    format!("{} has census deferral rate {}", self.employee_id, rate),
                ));
            }
        }

        let tenure_years = calendar::completed_years(self.hire_date, year_end);
        let enrolled = self.deferral_rate.is_some_and(|r| r > 0.0);
        Ok(EmployeeYearState {
            simulation_year: baseline_year,
            status: EmploymentStatus::Active,
            birth_date: self.birth_date,
            hire_date: self.hire_date,
            termination_date: None,
            hired_this_year: false,
            terminated_this_year: false,
            level: self.level,
            performance_tier: self.performance_tier,
            annual_salary: self.annual_salary,
            prorated_compensation: self.annual_salary,
            hours_worked: 0.0,
            age: calendar::completed_years(self.birth_date, year_end),
            tenure_years,
            tenure_fraction: calendar::fractional_years(self.hire_date, year_end),
            deferral_rate: self.deferral_rate.unwrap_or(0.0),
            census_deferral_rate: self.deferral_rate,
            enrollment_status: if enrolled {
                EnrollmentStatus::Enrolled
            } else {
                EnrollmentStatus::NotEnrolled
            },
            enrollment_source: enrolled.then_some(EnrollmentSource::Census),
            enrollment_date: None,
            employee_deferrals: 0.0,
            employer_match: 0.0,
            employer_core: 0.0,
            compensation_capped: false,
            cumulative_employer_contributions: self.cumulative_employer_contributions,
            vesting_service_years: self.vesting_service_years.unwrap_or(tenure_years),
            employee_id: self.employee_id,
        })
    }
}

/// Every employee's state for one simulation year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSnapshot {
    simulation_year: i32,
    finalized: bool,
    states: BTreeMap<EmployeeId, EmployeeYearState>,
}

impl YearSnapshot {
    /// Create an unfinalized snapshot
    pub fn new(simulation_year: i32) -> Self {
        Self {
            simulation_year,
            finalized: false,
            states: BTreeMap::new(),
        }
    }

    /// Build the finalized baseline snapshot from a census import
    ///
    /// The baseline belongs to `first_year - 1` so the first simulated year
    /// reads it exactly like any other prior year.
    pub fn from_census(first_year: i32, records: Vec<CensusRecord>) -> Result<Self> {
        let baseline_year = first_year - 1;
        let mut snapshot = Self::new(baseline_year);
        for record in records {
            let state = record.into_state(baseline_year)?;
            snapshot.insert(state)?;
        }
        Ok(snapshot.finalize())
    }

    /// Add a state; rejects duplicates, wrong years, and finalized snapshots
    pub fn insert(&mut self, state: EmployeeYearState) -> Result<()> {
        if self.finalized {
            return Err(AccrualError::conflict(
                format!("snapshot/{}", self.simulation_year),
                "snapshot is finalized and immutable",
            ));
        }
        if state.simulation_year != self.simulation_year {
            return Err(AccrualError::data_quality(
                self.simulation_year,
                "snapshot_year",
                format!("state for {} belongs to {}", state.employee_id, state.simulation_year),
            ));
        }
        if self.states.contains_key(&state.employee_id) {
            return Err(AccrualError::data_quality(
                self.simulation_year,
                "unique_employee_year",
                format!("duplicate state for {}", state.employee_id),
            ));
        }
        self.states.insert(state.employee_id.clone(), state);
        Ok(())
    }

    /// Mark the snapshot immutable
    pub fn finalize(mut self) -> Self {
        self.finalized = true;
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn simulation_year(&self) -> i32 {
        self.simulation_year
    }

    pub fn get(&self, employee_id: &EmployeeId) -> Option<&EmployeeYearState> {
        self.states.get(employee_id)
    }

    /// All states in employee-id order
    pub fn states(&self) -> impl Iterator<Item = &EmployeeYearState> {
        self.states.values()
    }

    /// Active employees in employee-id order
    pub fn active(&self) -> impl Iterator<Item = &EmployeeYearState> {
        self.states.values().filter(|s| s.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, rate: Option<f64>) -> CensusRecord {
        CensusRecord {
            employee_id: EmployeeId::new(id),
            birth_date: NaiveDate::from_ymd_opt(1985, 5, 1).unwrap(),
            hire_date: NaiveDate::from_ymd_opt(2015, 3, 1).unwrap(),
            level: 2,
            annual_salary: 75_000.0,
            performance_tier: PerformanceTier::Meets,
            deferral_rate: rate,
            vesting_service_years: None,
            cumulative_employer_contributions: 0.0,
        }
    }

    #[test]
    fn test_census_builds_finalized_prior_year() {
        let snapshot = YearSnapshot::from_census(2025, vec![record("E1", Some(0.05)), record("E2", None)]).unwrap();
        assert_eq!(snapshot.simulation_year(), 2024);
        assert!(snapshot.is_finalized());
        assert_eq!(snapshot.active_count(), 2);

        let e1 = snapshot.get(&EmployeeId::new("E1")).unwrap();
        assert_eq!(e1.enrollment_status, EnrollmentStatus::Enrolled);
        assert_eq!(e1.enrollment_source, Some(EnrollmentSource::Census));
        assert_eq!(e1.tenure_years, 9);
        assert_eq!(e1.vesting_service_years, 9);
        assert_eq!(e1.age, 39);

        let e2 = snapshot.get(&EmployeeId::new("E2")).unwrap();
        assert_eq!(e2.enrollment_status, EnrollmentStatus::NotEnrolled);
        assert_eq!(e2.deferral_rate, 0.0);
    }

    #[test]
    fn test_census_rejects_duplicates() {
        let err = YearSnapshot::from_census(2025, vec![record("E1", None), record("E1", None)]).unwrap_err();
        assert!(matches!(err, AccrualError::DataQuality { .. }));
    }

    #[test]
    fn test_finalized_snapshot_is_immutable() {
        let mut snapshot = YearSnapshot::from_census(2025, vec![record("E1", None)]).unwrap();
        let mut state = snapshot.get(&EmployeeId::new("E1")).unwrap().clone();
        state.employee_id = EmployeeId::new("E9");
        let err = snapshot.insert(state).unwrap_err();
        assert!(matches!(err, AccrualError::TransactionConflict { .. }));
    }
}
