//! Working population for one generation pass

use std::collections::BTreeMap;

use accrual_core::{
    calendar, EmployeeId, EmployeeYearState, EnrollmentSource, EnrollmentStatus, Level, PerformanceTier,
};
use chrono::NaiveDate;

use crate::hazard::HazardInputs;
use crate::proration::{EmploymentSpan, SalaryChange};

/// Mutable view of one employee while the year's events are decided
#[derive(Debug, Clone)]
pub(crate) struct Worker {
    pub employee_id: EmployeeId,
    pub birth_date: NaiveDate,
    pub hire_date: NaiveDate,
    pub level: Level,
    pub performance_tier: PerformanceTier,
    /// Rate on the first day worked in the year
    pub starting_salary: f64,
    /// Rate at year end after every change decided so far
    pub salary: f64,
    pub salary_changes: Vec<SalaryChange>,
    pub hired_this_year: bool,
    pub termination_date: Option<NaiveDate>,
    pub deferral_rate: f64,
    pub enrollment_status: EnrollmentStatus,
    pub enrollment_source: Option<EnrollmentSource>,
}

impl Worker {
    pub fn from_prior(state: &EmployeeYearState) -> Self {
        Self {
            employee_id: state.employee_id.clone(),
            birth_date: state.birth_date,
            hire_date: state.hire_date,
            level: state.level,
            performance_tier: state.performance_tier,
            starting_salary: state.annual_salary,
            salary: state.annual_salary,
            salary_changes: Vec::new(),
            hired_this_year: false,
            termination_date: None,
            deferral_rate: state.deferral_rate,
            enrollment_status: state.enrollment_status,
            enrollment_source: state.enrollment_source,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.termination_date.is_some()
    }

    /// Hazard attributes as of `date`
    pub fn hazard_inputs(&self, date: NaiveDate) -> HazardInputs {
        HazardInputs {
            age: calendar::completed_years(self.birth_date, date),
            tenure_years: calendar::completed_years(self.hire_date, date),
            level: self.level,
            performance_tier: self.performance_tier,
        }
    }

    /// Rate in effect on `date`
    pub fn salary_on(&self, date: NaiveDate) -> f64 {
        self.salary_changes
            .iter()
            .take_while(|c| c.effective_date <= date)
            .last()
            .map_or(self.starting_salary, |c| c.annual_salary)
    }

    /// Record a new salary rate from `effective_date`, keeping changes in date order
    ///
    /// Callers decide changes in calendar order, so a new change never lands
    /// before one already recorded.
    pub fn change_salary(&mut self, effective_date: NaiveDate, annual_salary: f64) {
        let at = self
            .salary_changes
            .partition_point(|c| c.effective_date <= effective_date);
        self.salary_changes.insert(
            at,
            SalaryChange {
                effective_date,
                annual_salary,
            },
        );
        self.salary = self
            .salary_changes
            .last()
            .map_or(self.starting_salary, |c| c.annual_salary);
    }

    pub fn span(&self, year: i32) -> EmploymentSpan<'_> {
        EmploymentSpan {
            year,
            hire_date: self.hire_date,
            termination_date: self.termination_date,
            starting_salary: self.starting_salary,
            changes: &self.salary_changes,
        }
    }
}

/// Employees in scope for the year, keyed and iterated in id order
#[derive(Debug, Default)]
pub(crate) struct Roster {
    workers: BTreeMap<EmployeeId, Worker>,
}

impl Roster {
    /// Everyone active at the end of the prior year
    pub fn from_active<'s>(states: impl Iterator<Item = &'s EmployeeYearState>) -> Self {
        let workers = states
            .filter(|s| s.is_active())
            .map(|s| (s.employee_id.clone(), Worker::from_prior(s)))
            .collect();
        Self { workers }
    }

    pub fn add(&mut self, worker: Worker) {
        self.workers.insert(worker.employee_id.clone(), worker);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn get_mut(&mut self, employee_id: &EmployeeId) -> Option<&mut Worker> {
        self.workers.get_mut(employee_id)
    }

    /// Employees not terminated so far this year
    pub fn survivors(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values().filter(|w| !w.is_terminated())
    }

    pub fn survivor_count(&self) -> usize {
        self.survivors().count()
    }
}
