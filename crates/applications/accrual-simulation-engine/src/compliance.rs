//! Compliance calculator
//!
//! Deterministic reporting over a finalized snapshot: vesting, forfeitures,
//! the 401(a)(17) compensation cap audit flag, and 415(c) annual additions.
//! Never mutates state.
//!
//! Forfeiture treatment for 415(c) is explicit configuration
//! (`compliance.exclude_forfeitures_from_annual_additions`). When forfeitures
//! are included they are assumed reallocated to active participants in
//! proportion to their employer contributions for the year.

use accrual_core::{
    calendar, round_cents, to_cents, from_cents, AccrualError, EmployeeId, EmploymentStatus, EmployeeYearState, Result,
    SimulationConfig, StatutoryLimits, VestingSchedule, YearSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Derived compliance figures for one employee-year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub employee_id: EmployeeId,
    pub simulation_year: i32,
    pub status: EmploymentStatus,
    pub vesting_service_years: u32,
    pub vested_percentage: f64,
    pub employer_balance: f64,
    pub vested_balance: f64,
    pub forfeiture: f64,
    pub compensation: f64,
    pub capped_compensation: f64,
    pub compensation_capped: bool,
    pub employee_deferrals: f64,
    pub catch_up_deferrals: f64,
    pub employer_contributions: f64,
    /// Share of the year's forfeitures attributed for the 415(c) test
    pub reallocated_forfeiture: f64,
    pub annual_additions: f64,
    pub annual_additions_limit: f64,
    pub annual_additions_exceeded: bool,
}

/// Compliance output for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub simulation_year: i32,
    pub vesting_schedule: String,
    pub forfeitures_excluded: bool,
    pub total_forfeitures: f64,
    pub records: Vec<ComplianceRecord>,
}

impl ComplianceReport {
    pub fn capped_count(&self) -> usize {
        self.records.iter().filter(|r| r.compensation_capped).count()
    }

    pub fn exceeded_count(&self) -> usize {
        self.records.iter().filter(|r| r.annual_additions_exceeded).count()
    }
}

pub struct ComplianceCalculator<'a> {
    config: &'a SimulationConfig,
    schedule: VestingSchedule,
}

impl<'a> ComplianceCalculator<'a> {
    pub fn new(config: &'a SimulationConfig) -> Result<Self> {
        Ok(Self {
            config,
            schedule: config.vesting_schedule()?,
        })
    }

    /// Vested fraction for a state
    pub fn vested_percentage(&self, state: &EmployeeYearState) -> f64 {
        self.schedule.percentage(state.vesting_service_years)
    }

    /// Evaluate every employee in a finalized snapshot
    pub fn evaluate(&self, snapshot: &YearSnapshot) -> Result<ComplianceReport> {
        let year = snapshot.simulation_year();
        if !snapshot.is_finalized() {
            return Err(AccrualError::dependency(
                year,
                "compliance",
                format!("snapshot for {} must be finalized", year),
            ));
        }
        let limits = self.config.limits_for(year)?;
        let excluded = self.config.compliance.exclude_forfeitures_from_annual_additions;

        let mut records = snapshot
            .states()
            .map(|state| self.record(state, limits))
            .collect::<Result<Vec<_>>>()?;

        let total_forfeitures = round_cents(records.iter().map(|r| r.forfeiture).sum());
        if !excluded {
            reallocate_forfeitures(&mut records, total_forfeitures);
        }

        let report = ComplianceReport {
            simulation_year: year,
            vesting_schedule: self.schedule.name().to_string(),
            forfeitures_excluded: excluded,
            total_forfeitures,
            records,
        };
        info!(
            year,
            records = report.records.len(),
            forfeitures = report.total_forfeitures,
            capped = report.capped_count(),
            exceeded = report.exceeded_count(),
            "📋 Compliance evaluated"
        );
        Ok(report)
    }

    fn record(&self, state: &EmployeeYearState, limits: &StatutoryLimits) -> Result<ComplianceRecord> {
        let year = state.simulation_year;
        let vested = self.vested_percentage(state);
        if !(0.0..=1.0).contains(&vested) {
            return Err(AccrualError::data_quality(
                year,
                "vesting_percentage_range",
                format!("{} vested {}", state.employee_id, vested),
            ));
        }

        // Catch-up eligibility is judged at year end, even for leavers
        let age_at_year_end = state.age_on(calendar::year_end(year));
        let catch_up_room = if age_at_year_end >= limits.catch_up_age { limits.catch_up_limit } else { 0.0 };
        if state.employee_deferrals > limits.deferral_limit + catch_up_room + 0.005 {
            return Err(AccrualError::data_quality(
                year,
                "deferral_limit",
                format!(
                    "{} deferred {} above the {} limit",
                    state.employee_id,
                    state.employee_deferrals,
                    limits.deferral_limit + catch_up_room
                ),
            ));
        }
        let catch_up = round_cents((state.employee_deferrals - limits.deferral_limit).max(0.0));

        let balance = state.cumulative_employer_contributions;
        let vested_balance = round_cents(balance * vested);
        let forfeiture = if state.terminated_this_year {
            round_cents(balance - vested_balance)
        } else {
            0.0
        };

        let employer = state.employer_contributions();
        let annual_additions = round_cents(state.employee_deferrals - catch_up + employer);
        Ok(ComplianceRecord {
            employee_id: state.employee_id.clone(),
            simulation_year: year,
            status: state.status,
            vesting_service_years: state.vesting_service_years,
            vested_percentage: vested,
            employer_balance: balance,
            vested_balance,
            forfeiture,
            compensation: state.prorated_compensation,
            capped_compensation: state.prorated_compensation.min(limits.compensation_limit),
            compensation_capped: state.compensation_capped,
            employee_deferrals: state.employee_deferrals,
            catch_up_deferrals: catch_up,
            employer_contributions: employer,
            reallocated_forfeiture: 0.0,
            annual_additions,
            annual_additions_limit: limits.annual_additions_limit,
            annual_additions_exceeded: annual_additions > limits.annual_additions_limit + 0.005,
        })
    }
}

/// Attribute forfeitures to active participants pro rata by employer contributions, in cents
fn reallocate_forfeitures(records: &mut [ComplianceRecord], total: f64) {
    let total_cents = to_cents(total) as i128;
    let base: i128 = records
        .iter()
        .filter(|r| r.status == EmploymentStatus::Active)
        .map(|r| to_cents(r.employer_contributions) as i128)
        .sum();
    if total_cents == 0 || base == 0 {
        return;
    }
    for record in records.iter_mut().filter(|r| r.status == EmploymentStatus::Active) {
        let share = to_cents(record.employer_contributions) as i128 * total_cents / base;
        record.reallocated_forfeiture = from_cents(share as i64);
        record.annual_additions = round_cents(record.annual_additions + record.reallocated_forfeiture);
        record.annual_additions_exceeded = record.annual_additions > record.annual_additions_limit + 0.005;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn snapshot_with(state_edit: impl FnOnce(&mut EmployeeYearState)) -> YearSnapshot {
        let baseline = testing::baseline(2025, vec![testing::census_record("E001", 40, 3, 2, 80_000.0, 2025)]);
        let mut state = baseline.get(&EmployeeId::new("E001")).unwrap().clone();
        state.simulation_year = 2025;
        state_edit(&mut state);
        let mut snapshot = YearSnapshot::new(2025);
        snapshot.insert(state).unwrap();
        snapshot.finalize()
    }

    #[test]
    fn test_forfeiture_for_partially_vested_termination() {
        let config = testing::config();
        let snapshot = snapshot_with(|s| {
            s.status = EmploymentStatus::Terminated;
            s.terminated_this_year = true;
            s.vesting_service_years = 3;
            s.cumulative_employer_contributions = 10_000.0;
        });
        let report = ComplianceCalculator::new(&config).unwrap().evaluate(&snapshot).unwrap();
        let record = &report.records[0];
        // graded_6 at 3 years is 40%
        assert_eq!(record.vested_percentage, 0.4);
        assert_eq!(record.vested_balance, 4_000.0);
        assert_eq!(record.forfeiture, 6_000.0);
        assert_eq!(report.total_forfeitures, 6_000.0);
    }

    #[test]
    fn test_active_employee_forfeits_nothing() {
        let config = testing::config();
        let snapshot = snapshot_with(|s| {
            s.vesting_service_years = 1;
            s.cumulative_employer_contributions = 5_000.0;
        });
        let report = ComplianceCalculator::new(&config).unwrap().evaluate(&snapshot).unwrap();
        assert_eq!(report.records[0].forfeiture, 0.0);
        assert_eq!(report.records[0].vested_percentage, 0.0);
    }

    #[test]
    fn test_requires_finalized_snapshot() {
        let config = testing::config();
        let err = ComplianceCalculator::new(&config)
            .unwrap()
            .evaluate(&YearSnapshot::new(2025))
            .unwrap_err();
        assert!(matches!(err, AccrualError::DependencyViolation { .. }));
    }

    #[test]
    fn test_deferral_over_limit_is_data_quality_error() {
        let config = testing::config();
        let snapshot = snapshot_with(|s| s.employee_deferrals = 40_000.0);
        let err = ComplianceCalculator::new(&config).unwrap().evaluate(&snapshot).unwrap_err();
        match err {
            AccrualError::DataQuality { invariant, .. } => assert_eq!(invariant, "deferral_limit"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_included_forfeitures_are_reallocated() {
        let mut records = vec![
            ComplianceRecord {
                employee_id: EmployeeId::new("A"),
                simulation_year: 2025,
                status: EmploymentStatus::Active,
                vesting_service_years: 5,
                vested_percentage: 0.8,
                employer_balance: 0.0,
                vested_balance: 0.0,
                forfeiture: 0.0,
                compensation: 100_000.0,
                capped_compensation: 100_000.0,
                compensation_capped: false,
                employee_deferrals: 0.0,
                catch_up_deferrals: 0.0,
                employer_contributions: 3_000.0,
                reallocated_forfeiture: 0.0,
                annual_additions: 3_000.0,
                annual_additions_limit: 70_000.0,
                annual_additions_exceeded: false,
            };
            2
        ];
        records[1].employee_id = EmployeeId::new("B");
        records[1].employer_contributions = 1_000.0;
        records[1].annual_additions = 1_000.0;

        // Equal capped compensation, 3:1 employer contributions
        reallocate_forfeitures(&mut records, 400.0);
        assert_eq!(records[0].reallocated_forfeiture, 300.0);
        assert_eq!(records[1].reallocated_forfeiture, 100.0);
        assert_eq!(records[0].annual_additions, 3_300.0);
    }
}
