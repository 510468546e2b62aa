//! Temporal state accumulator
//!
//! Folds year N's event partition onto year N-1's finalized snapshot to
//! produce year N's (unfinalized) snapshot. Refuses to run against anything
//! but the finalized previous year.

use std::collections::BTreeMap;

use accrual_core::{
    calendar, round_cents, AccrualError, DeferralChangeReason, EmployeeId, EmployeeYearState, EmploymentStatus,
    EnrollmentStatus, EventPartition, EventPayload, EventType, Result, SimulationConfig, SimulationEvent,
    YearSnapshot,
};
use tracing::{debug, info};

use crate::proration::{EmploymentSpan, SalaryChange};

/// Tolerance for cross-checking generated contribution bases
const COMPENSATION_TOLERANCE: f64 = 0.01;

/// Deferral rate priority: latest election this year, else the carried-forward
/// election, else the census rate, else zero
pub fn resolve_deferral_rate(latest_event: Option<f64>, carried: Option<f64>, census: Option<f64>) -> f64 {
    latest_event.or(carried).or(census).unwrap_or(0.0)
}

pub struct StateAccumulator<'a> {
    config: &'a SimulationConfig,
}

impl<'a> StateAccumulator<'a> {
    pub fn new(config: &'a SimulationConfig) -> Self {
        Self { config }
    }

    /// Build the snapshot for `partition`'s year
    ///
    /// # Errors
    /// - `DependencyViolation` unless `prior` is the finalized previous year
    /// - `DataQuality` for events that reference unknown or already-terminated
    ///   employees, duplicate hires, or activity after termination
    pub fn accumulate(&self, prior: &YearSnapshot, partition: &EventPartition) -> Result<YearSnapshot> {
        let year = partition.simulation_year();
        if prior.simulation_year() != year - 1 || !prior.is_finalized() {
            return Err(AccrualError::dependency(
                year,
                "state_accumulation",
                format!(
                    "snapshot for {} must exist and be finalized (found {}, finalized: {})",
                    year - 1,
                    prior.simulation_year(),
                    prior.is_finalized()
                ),
            ));
        }

        let mut by_employee: BTreeMap<&EmployeeId, Vec<&SimulationEvent>> = BTreeMap::new();
        for event in partition.events() {
            by_employee.entry(event.employee_id()).or_default().push(event);
        }
        check_references(year, prior, &by_employee)?;

        let mut snapshot = YearSnapshot::new(year);
        for state in prior.states() {
            let next = if state.is_active() {
                let events = by_employee.get(&state.employee_id).map(Vec::as_slice).unwrap_or(&[]);
                self.fold(year, Some(state), events)?
            } else {
                carry_terminated(state, year)
            };
            snapshot.insert(next)?;
        }
        for (employee_id, events) in &by_employee {
            if prior.get(employee_id).is_none() {
                snapshot.insert(self.fold(year, None, events)?)?;
            }
        }

        info!(
            year,
            employees = snapshot.len(),
            active = snapshot.active_count(),
            "🧮 Accumulated state"
        );
        Ok(snapshot)
    }

    /// Apply one employee's events in log order
    fn fold(&self, year: i32, prior: Option<&EmployeeYearState>, events: &[&SimulationEvent]) -> Result<EmployeeYearState> {
        let mut state = match prior {
            Some(prior) => carry_active(prior, year),
            None => hired_state(year, events)?,
        };
        let starting_salary = state.annual_salary;
        let mut changes: Vec<SalaryChange> = Vec::new();
        let mut latest_rate: Option<f64> = None;
        let mut contribution: Option<&EventPayload> = None;

        for event in events {
            let date = event.effective_date();
            if let Some(terminated) = state.termination_date {
                if date > terminated && event.event_type() != EventType::EmployerContribution {
                    return Err(AccrualError::data_quality(
                        year,
                        "event_after_termination",
                        format!("{} {} on {} after termination on {}", state.employee_id, event.event_type(), date, terminated),
                    ));
                }
            }
            if date < state.hire_date {
                return Err(AccrualError::data_quality(
                    year,
                    "event_before_hire",
                    format!("{} {} on {} before hire on {}", state.employee_id, event.event_type(), date, state.hire_date),
                ));
            }

            match event.payload() {
                EventPayload::Termination { .. } => {
                    state.termination_date = Some(date);
                    state.terminated_this_year = true;
                    state.status = EmploymentStatus::Terminated;
                }
                EventPayload::Hire { .. } => {}
                EventPayload::Promotion { to_level, new_salary, .. } => {
                    state.level = *to_level;
                    changes.push(SalaryChange {
                        effective_date: date,
                        annual_salary: *new_salary,
                    });
                }
                EventPayload::Merit { new_salary, .. } => {
                    changes.push(SalaryChange {
                        effective_date: date,
                        annual_salary: *new_salary,
                    });
                }
                EventPayload::Enrollment { deferral_rate, source } => {
                    state.enrollment_status = EnrollmentStatus::Enrolled;
                    state.enrollment_source = Some(*source);
                    state.enrollment_date = Some(date);
                    latest_rate = Some(*deferral_rate);
                }
                EventPayload::DeferralChange { new_rate, reason, .. } => {
                    if *reason == DeferralChangeReason::OptOut {
                        state.enrollment_status = EnrollmentStatus::OptedOut;
                    }
                    latest_rate = Some(*new_rate);
                }
                payload @ EventPayload::EmployerContribution { .. } => contribution = Some(payload),
            }
        }

        // Stable sort: same-day changes keep log order, so the later raise wins
        changes.sort_by_key(|c| c.effective_date);
        if let Some(last) = changes.last() {
            state.annual_salary = last.annual_salary;
        }
        let span = EmploymentSpan {
            year,
            hire_date: state.hire_date,
            termination_date: state.termination_date,
            starting_salary,
            changes: &changes,
        };
        state.prorated_compensation = span.earned_compensation();
        state.hours_worked = span.hours_worked();

        let carried = prior
            .filter(|p| p.enrollment_status != EnrollmentStatus::NotEnrolled)
            .map(|p| p.deferral_rate);
        let census = prior.and_then(|p| p.census_deferral_rate);
        state.deferral_rate = resolve_deferral_rate(latest_rate, carried, census);

        let end = state.termination_date.unwrap_or_else(|| calendar::year_end(year));
        state.age = calendar::completed_years(state.birth_date, end);
        state.tenure_years = calendar::completed_years(state.hire_date, end);
        state.tenure_fraction = calendar::fractional_years(state.hire_date, end);

        if let Some(EventPayload::EmployerContribution {
            eligible_compensation,
            compensation_capped,
            employee_deferral,
            match_amount,
            core_amount,
            ..
        }) = contribution
        {
            if (eligible_compensation - state.prorated_compensation).abs() > COMPENSATION_TOLERANCE {
                return Err(AccrualError::data_quality(
                    year,
                    "contribution_compensation",
                    format!(
                        "{} contribution base {} differs from earned compensation {}",
                        state.employee_id, eligible_compensation, state.prorated_compensation
                    ),
                ));
            }
            state.employee_deferrals = *employee_deferral;
            state.employer_match = *match_amount;
            state.employer_core = *core_amount;
            state.compensation_capped = *compensation_capped;
        }

        let prior_service = prior.map_or(0, |p| p.vesting_service_years);
        state.vesting_service_years = match self.config.vesting.hours_threshold {
            Some(threshold) => prior_service + u32::from(state.hours_worked >= threshold),
            None => state.tenure_years,
        };
        state.cumulative_employer_contributions =
            round_cents(prior.map_or(0.0, |p| p.cumulative_employer_contributions) + state.employer_contributions());

        debug!(
            year,
            employee_id = %state.employee_id,
            status = ?state.status,
            compensation = state.prorated_compensation,
            deferral_rate = state.deferral_rate,
            "Folded events"
        );
        Ok(state)
    }
}

/// Every event must belong to a known, still-active employee or to a single new hire
fn check_references(
    year: i32,
    prior: &YearSnapshot,
    by_employee: &BTreeMap<&EmployeeId, Vec<&SimulationEvent>>,
) -> Result<()> {
    for (employee_id, events) in by_employee {
        let hires = events.iter().filter(|e| e.event_type() == EventType::Hire).count();
        match prior.get(employee_id) {
            Some(state) if !state.is_active() => {
                return Err(AccrualError::data_quality(
                    year,
                    "event_for_terminated_employee",
                    format!("{} was terminated in {} or earlier", employee_id, year - 1),
                ));
            }
            Some(_) if hires > 0 => {
                return Err(AccrualError::data_quality(
                    year,
                    "duplicate_hire",
                    format!("{} is already employed", employee_id),
                ));
            }
            None if hires == 0 => {
                return Err(AccrualError::data_quality(
                    year,
                    "event_for_unknown_employee",
                    format!("{} has events but no prior state or hire", employee_id),
                ));
            }
            None if hires > 1 => {
                return Err(AccrualError::data_quality(
                    year,
                    "duplicate_hire",
                    format!("{} hired {} times", employee_id, hires),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Starting point for an employee active at the end of the prior year
fn carry_active(prior: &EmployeeYearState, year: i32) -> EmployeeYearState {
    let mut state = prior.clone();
    state.simulation_year = year;
    state.hired_this_year = false;
    state.terminated_this_year = false;
    reset_year_amounts(&mut state);
    state
}

/// Terminated employees stay terminal with no further accrual
fn carry_terminated(prior: &EmployeeYearState, year: i32) -> EmployeeYearState {
    let mut state = carry_active(prior, year);
    state.prorated_compensation = 0.0;
    state.hours_worked = 0.0;
    state
}

fn reset_year_amounts(state: &mut EmployeeYearState) {
    state.employee_deferrals = 0.0;
    state.employer_match = 0.0;
    state.employer_core = 0.0;
    state.compensation_capped = false;
}

/// Starting point for an employee hired this year
fn hired_state(year: i32, events: &[&SimulationEvent]) -> Result<EmployeeYearState> {
    let hire = events
        .iter()
        .find(|e| e.event_type() == EventType::Hire)
        .ok_or_else(|| AccrualError::data_quality(year, "event_for_unknown_employee", "no hire event"))?;
    let EventPayload::Hire {
        level,
        annual_salary,
        birth_date,
        performance_tier,
    } = hire.payload()
    else {
        return Err(AccrualError::data_quality(year, "hire_payload", "hire event without hire payload"));
    };

    Ok(EmployeeYearState {
        employee_id: hire.employee_id().clone(),
        simulation_year: year,
        status: EmploymentStatus::Active,
        birth_date: *birth_date,
        hire_date: hire.effective_date(),
        termination_date: None,
        hired_this_year: true,
        terminated_this_year: false,
        level: *level,
        performance_tier: *performance_tier,
        annual_salary: *annual_salary,
        prorated_compensation: 0.0,
        hours_worked: 0.0,
        age: 0,
        tenure_years: 0,
        tenure_fraction: 0.0,
        deferral_rate: 0.0,
        census_deferral_rate: None,
        enrollment_status: EnrollmentStatus::NotEnrolled,
        enrollment_source: None,
        enrollment_date: None,
        employee_deferrals: 0.0,
        employer_match: 0.0,
        employer_core: 0.0,
        compensation_capped: false,
        cumulative_employer_contributions: 0.0,
        vesting_service_years: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::EventGenerator;
    use crate::testing;
    use accrual_core::{EnrollmentSource, EventScope, PerformanceTier, TerminationReason};
    use chrono::NaiveDate;

    fn scope(config: &SimulationConfig, year: i32) -> EventScope {
        EventScope::new(config.simulation.scenario_id.clone(), config.simulation.plan_design_id.clone(), year)
    }

    fn hire_on_day_300(config: &SimulationConfig) -> SimulationEvent {
        SimulationEvent::new(
            &scope(config, 2025),
            EmployeeId::new("NH_2025_00001"),
            calendar::day_of_year(2025, 300),
            EventPayload::Hire {
                level: 2,
                annual_salary: 100_000.0,
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                performance_tier: PerformanceTier::Meets,
            },
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_deferral_rate_priority() {
        assert_eq!(resolve_deferral_rate(Some(0.08), Some(0.05), Some(0.03)), 0.08);
        assert_eq!(resolve_deferral_rate(None, Some(0.05), Some(0.03)), 0.05);
        assert_eq!(resolve_deferral_rate(None, None, Some(0.03)), 0.03);
        assert_eq!(resolve_deferral_rate(None, None, None), 0.0);
    }

    #[test]
    fn test_day_300_hire_is_prorated() {
        let config = testing::config();
        let baseline = testing::baseline(2025, vec![testing::census_record("E001", 40, 5, 2, 70_000.0, 2025)]);
        let partition = EventPartition::assemble(2025, vec![hire_on_day_300(&config)]).unwrap();
        let snapshot = StateAccumulator::new(&config).accumulate(&baseline, &partition).unwrap();

        let hire = snapshot.get(&EmployeeId::new("NH_2025_00001")).unwrap();
        assert!(hire.hired_this_year);
        assert!((hire.prorated_compensation - 100_000.0 * 65.0 / 365.0).abs() < 0.01);
        assert_eq!(hire.annual_salary, 100_000.0);
        assert!(!snapshot.is_finalized());
    }

    #[test]
    fn test_rejects_unfinalized_prior() {
        let config = testing::config();
        let prior = YearSnapshot::new(2025);
        let partition = EventPartition::assemble(2026, Vec::new()).unwrap();
        let err = StateAccumulator::new(&config).accumulate(&prior, &partition).unwrap_err();
        assert!(matches!(err, AccrualError::DependencyViolation { year: 2026, .. }));
    }

    #[test]
    fn test_rejects_missing_prior_year() {
        let config = testing::config();
        let baseline = testing::baseline(2025, testing::workforce(3, 2025));
        let partition = EventPartition::assemble(2026, Vec::new()).unwrap();
        let err = StateAccumulator::new(&config).accumulate(&baseline, &partition).unwrap_err();
        assert!(matches!(err, AccrualError::DependencyViolation { .. }));
    }

    #[test]
    fn test_rejects_events_for_unknown_employee() {
        let config = testing::config();
        let baseline = testing::baseline(2025, testing::workforce(3, 2025));
        let stray = SimulationEvent::new(
            &scope(&config, 2025),
            EmployeeId::new("GHOST"),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            EventPayload::Enrollment {
                deferral_rate: 0.05,
                source: EnrollmentSource::Voluntary,
            },
            0,
        )
        .unwrap();
        let partition = EventPartition::assemble(2025, vec![stray]).unwrap();
        let err = StateAccumulator::new(&config).accumulate(&baseline, &partition).unwrap_err();
        match err {
            AccrualError::DataQuality { invariant, .. } => assert_eq!(invariant, "event_for_unknown_employee"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_terminated_employee_is_terminal_next_year() {
        let config = testing::config();
        let baseline = testing::baseline(2025, vec![testing::census_record("E001", 40, 5, 2, 73_000.0, 2025)]);
        let termination = SimulationEvent::new(
            &scope(&config, 2025),
            EmployeeId::new("E001"),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            EventPayload::Termination {
                reason: TerminationReason::Voluntary,
                final_salary: 73_000.0,
            },
            0,
        )
        .unwrap();
        let accumulator = StateAccumulator::new(&config);
        let partition = EventPartition::assemble(2025, vec![termination]).unwrap();
        let year_2025 = accumulator.accumulate(&baseline, &partition).unwrap().finalize();
        let e1 = year_2025.get(&EmployeeId::new("E001")).unwrap();
        assert_eq!(e1.status, EmploymentStatus::Terminated);
        assert!(e1.terminated_this_year);
        assert!((e1.prorated_compensation - 73_000.0 * 90.0 / 365.0).abs() < 0.01);

        let empty = EventPartition::assemble(2026, Vec::new()).unwrap();
        let year_2026 = accumulator.accumulate(&year_2025, &empty).unwrap();
        let e1 = year_2026.get(&EmployeeId::new("E001")).unwrap();
        assert_eq!(e1.status, EmploymentStatus::Terminated);
        assert!(!e1.terminated_this_year);
        assert_eq!(e1.prorated_compensation, 0.0);
    }

    #[test]
    fn test_generated_year_reconciles_headcount() {
        let config = testing::config();
        let baseline = testing::baseline(2025, testing::workforce(150, 2025));
        let outcome = EventGenerator::new(&config, 99).generate(&baseline, 2025).unwrap();
        let snapshot = StateAccumulator::new(&config).accumulate(&baseline, &outcome.partition).unwrap();

        let hires = outcome.partition.count(EventType::Hire);
        let terms = outcome.partition.count(EventType::Termination);
        assert_eq!(snapshot.active_count(), baseline.active_count() + hires - terms);
    }

    #[test]
    fn test_promotion_after_merit_month_builds_on_merit() {
        let mut config = testing::config();
        config.merit.effective_month = 1;
        config.promotion.effective_month = 7;
        config.promotion.budget_rate = 1.0;
        testing::flatten_hazard(&mut config.hazard.promotion, 1.0);
        config.hazard.termination.base_rate = 0.0;
        config.hazard.new_hire_termination.base_rate = 0.0;
        let baseline = testing::baseline(2025, testing::workforce(20, 2025));
        let outcome = EventGenerator::new(&config, 17).generate(&baseline, 2025).unwrap();
        let snapshot = StateAccumulator::new(&config).accumulate(&baseline, &outcome.partition).unwrap();

        let mut merits = BTreeMap::new();
        for event in outcome.partition.of_type(EventType::Merit) {
            if let EventPayload::Merit { previous_salary, new_salary, .. } = event.payload() {
                merits.insert(event.employee_id().clone(), (*previous_salary, *new_salary));
            }
        }
        let mut promoted_with_merit = 0;
        for event in outcome.partition.of_type(EventType::Promotion) {
            let EventPayload::Promotion { previous_salary, new_salary, .. } = event.payload() else {
                panic!("promotion event without promotion payload");
            };
            let state = snapshot.get(event.employee_id()).unwrap();
            assert_eq!(state.annual_salary, *new_salary);
            let Some((merit_previous, merit_new)) = merits.get(event.employee_id()) else {
                continue;
            };
            promoted_with_merit += 1;
            let census_salary = baseline.get(event.employee_id()).unwrap().annual_salary;
            assert_eq!(*merit_previous, census_salary);
            assert_eq!(previous_salary, merit_new);
            assert!(new_salary > merit_new);
            let expected = merit_new * 181.0 / 365.0 + new_salary * 184.0 / 365.0;
            assert!((state.prorated_compensation - expected).abs() < 0.02);
        }
        assert!(promoted_with_merit > 0);

        for (employee_id, (_, merit_new)) in &merits {
            let promoted = outcome
                .partition
                .of_type(EventType::Promotion)
                .any(|e| e.employee_id() == employee_id);
            if !promoted {
                assert_eq!(snapshot.get(employee_id).unwrap().annual_salary, *merit_new);
            }
        }
    }

    #[test]
    fn test_promotion_and_merit_in_same_month_compound() {
        let mut config = testing::config();
        config.merit.effective_month = 4;
        config.promotion.effective_month = 4;
        config.promotion.budget_rate = 1.0;
        testing::flatten_hazard(&mut config.hazard.promotion, 1.0);
        config.hazard.termination.base_rate = 0.0;
        config.hazard.new_hire_termination.base_rate = 0.0;
        let baseline = testing::baseline(2025, testing::workforce(20, 2025));
        let outcome = EventGenerator::new(&config, 17).generate(&baseline, 2025).unwrap();
        let snapshot = StateAccumulator::new(&config).accumulate(&baseline, &outcome.partition).unwrap();

        let mut compounded = 0;
        for event in outcome.partition.of_type(EventType::Merit) {
            let EventPayload::Merit { previous_salary, new_salary, .. } = event.payload() else {
                panic!("merit event without merit payload");
            };
            let promotion = outcome
                .partition
                .of_type(EventType::Promotion)
                .find(|e| e.employee_id() == event.employee_id());
            if let Some(EventPayload::Promotion { new_salary: promoted, .. }) = promotion.map(|e| e.payload()) {
                assert_eq!(previous_salary, promoted);
                compounded += 1;
            }
            assert_eq!(snapshot.get(event.employee_id()).unwrap().annual_salary, *new_salary);
        }
        assert!(compounded > 0);
    }

    #[test]
    fn test_opt_out_resolves_to_zero_rate() {
        let mut config = testing::config();
        config.plan.auto_enrollment.opt_out_rate = 1.0;
        config.plan.auto_enrollment.scope = accrual_core::AutoEnrollmentScope::AllEligible;
        config.hazard.enrollment.base_rate = 0.0;
        let baseline = testing::baseline(2025, testing::workforce(30, 2025));
        let outcome = EventGenerator::new(&config, 8).generate(&baseline, 2025).unwrap();
        let snapshot = StateAccumulator::new(&config).accumulate(&baseline, &outcome.partition).unwrap();

        let opted: Vec<_> = snapshot
            .states()
            .filter(|s| s.enrollment_status == EnrollmentStatus::OptedOut)
            .collect();
        assert!(!opted.is_empty());
        assert!(opted.iter().all(|s| s.deferral_rate == 0.0 && s.employee_deferrals == 0.0));
    }
}
