//! Enrollment and deferral-change step
//!
//! Per surviving employee, by prior enrollment status:
//! - enrolled in a prior year: auto-escalation toward the cap
//! - opted out: nothing, opting out is sticky
//! - not enrolled: a voluntary election may fire inside the pre-deadline
//!   window; if it does not and auto-enrollment applies, the default
//!   election lands on the deadline and may be followed by an opt-out
//!
//! An employee gets at most one enrollment event per year.

use accrual_core::{
    calendar, AccrualError, AutoEnrollmentScope, DeferralChangeReason, EnrollmentSource, EnrollmentStatus,
    EventPayload, Result,
};
use chrono::{Days, Months, NaiveDate};
use rand::Rng;
use tracing::debug;

use super::roster::Worker;
use super::YearPass;
use crate::hazard::HazardKind;
use crate::rng::{weighted_index, DecisionKind};

/// Days after auto-enrollment within which an opt-out lands
const OPT_OUT_WINDOW_DAYS: u64 = 30;

enum Action {
    Escalate { date: NaiveDate, previous_rate: f64, new_rate: f64 },
    Enroll { date: NaiveDate, rate: f64, source: EnrollmentSource, opt_out: Option<NaiveDate> },
}

impl YearPass<'_> {
    pub(super) fn enrollment(&mut self) -> Result<()> {
        let mut actions = Vec::new();
        for worker in self.roster.survivors() {
            let action = match worker.enrollment_status {
                EnrollmentStatus::Enrolled => self.escalation(worker),
                EnrollmentStatus::OptedOut => None,
                EnrollmentStatus::NotEnrolled => self.election(worker)?,
            };
            if let Some(action) = action {
                actions.push((worker.employee_id.clone(), action));
            }
        }

        let (mut voluntary, mut auto, mut opt_outs, mut escalations) = (0, 0, 0, 0);
        for (employee_id, action) in actions {
            match action {
                Action::Escalate { date, previous_rate, new_rate } => {
                    escalations += 1;
                    if let Some(worker) = self.roster.get_mut(&employee_id) {
                        worker.deferral_rate = new_rate;
                    }
                    self.emit(
                        &employee_id,
                        date,
                        EventPayload::DeferralChange {
                            previous_rate,
                            new_rate,
                            reason: DeferralChangeReason::Escalation,
                        },
                    )?;
                }
                Action::Enroll { date, rate, source, opt_out } => {
                    if !self.enrolled.insert(employee_id.clone()) {
                        continue;
                    }
                    match source {
                        EnrollmentSource::Auto => auto += 1,
                        _ => voluntary += 1,
                    }
                    self.emit(&employee_id, date, EventPayload::Enrollment { deferral_rate: rate, source })?;

                    let mut status = EnrollmentStatus::Enrolled;
                    let mut final_rate = rate;
                    if let Some(opt_out_date) = opt_out {
                        opt_outs += 1;
                        status = EnrollmentStatus::OptedOut;
                        final_rate = 0.0;
                        self.emit(
                            &employee_id,
                            opt_out_date,
                            EventPayload::DeferralChange {
                                previous_rate: rate,
                                new_rate: 0.0,
                                reason: DeferralChangeReason::OptOut,
                            },
                        )?;
                    }
                    if let Some(worker) = self.roster.get_mut(&employee_id) {
                        worker.enrollment_status = status;
                        worker.enrollment_source = Some(source);
                        worker.deferral_rate = final_rate;
                    }
                }
            }
        }

        debug!(year = self.year, voluntary, auto, opt_outs, escalations, "Enrollment complete");
        Ok(())
    }

    /// Annual increase for participants enrolled before this year
    fn escalation(&self, worker: &Worker) -> Option<Action> {
        let escalation = &self.config.plan.auto_escalation;
        if !escalation.enabled || worker.deferral_rate <= 0.0 || worker.deferral_rate >= escalation.cap {
            return None;
        }
        let date = calendar::month_start(self.year, escalation.effective_month).max(worker.hire_date);
        let new_rate = ((worker.deferral_rate + escalation.increment).min(escalation.cap) * 10_000.0).round() / 10_000.0;
        Some(Action::Escalate {
            date,
            previous_rate: worker.deferral_rate,
            new_rate,
        })
    }

    /// Voluntary or automatic enrollment for a not-yet-enrolled employee
    fn election(&self, worker: &Worker) -> Result<Option<Action>> {
        let plan = &self.config.plan;
        let year = self.year;
        let year_start = calendar::year_start(year);
        let year_end = calendar::year_end(year);

        let eligible_on = eligibility_date(worker, plan.eligibility.waiting_period_days, plan.eligibility.minimum_age)
            .ok_or_else(|| {
                AccrualError::data_quality(year, "eligibility_date", format!("{} eligibility date overflows", worker.employee_id))
            })?;
        if eligible_on > year_end {
            return Ok(None);
        }

        let auto = &plan.auto_enrollment;
        let in_scope = match auto.scope {
            AutoEnrollmentScope::AllEligible => true,
            AutoEnrollmentScope::NewHiresOnly => {
                worker.hire_date >= calendar::year_start(self.config.simulation.start_year)
            }
        };
        let deadline = (auto.enabled && in_scope)
            .then(|| eligible_on.checked_add_days(Days::new(auto.window_days as u64)))
            .flatten();

        // Voluntary window: from eligibility until the deadline (exclusive) or year end
        let window_start = eligible_on.max(year_start);
        let window_end = deadline.map_or(year_end, |d| d.pred_opt().unwrap_or(d).min(year_end));
        if window_start <= window_end {
            let inputs = worker.hazard_inputs(year_end);
            let probability = self.hazards.probability(HazardKind::Enrollment, &inputs)?;
            let mut stream = self.rng.stream(&worker.employee_id, year, DecisionKind::VoluntaryEnrollment);
            if stream.gen_range(0.0..1.0) < probability {
                let span = (window_end - window_start).num_days() as u64;
                let date = window_start
                    .checked_add_days(Days::new(stream.gen_range(0..=span)))
                    .unwrap_or(window_start);
                let weights: Vec<f64> = plan.voluntary_deferral_rates.iter().map(|r| r.weight).collect();
                let rate = weighted_index(&mut stream, &weights)
                    .map(|i| plan.voluntary_deferral_rates[i].rate)
                    .ok_or_else(|| AccrualError::config("plan.voluntary_deferral_rates", "needs a positive weight"))?;
                return Ok(Some(Action::Enroll {
                    date,
                    rate,
                    source: EnrollmentSource::Voluntary,
                    opt_out: None,
                }));
            }
        }

        let Some(deadline) = deadline else {
            return Ok(None);
        };
        let date = deadline.max(year_start);
        if date > year_end {
            return Ok(None);
        }
        let mut stream = self.rng.stream(&worker.employee_id, year, DecisionKind::OptOut);
        let opt_out = if stream.gen_bool(auto.opt_out_rate) {
            let offset = stream.gen_range(0..OPT_OUT_WINDOW_DAYS);
            Some(date.checked_add_days(Days::new(offset)).unwrap_or(date).min(year_end))
        } else {
            None
        };
        Ok(Some(Action::Enroll {
            date,
            rate: auto.default_deferral_rate,
            source: EnrollmentSource::Auto,
            opt_out,
        }))
    }
}

/// Later of the waiting-period end and the minimum-age birthday
fn eligibility_date(worker: &Worker, waiting_period_days: u32, minimum_age: u32) -> Option<NaiveDate> {
    let served = worker.hire_date.checked_add_days(Days::new(waiting_period_days as u64))?;
    let of_age = worker.birth_date.checked_add_months(Months::new(minimum_age * 12))?;
    Some(served.max(of_age))
}

#[cfg(test)]
mod tests {
    use crate::generator::EventGenerator;
    use crate::testing;
    use accrual_core::{
        AutoEnrollmentScope, DeferralChangeReason, EmployeeId, EnrollmentSource, EventPayload, EventType,
    };
    use std::collections::HashMap;

    #[test]
    fn test_at_most_one_enrollment_per_employee() {
        let mut config = testing::config();
        config.plan.auto_enrollment.scope = AutoEnrollmentScope::AllEligible;
        let baseline = testing::baseline(2025, testing::workforce(200, 2025));
        let outcome = EventGenerator::new(&config, 21).generate(&baseline, 2025).unwrap();

        let mut counts: HashMap<&EmployeeId, usize> = HashMap::new();
        for event in outcome.partition.of_type(EventType::Enrollment) {
            *counts.entry(event.employee_id()).or_default() += 1;
        }
        assert!(!counts.is_empty());
        assert!(counts.values().all(|c| *c == 1));
    }

    #[test]
    fn test_census_enrollees_are_not_reenrolled() {
        let mut config = testing::config();
        config.plan.auto_enrollment.scope = AutoEnrollmentScope::AllEligible;
        let baseline = testing::baseline(2025, testing::workforce(60, 2025));
        let outcome = EventGenerator::new(&config, 4).generate(&baseline, 2025).unwrap();

        for event in outcome.partition.of_type(EventType::Enrollment) {
            let prior = baseline.get(event.employee_id());
            assert!(prior.is_none_or(|s| !s.is_enrolled()), "{} re-enrolled", event.employee_id());
        }
    }

    #[test]
    fn test_opt_out_follows_auto_enrollment() {
        let mut config = testing::config();
        config.plan.auto_enrollment.opt_out_rate = 1.0;
        config.hazard.enrollment.base_rate = 0.0;
        config.plan.auto_enrollment.scope = AutoEnrollmentScope::AllEligible;
        let baseline = testing::baseline(2025, testing::workforce(30, 2025));
        let outcome = EventGenerator::new(&config, 8).generate(&baseline, 2025).unwrap();

        let opt_outs = outcome
            .partition
            .of_type(EventType::DeferralChange)
            .filter(|e| matches!(e.payload(), EventPayload::DeferralChange { reason: DeferralChangeReason::OptOut, .. }))
            .count();
        let autos = outcome
            .partition
            .of_type(EventType::Enrollment)
            .filter(|e| matches!(e.payload(), EventPayload::Enrollment { source: EnrollmentSource::Auto, .. }))
            .count();
        assert!(autos > 0);
        assert_eq!(opt_outs, autos);
    }

    #[test]
    fn test_escalation_caps_rate() {
        let mut config = testing::config();
        config.plan.auto_escalation.enabled = true;
        config.plan.auto_escalation.increment = 0.02;
        config.plan.auto_escalation.cap = 0.07;
        let mut record = testing::census_record("E001", 40, 8, 2, 70_000.0, 2025);
        record.deferral_rate = Some(0.06);
        config.hazard.termination.base_rate = 0.0;
        let baseline = testing::baseline(2025, vec![record]);
        let outcome = EventGenerator::new(&config, 1).generate(&baseline, 2025).unwrap();

        let change = outcome.partition.of_type(EventType::DeferralChange).next().unwrap();
        match change.payload() {
            EventPayload::DeferralChange { previous_rate, new_rate, reason } => {
                assert_eq!(*reason, DeferralChangeReason::Escalation);
                assert_eq!(*previous_rate, 0.06);
                assert_eq!(*new_rate, 0.07);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
