//! Employer contribution step

use accrual_core::{calendar, EventPayload, Result, StatutoryLimits};

use super::YearPass;
use crate::contribution::{self, ContributionInputs};

impl YearPass<'_> {
    /// One contribution event per employee with plan money this year
    ///
    /// Runs last so it sees final employment spans, salary histories, and
    /// year-end deferral elections. Terminated employees are dated on their
    /// termination day, everyone else on December 31.
    pub(super) fn employer_contributions(&mut self, limits: &StatutoryLimits) -> Result<()> {
        let plan = &self.config.plan;
        let year = self.year;

        let mut decided = Vec::new();
        for worker in self.roster.iter() {
            let span = worker.span(year);
            let end = worker.termination_date.unwrap_or_else(|| calendar::year_end(year));
            let amounts = contribution::calculate(
                plan,
                limits,
                &ContributionInputs {
                    compensation: span.earned_compensation(),
                    deferral_rate: worker.deferral_rate,
                    age_at_year_end: calendar::completed_years(worker.birth_date, calendar::year_end(year)),
                    hours_worked: span.hours_worked(),
                    active_at_year_end: !worker.is_terminated(),
                },
            );
            if amounts.is_zero() {
                continue;
            }
            decided.push((worker.employee_id.clone(), end, amounts));
        }

        for (employee_id, date, amounts) in decided {
            self.emit(
                &employee_id,
                date,
                EventPayload::EmployerContribution {
                    eligible_compensation: amounts.eligible_compensation,
                    capped_compensation: amounts.capped_compensation,
                    compensation_capped: amounts.compensation_capped,
                    employee_deferral: amounts.employee_deferral,
                    match_amount: amounts.match_amount,
                    core_amount: amounts.core_amount,
                },
            )?;
        }
        Ok(())
    }
}
