//! Termination step

use std::cmp::Ordering;

use accrual_core::{calendar, EmployeeId, EventPayload, Result, TerminationReason};
use chrono::NaiveDate;
use rand::Rng;
use tracing::debug;

use super::{ShortfallCategory, YearPass};
use crate::rng::DecisionKind;

struct Draw {
    employee_id: EmployeeId,
    probability: f64,
    fired: bool,
    date: NaiveDate,
    reason: TerminationReason,
    final_salary: f64,
}

/// Highest hazard first, ties to the lowest employee id
fn by_priority(a: &Draw, b: &Draw) -> Ordering {
    b.probability
        .partial_cmp(&a.probability)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.employee_id.cmp(&b.employee_id))
}

impl YearPass<'_> {
    /// Sample every active employee against their termination hazard
    ///
    /// Employees in their first year of service draw from the new-hire
    /// table. Date and reason come from the same stream whether or not the
    /// employee fires, so a bounds adjustment never shifts anyone else's draw.
    ///
    /// With `workforce.termination_rate_bounds` set, the realized count is
    /// then held inside the bounds: excess leavers are trimmed from the
    /// lowest-hazard end, and a deficit is filled from the highest-hazard
    /// stayers. Either adjustment is recorded as a shortfall.
    pub(super) fn terminations(&mut self) -> Result<()> {
        let year = self.year;
        let year_start = calendar::year_start(year);
        let days = calendar::days_in_year(year);
        let involuntary_share = self.config.workforce.involuntary_termination_share;

        let mut draws = Vec::new();
        for worker in self.roster.iter() {
            let probability = self
                .hazards
                .termination_probability(&worker.hazard_inputs(year_start))?;
            let mut stream = self.rng.stream(&worker.employee_id, year, DecisionKind::Termination);
            let fired = stream.gen_range(0.0..1.0) < probability;
            let date = calendar::day_of_year(year, stream.gen_range(0..days));
            let reason = if stream.gen_bool(involuntary_share) {
                TerminationReason::Involuntary
            } else {
                TerminationReason::Voluntary
            };
            draws.push(Draw {
                employee_id: worker.employee_id.clone(),
                probability,
                fired,
                date,
                reason,
                final_salary: worker.salary,
            });
        }

        if let Some(bounds) = self.config.workforce.termination_rate_bounds {
            let range = bounds.count_range(draws.len());
            self.hold_within_bounds(&mut draws, range);
        }

        for draw in draws.into_iter().filter(|d| d.fired) {
            if let Some(worker) = self.roster.get_mut(&draw.employee_id) {
                worker.termination_date = Some(draw.date);
            }
            self.emit(
                &draw.employee_id,
                draw.date,
                EventPayload::Termination {
                    reason: draw.reason,
                    final_salary: draw.final_salary,
                },
            )?;
        }
        Ok(())
    }

    fn hold_within_bounds(&mut self, draws: &mut [Draw], (min, max): (usize, usize)) {
        let sampled = draws.iter().filter(|d| d.fired).count();
        if (min..=max).contains(&sampled) {
            return;
        }

        let mut order: Vec<usize> = (0..draws.len()).collect();
        order.sort_by(|&a, &b| by_priority(&draws[a], &draws[b]));
        let flip: Vec<usize> = if sampled > max {
            order.into_iter().filter(|&i| draws[i].fired).skip(max).collect()
        } else {
            order.into_iter().filter(|&i| !draws[i].fired).take(min - sampled).collect()
        };
        for i in flip {
            draws[i].fired = !draws[i].fired;
        }

        let realized = draws.iter().filter(|d| d.fired).count();
        debug!(year = self.year, sampled, realized, min, max, "Termination count held within bounds");
        self.shortfall(
            ShortfallCategory::Termination,
            sampled as f64,
            realized as f64,
            format!(
                "termination rate bounds allow {}..={} of {} employees, {} sampled",
                min,
                max,
                draws.len(),
                sampled
            ),
        );
    }
}
