//! Promotion step

use std::cmp::Ordering;

use accrual_core::{calendar, round_cents, AccrualError, EmployeeId, EventPayload, Result};
use rand::Rng;
use tracing::debug;

use super::{ShortfallCategory, YearPass};
use crate::hazard::HazardKind;
use crate::rng::DecisionKind;

struct Candidate {
    employee_id: EmployeeId,
    probability: f64,
}

impl YearPass<'_> {
    /// Promote the highest-hazard candidates within the promotion budget
    ///
    /// Eligible employees survived terminations, were not hired this year,
    /// meet the minimum tenure on the effective date, and sit below the level
    /// ceiling. Each eligible employee draws against their promotion hazard;
    /// those who fire are ranked by probability (ties to the lowest employee
    /// id) and the top `floor(eligible * budget_rate)` are promoted.
    pub(super) fn promotions(&mut self) -> Result<()> {
        let config = self.config;
        let promotion = &config.promotion;
        let year = self.year;
        let effective = calendar::month_start(year, promotion.effective_month);

        let mut eligible = 0usize;
        let mut candidates = Vec::new();
        for worker in self.roster.survivors() {
            if worker.hired_this_year || worker.level >= promotion.max_level {
                continue;
            }
            let inputs = worker.hazard_inputs(effective);
            if inputs.tenure_years < promotion.min_tenure_years {
                continue;
            }
            eligible += 1;
            let probability = self.hazards.probability(HazardKind::Promotion, &inputs)?;
            let draw = self
                .rng
                .stream(&worker.employee_id, year, DecisionKind::Promotion)
                .gen_range(0.0..1.0);
            if draw < probability {
                candidates.push(Candidate {
                    employee_id: worker.employee_id.clone(),
                    probability,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        let slots = (eligible as f64 * promotion.budget_rate).floor() as usize;
        if candidates.len() > slots {
            self.shortfall(
                ShortfallCategory::Promotion,
                candidates.len() as f64,
                slots as f64,
                format!("{} promotion slots for {} eligible employees", slots, eligible),
            );
            candidates.truncate(slots);
        }

        for candidate in &candidates {
            let Some(worker) = self.roster.get_mut(&candidate.employee_id) else {
                continue;
            };
            let from_level = worker.level;
            let to_level = from_level + 1;
            let band = config.compensation.band(to_level).ok_or_else(|| {
                AccrualError::config("compensation.levels", format!("no salary band for level {}", to_level))
            })?;
            let previous_salary = worker.salary_on(effective);
            let new_salary = round_cents((previous_salary * (1.0 + promotion.salary_increase)).max(band.min_salary));
            worker.level = to_level;
            worker.change_salary(effective, new_salary);

            self.emit(
                &candidate.employee_id,
                effective,
                EventPayload::Promotion {
                    from_level,
                    to_level,
                    previous_salary,
                    new_salary,
                },
            )?;
        }

        debug!(year, eligible, promoted = candidates.len(), slots, "Promotions complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::generator::EventGenerator;
    use crate::testing;
    use accrual_core::{EventPayload, EventType};

    #[test]
    fn test_promotions_respect_budget_and_ceiling() {
        let mut config = testing::config();
        config.hazard.promotion.base_rate = 1.0;
        config.promotion.budget_rate = 0.05;
        let baseline = testing::baseline(2025, testing::workforce(200, 2025));
        let outcome = EventGenerator::new(&config, 11).generate(&baseline, 2025).unwrap();

        let promotions: Vec<_> = outcome.partition.of_type(EventType::Promotion).collect();
        assert!(!promotions.is_empty());
        assert!(promotions.len() <= 10);
        for event in promotions {
            let EventPayload::Promotion { from_level, to_level, previous_salary, new_salary } = event.payload() else {
                panic!("promotion event without promotion payload");
            };
            assert_eq!(*to_level, from_level + 1);
            assert!(*to_level <= config.promotion.max_level);
            assert!(new_salary > previous_salary);
            assert!(!event.employee_id().as_str().starts_with("NH_"));
        }
    }

    #[test]
    fn test_ties_break_to_lowest_employee_id() {
        let mut config = testing::config();
        config.hazard.promotion.base_rate = 1.0;
        for band in config.hazard.promotion.age_bands.iter_mut() {
            band.multiplier = 1.0;
        }
        for band in config.hazard.promotion.tenure_bands.iter_mut() {
            band.multiplier = 1.0;
        }
        for level in config.hazard.promotion.levels.iter_mut() {
            level.multiplier = 1.0;
        }
        config.hazard.promotion.performance.exceeds = 1.0;
        config.hazard.promotion.performance.outstanding = 1.0;
        config.hazard.promotion.performance.below = 1.0;
        config.hazard.termination.base_rate = 0.0;
        config.hazard.new_hire_termination.base_rate = 0.0;
        config.promotion.budget_rate = 0.5;

        let records = (1..=4)
            .map(|i| testing::census_record(&format!("E{:03}", i), 35, 5, 1, 55_000.0, 2025))
            .collect();
        let baseline = testing::baseline(2025, records);
        let outcome = EventGenerator::new(&config, 5).generate(&baseline, 2025).unwrap();

        let promoted: Vec<&str> = outcome
            .partition
            .of_type(EventType::Promotion)
            .map(|e| e.employee_id().as_str())
            .collect();
        assert_eq!(promoted, vec!["E001", "E002"]);
    }
}
