//! Hiring step

use accrual_core::{
    calendar, round_cents, AccrualError, EmployeeId, EnrollmentStatus, EventPayload, Level, PerformanceTier, Result,
};
use chrono::{Days, Months};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use super::roster::Worker;
use super::{ShortfallCategory, YearPass};
use crate::rng::{weighted_index, DecisionKind};

impl YearPass<'_> {
    /// Hire to the growth target
    ///
    /// `need = round(active_start * (1 + growth)) - survivors + strategic_hires`,
    /// then capped by `max_hires_per_year` and by the salary `hiring_budget`.
    /// Each hire's level, salary, age, and start date come from its own stream
    /// keyed by the synthetic employee id.
    pub(super) fn hires(&mut self) -> Result<()> {
        let config = self.config;
        let workforce = &config.workforce;
        let active_start = self.report.active_at_start as f64;
        let survivors = self.roster.survivor_count() as i64;
        let target = (active_start * (1.0 + workforce.growth_rate)).round() as i64;
        let need = (target - survivors + workforce.strategic_hires as i64).max(0) as u32;
        self.report.hiring_need = need;

        let mut planned = need;
        if let Some(capacity) = workforce.max_hires_per_year {
            if capacity < need {
                self.shortfall(
                    ShortfallCategory::Hiring,
                    need as f64,
                    capacity as f64,
                    format!("hiring capacity of {} per year", capacity),
                );
                planned = capacity;
            }
        }

        let mut salary_spent = 0.0;
        let mut hired = 0;
        for ordinal in 1..=planned {
            let worker = self.synthesize_hire(ordinal)?;
            if let Some(budget) = workforce.hiring_budget {
                if salary_spent + worker.salary > budget {
                    self.shortfall(
                        ShortfallCategory::Hiring,
                        planned as f64,
                        hired as f64,
                        format!("hiring budget of {:.2} exhausted", budget),
                    );
                    break;
                }
            }
            salary_spent += worker.salary;
            hired += 1;

            self.emit(
                &worker.employee_id,
                worker.hire_date,
                EventPayload::Hire {
                    level: worker.level,
                    annual_salary: worker.salary,
                    birth_date: worker.birth_date,
                    performance_tier: worker.performance_tier,
                },
            )?;
            self.roster.add(worker);
        }

        debug!(year = self.year, need, hired, salary_spent, "Hiring complete");
        Ok(())
    }

    fn synthesize_hire(&self, ordinal: u32) -> Result<Worker> {
        let year = self.year;
        let compensation = &self.config.compensation;
        let age_dist = &self.config.workforce.new_hire_age;
        let employee_id = EmployeeId::new_hire(year, ordinal);
        let mut stream = self.rng.stream(&employee_id, year, DecisionKind::Hire);

        let weights: Vec<f64> = compensation.new_hire_level_mix.iter().map(|w| w.weight).collect();
        let level: Level = weighted_index(&mut stream, &weights)
            .map(|i| compensation.new_hire_level_mix[i].level)
            .ok_or_else(|| AccrualError::config("compensation.new_hire_level_mix", "needs a positive weight"))?;
        let band = compensation.band(level).ok_or_else(|| {
            AccrualError::config("compensation.levels", format!("no salary band for level {}", level))
        })?;

        let salary_dist = Normal::new((band.min_salary + band.max_salary) / 2.0, (band.max_salary - band.min_salary) / 4.0)
            .map_err(|e| AccrualError::config("compensation.levels", e.to_string()))?;
        let salary = round_cents(salary_dist.sample(&mut stream).clamp(band.min_salary, band.max_salary));

        let age_normal = Normal::new(age_dist.mean, age_dist.std_dev)
            .map_err(|e| AccrualError::config("workforce.new_hire_age", e.to_string()))?;
        let age = age_normal
            .sample(&mut stream)
            .round()
            .clamp(age_dist.min as f64, age_dist.max as f64) as u32;

        let hire_date = calendar::day_of_year(year, stream.gen_range(0..calendar::days_in_year(year)));
        let birth_date = hire_date
            .checked_sub_months(Months::new(age * 12))
            .and_then(|d| d.checked_sub_days(Days::new(stream.gen_range(0..365))))
            .ok_or_else(|| AccrualError::data_quality(year, "hire_birth_date", format!("{} age {} out of range", employee_id, age)))?;

        Ok(Worker {
            employee_id,
            birth_date,
            hire_date,
            level,
            performance_tier: PerformanceTier::Meets,
            starting_salary: salary,
            salary,
            salary_changes: Vec::new(),
            hired_this_year: true,
            termination_date: None,
            deferral_rate: 0.0,
            enrollment_status: EnrollmentStatus::NotEnrolled,
            enrollment_source: None,
        })
    }
}
