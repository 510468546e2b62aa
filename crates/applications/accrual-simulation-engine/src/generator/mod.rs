//! Event generator
//!
//! Turns the prior year's finalized population into the current year's event
//! partition. Categories run in the mandatory resolution order:
//!
//! 1. termination (hazard-sampled, held inside the configured rate bounds)
//! 2. hire (growth + replacement + strategic need, capped by capacity and budget)
//! 3. promotion (hazard-selected, budget-slotted, ties to lowest employee id)
//! 4. merit (pool-limited, tier-based with a guaranteed floor)
//! 5. enrollment / deferral change (voluntary window, auto-enrollment, opt-out, escalation)
//! 6. employer contribution (deferral, match, core under the year's limits)
//!
//! Each later step reads the population produced by the earlier ones. The
//! partition is always logged in this order; promotion and merit are decided
//! in calendar order of their effective months so each raise builds on the
//! salary in effect on its date.
//! Budget constraints that bind are reported as [`BudgetShortfall`]s, never
//! as errors.

mod contributions;
mod enrollment;
mod hiring;
mod merit;
mod promotion;
mod roster;
mod termination;

use std::collections::HashSet;

use accrual_core::{
    AccrualError, EmployeeId, EventPartition, EventPayload, EventScope, Result, SimulationConfig,
    SimulationEvent, YearSnapshot,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::hazard::HazardEngine;
use crate::rng::DecisionRng;
use roster::Roster;

/// Constraint category that limited the year's events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallCategory {
    /// Realized terminations moved into `workforce.termination_rate_bounds`
    Termination,
    Hiring,
    Promotion,
    Merit,
}

/// A target the generator could not meet within its constraints
///
/// `requested` and `granted` are headcounts for termination, hiring and
/// promotion and dollars for merit. For termination, `requested` is the
/// sampled count and `granted` the count after applying the rate bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetShortfall {
    pub category: ShortfallCategory,
    pub requested: f64,
    pub granted: f64,
    pub constraint: String,
}

/// Non-event facts about a generation pass, kept for the year summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub simulation_year: i32,
    pub active_at_start: usize,
    pub hiring_need: u32,
    pub merit_pool: f64,
    pub merit_allocated: f64,
    pub shortfalls: Vec<BudgetShortfall>,
}

/// Result of generating one year
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub partition: EventPartition,
    pub report: GenerationReport,
}

/// Hazard- and constraint-driven event generator
pub struct EventGenerator<'a> {
    config: &'a SimulationConfig,
    hazards: HazardEngine,
    rng: DecisionRng,
}

impl<'a> EventGenerator<'a> {
    pub fn new(config: &'a SimulationConfig, seed: u64) -> Self {
        Self {
            config,
            hazards: HazardEngine::new(config.hazard.clone()),
            rng: DecisionRng::new(seed),
        }
    }

    /// Generate the finalized event partition for `year`
    ///
    /// # Arguments
    /// * `prior` - finalized snapshot for `year - 1` (the census baseline for the first year)
    /// * `year` - simulation year to generate
    ///
    /// # Errors
    /// `DependencyViolation` if `prior` is not the finalized previous year,
    /// `Configuration` on hazard or band lookup misses.
    pub fn generate(&self, prior: &YearSnapshot, year: i32) -> Result<GenerationOutcome> {
        if prior.simulation_year() != year - 1 || !prior.is_finalized() {
            return Err(AccrualError::dependency(
                year,
                "event_generation",
                format!(
                    "requires finalized {} snapshot, got {} (finalized: {})",
                    year - 1,
                    prior.simulation_year(),
                    prior.is_finalized()
                ),
            ));
        }
        let limits = self.config.limits_for(year)?;

        let sim = &self.config.simulation;
        let mut pass = YearPass {
            config: self.config,
            hazards: &self.hazards,
            rng: self.rng,
            scope: EventScope::new(sim.scenario_id.clone(), sim.plan_design_id.clone(), year),
            year,
            roster: Roster::from_active(prior.states()),
            events: Vec::new(),
            enrolled: HashSet::new(),
            report: GenerationReport {
                simulation_year: year,
                active_at_start: prior.active_count(),
                hiring_need: 0,
                merit_pool: 0.0,
                merit_allocated: 0.0,
                shortfalls: Vec::new(),
            },
        };

        pass.terminations()?;
        pass.hires()?;
        // Raises compound, so decide them in calendar order; a shared month
        // resolves the promotion first.
        if self.config.merit.effective_month < self.config.promotion.effective_month {
            pass.merit()?;
            pass.promotions()?;
        } else {
            pass.promotions()?;
            pass.merit()?;
        }
        pass.enrollment()?;
        pass.employer_contributions(limits)?;

        for shortfall in &pass.report.shortfalls {
            warn!(
                year,
                category = ?shortfall.category,
                requested = shortfall.requested,
                granted = shortfall.granted,
                "⚠️  Budget shortfall: {}",
                shortfall.constraint
            );
        }

        let partition = EventPartition::assemble(year, pass.events)?;
        info!(
            year,
            events = partition.len(),
            active_at_start = pass.report.active_at_start,
            active_at_end = pass.roster.survivor_count(),
            "🎲 Generated events"
        );
        Ok(GenerationOutcome {
            partition,
            report: pass.report,
        })
    }
}

/// State of one generation pass
struct YearPass<'g> {
    config: &'g SimulationConfig,
    hazards: &'g HazardEngine,
    rng: DecisionRng,
    scope: EventScope,
    year: i32,
    roster: Roster,
    events: Vec<SimulationEvent>,
    /// Employees with an enrollment event this year
    enrolled: HashSet<EmployeeId>,
    report: GenerationReport,
}

impl YearPass<'_> {
    fn emit(&mut self, employee_id: &EmployeeId, effective_date: NaiveDate, payload: EventPayload) -> Result<()> {
        let event_type = payload.event_type();
        let event = SimulationEvent::new(&self.scope, employee_id.clone(), effective_date, payload, 0)?;
        debug!(year = self.year, employee_id = %employee_id, %event_type, date = %effective_date, "Event");
        self.events.push(event);
        Ok(())
    }

    fn shortfall(&mut self, category: ShortfallCategory, requested: f64, granted: f64, constraint: impl Into<String>) {
        self.report.shortfalls.push(BudgetShortfall {
            category,
            requested,
            granted,
            constraint: constraint.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use accrual_core::{EventType, YearSnapshot};

    fn generate(config: &SimulationConfig, size: usize) -> GenerationOutcome {
        let baseline = testing::baseline(2025, testing::workforce(size, 2025));
        EventGenerator::new(config, config.simulation.random_seed)
            .generate(&baseline, 2025)
            .unwrap()
    }

    #[test]
    fn test_rejects_unfinalized_prior() {
        let config = testing::config();
        let prior = YearSnapshot::new(2024);
        let err = EventGenerator::new(&config, 1).generate(&prior, 2025).unwrap_err();
        assert!(matches!(err, AccrualError::DependencyViolation { year: 2025, .. }));
    }

    #[test]
    fn test_rejects_wrong_prior_year() {
        let config = testing::config();
        let baseline = testing::baseline(2025, testing::workforce(5, 2025));
        let err = EventGenerator::new(&config, 1).generate(&baseline, 2026).unwrap_err();
        assert!(matches!(err, AccrualError::DependencyViolation { .. }));
    }

    #[test]
    fn test_same_seed_same_events() {
        let config = testing::config();
        let a = generate(&config, 120);
        let b = generate(&config, 120);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.partition).unwrap(),
            serde_json::to_string(&b.partition).unwrap()
        );
    }

    #[test]
    fn test_different_seed_changes_events() {
        let config = testing::config();
        let baseline = testing::baseline(2025, testing::workforce(200, 2025));
        let a = EventGenerator::new(&config, 1).generate(&baseline, 2025).unwrap();
        let b = EventGenerator::new(&config, 2).generate(&baseline, 2025).unwrap();
        assert_ne!(a.partition, b.partition);
    }

    #[test]
    fn test_events_follow_resolution_order() {
        let config = testing::config();
        let outcome = generate(&config, 150);
        let ranks: Vec<u8> = outcome
            .partition
            .events()
            .iter()
            .map(|e| e.event_type().resolution_rank())
            .collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
        assert!(outcome.partition.count(EventType::Hire) > 0);
    }

    #[test]
    fn test_headcount_reaches_growth_target() {
        let config = testing::config();
        let outcome = generate(&config, 200);
        let terms = outcome.partition.count(EventType::Termination) as i64;
        let hires = outcome.partition.count(EventType::Hire) as i64;
        let target = (200.0_f64 * (1.0 + config.workforce.growth_rate)).round() as i64;
        assert_eq!(200 - terms + hires, target);
        assert!(outcome.report.shortfalls.iter().all(|s| s.category != ShortfallCategory::Hiring));
    }

    #[test]
    fn test_no_events_for_terminated_employees_after_termination() {
        let config = testing::config();
        let outcome = generate(&config, 200);
        let terminated: HashSet<&EmployeeId> = outcome
            .partition
            .of_type(EventType::Termination)
            .map(|e| e.employee_id())
            .collect();
        for event in outcome.partition.events() {
            if terminated.contains(event.employee_id()) {
                assert!(
                    matches!(event.event_type(), EventType::Termination | EventType::EmployerContribution),
                    "{} event for terminated {}",
                    event.event_type(),
                    event.employee_id()
                );
            }
        }
    }
}
