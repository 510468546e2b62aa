//! Employee deferral and employer contribution arithmetic
//!
//! Order of application:
//! 1. 401(a)(17): cap the compensation base at the plan-year limit
//! 2. 402(g): cap elective deferrals, plus catch-up once the employee reaches catch-up age
//! 3. Tiered match on the effective deferral percentage
//! 4. Core (non-elective) contribution for employees meeting the hours and active tests
//! 5. 415(c): reduce core, then match, until annual additions fit the limit
//!
//! Catch-up deferrals are not annual additions.

use accrual_core::{round_cents, PlanConfig, StatutoryLimits};
use serde::{Deserialize, Serialize};

/// Per-employee inputs for one plan year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionInputs {
    pub compensation: f64,
    pub deferral_rate: f64,
    pub age_at_year_end: u32,
    pub hours_worked: f64,
    pub active_at_year_end: bool,
}

/// Contribution amounts for one employee-year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContributionAmounts {
    pub eligible_compensation: f64,
    pub capped_compensation: f64,
    /// The 401(a)(17) limit reduced the formula base
    pub compensation_capped: bool,
    pub employee_deferral: f64,
    /// Portion of `employee_deferral` above the 402(g) limit
    pub catch_up_deferral: f64,
    pub match_amount: f64,
    pub core_amount: f64,
    /// The 415(c) limit reduced employer money
    pub additions_limited: bool,
}

impl ContributionAmounts {
    pub fn employer_total(&self) -> f64 {
        self.match_amount + self.core_amount
    }

    /// Amounts counted against 415(c)
    pub fn annual_additions(&self) -> f64 {
        self.employee_deferral - self.catch_up_deferral + self.match_amount + self.core_amount
    }

    pub fn is_zero(&self) -> bool {
        self.employee_deferral == 0.0 && self.match_amount == 0.0 && self.core_amount == 0.0
    }
}

/// Compute deferrals and employer contributions under one year's limits
pub fn calculate(plan: &PlanConfig, limits: &StatutoryLimits, inputs: &ContributionInputs) -> ContributionAmounts {
    let eligible = round_cents(inputs.compensation.max(0.0));
    let compensation_capped = eligible > limits.compensation_limit;
    let capped = eligible.min(limits.compensation_limit);

    let catch_up_room = if inputs.age_at_year_end >= limits.catch_up_age {
        limits.catch_up_limit
    } else {
        0.0
    };
    let elected = round_cents(capped * inputs.deferral_rate.clamp(0.0, 1.0));
    let deferral = elected.min(limits.deferral_limit + catch_up_room);
    let catch_up = round_cents((deferral - limits.deferral_limit).max(0.0));

    let effective_rate = if capped > 0.0 { deferral / capped } else { 0.0 };
    let mut match_amount = round_cents(capped * plan.employer_match.match_rate(effective_rate));

    let core = &plan.employer_core;
    let core_eligible =
        inputs.hours_worked >= core.minimum_hours && (inputs.active_at_year_end || !core.require_active_at_year_end);
    let mut core_amount = if core_eligible { round_cents(capped * core.rate) } else { 0.0 };

    let mut additions_limited = false;
    let mut excess = round_cents(deferral - catch_up + match_amount + core_amount - limits.annual_additions_limit);
    if excess > 0.0 {
        additions_limited = true;
        let from_core = excess.min(core_amount);
        core_amount = round_cents(core_amount - from_core);
        excess = round_cents(excess - from_core);
        let from_match = excess.min(match_amount);
        match_amount = round_cents(match_amount - from_match);
    }

    ContributionAmounts {
        eligible_compensation: eligible,
        capped_compensation: capped,
        compensation_capped,
        employee_deferral: deferral,
        catch_up_deferral: catch_up,
        match_amount,
        core_amount,
        additions_limited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn inputs(compensation: f64, deferral_rate: f64, age: u32) -> ContributionInputs {
        ContributionInputs {
            compensation,
            deferral_rate,
            age_at_year_end: age,
            hours_worked: 2080.0,
            active_at_year_end: true,
        }
    }

    #[test]
    fn test_basic_match_and_core() {
        let config = testing::config();
        let limits = config.limits_for(2025).unwrap();
        let amounts = calculate(&config.plan, limits, &inputs(100_000.0, 0.06, 40));
        assert_eq!(amounts.employee_deferral, 6_000.0);
        // 100% of 3% + 50% of next 2%
        assert_eq!(amounts.match_amount, 4_000.0);
        assert_eq!(amounts.core_amount, 2_000.0);
        assert!(!amounts.compensation_capped);
        assert!(!amounts.additions_limited);
    }

    #[test]
    fn test_compensation_limit_caps_formula_base() {
        let config = testing::config();
        let limits = config.limits_for(2025).unwrap();
        let amounts = calculate(&config.plan, limits, &inputs(500_000.0, 0.03, 40));
        assert!(amounts.compensation_capped);
        assert_eq!(amounts.eligible_compensation, 500_000.0);
        assert_eq!(amounts.capped_compensation, 350_000.0);
        assert_eq!(amounts.employee_deferral, 10_500.0);
        assert_eq!(amounts.match_amount, 10_500.0);
    }

    #[test]
    fn test_deferral_limit_with_and_without_catch_up() {
        let config = testing::config();
        let limits = config.limits_for(2025).unwrap();

        let young = calculate(&config.plan, limits, &inputs(300_000.0, 0.5, 40));
        assert_eq!(young.employee_deferral, 23_500.0);
        assert_eq!(young.catch_up_deferral, 0.0);

        let older = calculate(&config.plan, limits, &inputs(300_000.0, 0.5, 55));
        assert_eq!(older.employee_deferral, 31_000.0);
        assert_eq!(older.catch_up_deferral, 7_500.0);
    }

    #[test]
    fn test_annual_additions_limit_reduces_core_then_match() {
        let mut config = testing::config();
        config.plan.employer_core.rate = 0.20;
        let limits = config.limits_for(2025).unwrap();
        let amounts = calculate(&config.plan, limits, &inputs(300_000.0, 0.10, 40));
        // deferral 23,500 + match 12,000 + core 60,000 = 95,500 against 70,000
        assert!(amounts.additions_limited);
        assert_eq!(amounts.core_amount, 34_500.0);
        assert_eq!(amounts.match_amount, 12_000.0);
        assert_eq!(amounts.annual_additions(), 70_000.0);
    }

    #[test]
    fn test_core_requires_hours() {
        let config = testing::config();
        let limits = config.limits_for(2025).unwrap();
        let mut short = inputs(20_000.0, 0.0, 30);
        short.hours_worked = 500.0;
        let amounts = calculate(&config.plan, limits, &short);
        assert_eq!(amounts.core_amount, 0.0);
        assert!(amounts.is_zero());
    }
}
