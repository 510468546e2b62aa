//! Simulation configuration
//!
//! TOML-backed, read-only settings for a scenario. Keys that affect financial
//! results (vesting, statutory limits, match formula, forfeiture treatment)
//! have no defaults and fail at load when missing. Behavioural tuning keys
//! carry documented defaults.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::error::{AccrualError, Result};
use crate::types::{Level, PlanDesignId, ScenarioId};
use crate::vesting::{VestingSchedule, VestingScheduleSpec};

/// Complete scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub simulation: SimulationSection,
    #[serde(default)]
    pub workforce: WorkforceConfig,
    pub compensation: CompensationConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
    #[serde(default)]
    pub merit: MeritConfig,
    pub hazard: HazardConfig,
    pub plan: PlanConfig,
    pub vesting: VestingConfig,
    /// Statutory limits keyed by plan year
    pub limits: BTreeMap<String, StatutoryLimits>,
    pub compliance: ComplianceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    pub scenario_id: ScenarioId,
    pub plan_design_id: PlanDesignId,
    pub random_seed: u64,
    pub start_year: i32,
    pub end_year: i32,
}

/// Headcount growth and hiring constraints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkforceConfig {
    /// Target year-over-year growth in active headcount
    pub growth_rate: f64,
    /// Additional hires on top of growth and replacement need
    pub strategic_hires: u32,
    /// Hiring capacity per year
    pub max_hires_per_year: Option<u32>,
    /// Annual salary dollars available for new hires
    pub hiring_budget: Option<f64>,
    /// Share of terminations recorded as involuntary
    pub involuntary_termination_share: f64,
    /// Realized termination rate limits, as a fraction of opening headcount
    pub termination_rate_bounds: Option<RateBounds>,
    pub new_hire_age: AgeDistribution,
}

impl Default for WorkforceConfig {
    fn default() -> Self {
        Self {
            growth_rate: 0.03,
            strategic_hires: 0,
            max_hires_per_year: None,
            hiring_budget: None,
            involuntary_termination_share: 0.3,
            termination_rate_bounds: None,
            new_hire_age: AgeDistribution::default(),
        }
    }
}

/// Inclusive `[min, max]` bounds on a rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateBounds {
    pub min: f64,
    pub max: f64,
}

impl RateBounds {
    /// Smallest and largest counts out of `population` inside the bounds
    ///
    /// When no whole count fits (e.g. min = max = 0.15 of 10) the range
    /// collapses to the rounded-up minimum.
    pub fn count_range(&self, population: usize) -> (usize, usize) {
        let n = population as f64;
        let min = ((self.min * n - 1e-9).ceil().max(0.0) as usize).min(population);
        let max = ((self.max * n + 1e-9).floor().max(0.0) as usize).min(population).max(min);
        (min, max)
    }
}

/// Normal distribution for synthetic new-hire ages, clamped to [min, max]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgeDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: u32,
    pub max: u32,
}

impl Default for AgeDistribution {
    fn default() -> Self {
        Self {
            mean: 32.0,
            std_dev: 6.0,
            min: 20,
            max: 60,
        }
    }
}

/// Salary bands and new-hire level mix
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompensationConfig {
    pub levels: Vec<LevelBand>,
    pub new_hire_level_mix: Vec<LevelWeight>,
}

impl CompensationConfig {
    pub fn band(&self, level: Level) -> Option<&LevelBand> {
        self.levels.iter().find(|b| b.level == level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelBand {
    pub level: Level,
    pub min_salary: f64,
    pub max_salary: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelWeight {
    pub level: Level,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromotionConfig {
    pub min_tenure_years: u32,
    /// Highest level an employee can be promoted into
    pub max_level: Level,
    /// Promotion slots as a fraction of the eligible population
    pub budget_rate: f64,
    pub salary_increase: f64,
    pub effective_month: u32,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_tenure_years: 1,
            max_level: 5,
            budget_rate: 0.10,
            salary_increase: 0.15,
            effective_month: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeritConfig {
    /// Pool as a fraction of aggregate eligible compensation
    pub budget_percentage: f64,
    /// Guaranteed minimum increase rate for every eligible employee
    pub floor_rate: f64,
    pub tier_rates: TierRates,
    pub effective_month: u32,
}

impl Default for MeritConfig {
    fn default() -> Self {
        Self {
            budget_percentage: 0.035,
            floor_rate: 0.01,
            tier_rates: TierRates::default(),
            effective_month: 7,
        }
    }
}

/// A value per performance tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierRates {
    pub below: f64,
    pub meets: f64,
    pub exceeds: f64,
    pub outstanding: f64,
}

impl Default for TierRates {
    fn default() -> Self {
        Self {
            below: 0.0,
            meets: 0.03,
            exceeds: 0.045,
            outstanding: 0.06,
        }
    }
}

impl TierRates {
    pub fn get(&self, tier: crate::types::PerformanceTier) -> f64 {
        use crate::types::PerformanceTier::*;
        match tier {
            Below => self.below,
            Meets => self.meets,
            Exceeds => self.exceeds,
            Outstanding => self.outstanding,
        }
    }

    fn values(&self) -> [f64; 4] {
        [self.below, self.meets, self.exceeds, self.outstanding]
    }
}

/// Hazard tables per modelled event type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HazardConfig {
    pub termination: HazardTable,
    /// Applied to employees with less than one year of service
    pub new_hire_termination: HazardTable,
    pub promotion: HazardTable,
    /// Voluntary enrollment before the auto-enrollment deadline
    pub enrollment: HazardTable,
}

/// Base rate and multiplier bands for one event type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HazardTable {
    pub base_rate: f64,
    pub age_bands: Vec<Band>,
    pub tenure_bands: Vec<Band>,
    pub levels: Vec<LevelMultiplier>,
    pub performance: TierRates,
}

/// Half-open band `[min, max)`; `max = None` is open-ended
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Band {
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
    pub multiplier: f64,
}

impl Band {
    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && self.max.is_none_or(|max| value < max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelMultiplier {
    pub level: Level,
    pub multiplier: f64,
}

/// Plan design: eligibility, enrollment behaviour, and employer formulas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub auto_enrollment: AutoEnrollmentConfig,
    #[serde(default = "default_voluntary_rates")]
    pub voluntary_deferral_rates: Vec<RateWeight>,
    #[serde(default)]
    pub auto_escalation: AutoEscalationConfig,
    pub employer_match: MatchFormula,
    #[serde(default)]
    pub employer_core: CoreContribution,
}

fn default_voluntary_rates() -> Vec<RateWeight> {
    vec![
        RateWeight { rate: 0.03, weight: 1.0 },
        RateWeight { rate: 0.06, weight: 2.0 },
        RateWeight { rate: 0.10, weight: 1.0 },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EligibilityConfig {
    pub waiting_period_days: u32,
    pub minimum_age: u32,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            waiting_period_days: 0,
            minimum_age: 21,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoEnrollmentScope {
    #[default]
    NewHiresOnly,
    AllEligible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoEnrollmentConfig {
    pub enabled: bool,
    pub scope: AutoEnrollmentScope,
    /// Days after eligibility before the default election applies
    pub window_days: u32,
    pub default_deferral_rate: f64,
    /// Probability an auto-enrolled employee opts out
    pub opt_out_rate: f64,
}

impl Default for AutoEnrollmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: AutoEnrollmentScope::NewHiresOnly,
            window_days: 45,
            default_deferral_rate: 0.06,
            opt_out_rate: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateWeight {
    pub rate: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoEscalationConfig {
    pub enabled: bool,
    pub increment: f64,
    pub cap: f64,
    pub effective_month: u32,
}

impl Default for AutoEscalationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            increment: 0.01,
            cap: 0.10,
            effective_month: 1,
        }
    }
}

/// Tiered match on the employee's deferral percentage
///
/// Tiers are cumulative: `[{employee_max = 0.03, match_rate = 1.0},
/// {employee_max = 0.05, match_rate = 0.5}]` matches 100% of the first 3% and
/// 50% of the next 2%.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchFormula {
    pub tiers: Vec<MatchTier>,
}

impl MatchFormula {
    /// Match as a fraction of compensation for a given deferral percentage
    pub fn match_rate(&self, deferral_rate: f64) -> f64 {
        let mut floor = 0.0;
        let mut total = 0.0;
        for tier in &self.tiers {
            let covered = (deferral_rate.min(tier.employee_max) - floor).max(0.0);
            total += covered * tier.match_rate;
            floor = tier.employee_max;
        }
        total
    }

    /// Highest match rate the formula can produce
    pub fn max_match_rate(&self) -> f64 {
        self.match_rate(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchTier {
    pub employee_max: f64,
    pub match_rate: f64,
}

/// Non-elective employer contribution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreContribution {
    pub rate: f64,
    pub minimum_hours: f64,
    pub require_active_at_year_end: bool,
}

impl Default for CoreContribution {
    fn default() -> Self {
        Self {
            rate: 0.0,
            minimum_hours: 1000.0,
            require_active_at_year_end: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VestingConfig {
    pub schedule: VestingScheduleSpec,
    /// Years with fewer hours do not earn vesting credit; `None` uses elapsed service
    #[serde(default)]
    pub hours_threshold: Option<f64>,
}

/// IRS limits for one plan year
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatutoryLimits {
    /// 401(a)(17) compensation limit
    pub compensation_limit: f64,
    /// 402(g) elective deferral limit
    pub deferral_limit: f64,
    pub catch_up_limit: f64,
    #[serde(default = "default_catch_up_age")]
    pub catch_up_age: u32,
    /// 415(c) annual additions limit
    pub annual_additions_limit: f64,
}

fn default_catch_up_age() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceConfig {
    /// Leave forfeitures out of 415(c) annual additions
    ///
    /// Required, with no default. When `false`, the year's forfeitures are
    /// reallocated to active participants in proportion to their employer
    /// contributions and counted in their annual additions.
    pub exclude_forfeitures_from_annual_additions: bool,
}

impl SimulationConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AccrualError::config("<config>", e.to_string()))
    }

    /// Load and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AccrualError::config("<config>", format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), scenario = %config.simulation.scenario_id, "Loaded configuration");
        Ok(config)
    }

    /// Years covered by the configured run
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.simulation.start_year..=self.simulation.end_year
    }

    /// Resolved vesting schedule
    pub fn vesting_schedule(&self) -> Result<VestingSchedule> {
        VestingSchedule::from_spec(&self.vesting.schedule)
    }

    /// Statutory limits for a plan year
    pub fn limits_for(&self, year: i32) -> Result<&StatutoryLimits> {
        self.limits
            .get(&year.to_string())
            .ok_or_else(|| AccrualError::config(format!("limits.{}", year), "no statutory limits configured for this plan year"))
    }

    /// Validate everything the simulation of `years` will read
    ///
    /// Runs before any year executes so configuration problems never surface
    /// halfway through a run.
    pub fn validate(&self, years: std::ops::RangeInclusive<i32>) -> Result<()> {
        let sim = &self.simulation;
        if sim.start_year > sim.end_year {
            return Err(AccrualError::config(
                "simulation.end_year",
                format!("end year {} precedes start year {}", sim.end_year, sim.start_year),
            ));
        }

        check_rate("workforce.growth_rate", self.workforce.growth_rate, -1.0, 10.0)?;
        check_rate(
            "workforce.involuntary_termination_share",
            self.workforce.involuntary_termination_share,
            0.0,
            1.0,
        )?;
        if let Some(bounds) = self.workforce.termination_rate_bounds {
            check_rate("workforce.termination_rate_bounds.min", bounds.min, 0.0, 1.0)?;
            check_rate("workforce.termination_rate_bounds.max", bounds.max, 0.0, 1.0)?;
            if bounds.min > bounds.max {
                return Err(AccrualError::config(
                    "workforce.termination_rate_bounds",
                    format!("min {} exceeds max {}", bounds.min, bounds.max),
                ));
            }
        }
        if let Some(budget) = self.workforce.hiring_budget {
            check_rate("workforce.hiring_budget", budget, 0.0, f64::MAX)?;
        }
        let age = &self.workforce.new_hire_age;
        if age.min > age.max || age.std_dev < 0.0 {
            return Err(AccrualError::config("workforce.new_hire_age", "invalid age distribution"));
        }

        self.validate_compensation()?;

        check_rate("promotion.budget_rate", self.promotion.budget_rate, 0.0, 1.0)?;
        check_rate("promotion.salary_increase", self.promotion.salary_increase, 0.0, 10.0)?;
        check_month("promotion.effective_month", self.promotion.effective_month)?;

        check_rate("merit.budget_percentage", self.merit.budget_percentage, 0.0, 1.0)?;
        check_rate("merit.floor_rate", self.merit.floor_rate, 0.0, 1.0)?;
        for value in self.merit.tier_rates.values() {
            check_rate("merit.tier_rates", value, 0.0, 1.0)?;
        }
        check_month("merit.effective_month", self.merit.effective_month)?;

        let levels: BTreeSet<Level> = self
            .compensation
            .levels
            .iter()
            .map(|band| band.level)
            .chain(1..=self.promotion.max_level)
            .collect();
        validate_hazard("hazard.termination", &self.hazard.termination, &levels)?;
        validate_hazard("hazard.new_hire_termination", &self.hazard.new_hire_termination, &levels)?;
        validate_hazard("hazard.promotion", &self.hazard.promotion, &levels)?;
        validate_hazard("hazard.enrollment", &self.hazard.enrollment, &levels)?;

        self.validate_plan()?;
        self.vesting_schedule()?;
        if let Some(hours) = self.vesting.hours_threshold {
            check_rate("vesting.hours_threshold", hours, 0.0, 2080.0)?;
        }

        for year in years {
            let key = format!("limits.{}", year);
            let limits = self.limits_for(year)?;
            for (field, value) in [
                ("compensation_limit", limits.compensation_limit),
                ("deferral_limit", limits.deferral_limit),
                ("annual_additions_limit", limits.annual_additions_limit),
            ] {
                if !(value > 0.0) {
                    return Err(AccrualError::config(format!("{}.{}", key, field), format!("must be positive, got {}", value)));
                }
            }
            if limits.catch_up_limit < 0.0 {
                return Err(AccrualError::config(format!("{}.catch_up_limit", key), "must not be negative"));
            }
        }
        Ok(())
    }

    fn validate_compensation(&self) -> Result<()> {
        let comp = &self.compensation;
        if comp.levels.is_empty() {
            return Err(AccrualError::config("compensation.levels", "at least one level band is required"));
        }
        let mut seen = HashSet::new();
        for band in &comp.levels {
            if !seen.insert(band.level) {
                return Err(AccrualError::config(
                    "compensation.levels",
                    format!("level {} listed twice", band.level),
                ));
            }
            if !(band.min_salary > 0.0) || band.max_salary < band.min_salary {
                return Err(AccrualError::config(
                    "compensation.levels",
                    format!("level {} band {}..{} is invalid", band.level, band.min_salary, band.max_salary),
                ));
            }
        }
        if comp.new_hire_level_mix.is_empty() || comp.new_hire_level_mix.iter().all(|w| w.weight <= 0.0) {
            return Err(AccrualError::config("compensation.new_hire_level_mix", "needs a positive weight"));
        }
        for weight in &comp.new_hire_level_mix {
            if weight.weight < 0.0 || comp.band(weight.level).is_none() {
                return Err(AccrualError::config(
                    "compensation.new_hire_level_mix",
                    format!("level {} has no salary band or a negative weight", weight.level),
                ));
            }
        }
        if comp.band(self.promotion.max_level).is_none() {
            return Err(AccrualError::config(
                "promotion.max_level",
                format!("level {} has no salary band", self.promotion.max_level),
            ));
        }
        Ok(())
    }

    fn validate_plan(&self) -> Result<()> {
        let plan = &self.plan;
        let auto = &plan.auto_enrollment;
        check_rate("plan.auto_enrollment.default_deferral_rate", auto.default_deferral_rate, 0.0, 1.0)?;
        check_rate("plan.auto_enrollment.opt_out_rate", auto.opt_out_rate, 0.0, 1.0)?;

        if plan.voluntary_deferral_rates.is_empty() || plan.voluntary_deferral_rates.iter().all(|r| r.weight <= 0.0) {
            return Err(AccrualError::config("plan.voluntary_deferral_rates", "needs a positive weight"));
        }
        for choice in &plan.voluntary_deferral_rates {
            check_rate("plan.voluntary_deferral_rates", choice.rate, 0.0, 1.0)?;
            check_rate("plan.voluntary_deferral_rates", choice.weight, 0.0, f64::MAX)?;
        }

        let esc = &plan.auto_escalation;
        check_rate("plan.auto_escalation.increment", esc.increment, 0.0, 1.0)?;
        check_rate("plan.auto_escalation.cap", esc.cap, 0.0, 1.0)?;
        check_month("plan.auto_escalation.effective_month", esc.effective_month)?;

        let mut floor = 0.0;
        for tier in &plan.employer_match.tiers {
            if tier.employee_max <= floor || tier.employee_max > 1.0 {
                return Err(AccrualError::config(
                    "plan.employer_match.tiers",
                    format!("tier ceilings must increase within (0,1], got {}", tier.employee_max),
                ));
            }
            check_rate("plan.employer_match.tiers", tier.match_rate, 0.0, 10.0)?;
            floor = tier.employee_max;
        }

        check_rate("plan.employer_core.rate", plan.employer_core.rate, 0.0, 1.0)?;
        check_rate("plan.employer_core.minimum_hours", plan.employer_core.minimum_hours, 0.0, 2080.0)?;
        Ok(())
    }
}

fn check_rate(key: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(AccrualError::config(key, format!("{} outside [{}, {}]", value, min, max)));
    }
    Ok(())
}

fn check_month(key: &str, month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(AccrualError::config(key, format!("month {} outside 1..=12", month)));
    }
    Ok(())
}

/// A table must price every level an employee can hold: each salary band's
/// level and every level up to the promotion ceiling
fn validate_hazard(key: &str, table: &HazardTable, levels: &BTreeSet<Level>) -> Result<()> {
    check_rate(&format!("{}.base_rate", key), table.base_rate, 0.0, 1.0)?;
    validate_bands(&format!("{}.age_bands", key), &table.age_bands)?;
    validate_bands(&format!("{}.tenure_bands", key), &table.tenure_bands)?;
    let levels_key = format!("{}.levels", key);
    let mut seen = HashSet::new();
    for level in &table.levels {
        check_rate(&levels_key, level.multiplier, 0.0, f64::MAX)?;
        if !seen.insert(level.level) {
            return Err(AccrualError::config(levels_key, format!("level {} listed twice", level.level)));
        }
    }
    if let Some(missing) = levels.iter().find(|level| !seen.contains(*level)) {
        return Err(AccrualError::config(levels_key, format!("no multiplier for level {}", missing)));
    }
    for value in table.performance.values() {
        check_rate(&format!("{}.performance", key), value, 0.0, f64::MAX)?;
    }
    Ok(())
}

/// Bands must start at 0, be contiguous, and end open-ended
fn validate_bands(key: &str, bands: &[Band]) -> Result<()> {
    let (Some(first), Some(last)) = (bands.first(), bands.last()) else {
        return Err(AccrualError::config(key, "at least one band is required"));
    };
    if first.min != 0 {
        return Err(AccrualError::config(key, format!("first band starts at {}, not 0", first.min)));
    }
    if let Some(max) = last.max {
        return Err(AccrualError::config(key, format!("last band ends at {}; it must be open-ended", max)));
    }
    for (i, band) in bands.iter().enumerate() {
        check_rate(key, band.multiplier, 0.0, f64::MAX)?;
        if let Some(max) = band.max {
            if max <= band.min {
                return Err(AccrualError::config(key, format!("band {}..{} is empty", band.min, max)));
            }
        }
        if let Some(next) = bands.get(i + 1) {
            match band.max {
                Some(max) if max == next.min => {}
                Some(max) => {
                    return Err(AccrualError::config(
                        key,
                        format!("band ending at {} is followed by band starting at {}", max, next.min),
                    ));
                }
                None => {
                    return Err(AccrualError::config(key, "open-ended band must be last"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A complete, valid configuration used across crate tests
    pub(crate) const SAMPLE: &str = include_str!("../../../../config/baseline.toml");

    pub(crate) fn sample() -> SimulationConfig {
        SimulationConfig::from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = sample();
        config.validate(config.years()).unwrap();
        assert_eq!(config.simulation.random_seed, 42);
        assert_eq!(config.workforce.growth_rate, 0.03);
        assert_eq!(config.limits_for(2026).unwrap().deferral_limit, 24500.0);
        assert_eq!(config.limits_for(2026).unwrap().catch_up_age, 50);
    }

    #[test]
    fn test_missing_vesting_fails_at_load() {
        let without_vesting = SAMPLE.replace("[vesting]\nschedule = \"graded_6\"\nhours_threshold = 1000.0\n", "");
        let err = SimulationConfig::from_toml_str(&without_vesting).unwrap_err();
        assert!(matches!(err, AccrualError::Configuration { .. }));
        assert!(err.to_string().contains("vesting"));
    }

    #[test]
    fn test_missing_limit_year_fails_validation() {
        let config = sample();
        let err = config.validate(2025..=2028).unwrap_err();
        assert!(err.to_string().contains("limits.2028"));
    }

    #[test]
    fn test_gap_in_bands_is_rejected() {
        let gapped = SAMPLE.replace(
            "{ min = 0, max = 30, multiplier = 1.2 }, { min = 30, multiplier = 1.0 }",
            "{ min = 0, max = 30, multiplier = 1.2 }, { min = 35, multiplier = 1.0 }",
        );
        let config = SimulationConfig::from_toml_str(&gapped).unwrap();
        let err = config.validate(config.years()).unwrap_err();
        assert!(err.to_string().contains("hazard.termination.age_bands"));
    }

    #[test]
    fn test_match_formula_tiers() {
        let formula = sample().plan.employer_match;
        assert!((formula.match_rate(0.0) - 0.0).abs() < 1e-12);
        assert!((formula.match_rate(0.02) - 0.02).abs() < 1e-12);
        assert!((formula.match_rate(0.04) - 0.035).abs() < 1e-12);
        assert!((formula.match_rate(0.10) - 0.04).abs() < 1e-12);
        assert!((formula.max_match_rate() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_hazard_level_gap_is_rejected() {
        let mut config = sample();
        config.hazard.termination.levels.retain(|l| l.level != 3);
        let err = config.validate(config.years()).unwrap_err();
        match err {
            AccrualError::Configuration { key, message } => {
                assert_eq!(key, "hazard.termination.levels");
                assert!(message.contains("level 3"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_hazard_levels_must_reach_promotion_ceiling() {
        let mut config = sample();
        config.promotion.max_level = 4;
        config.compensation.levels.push(LevelBand {
            level: 4,
            min_salary: 120_000.0,
            max_salary: 180_000.0,
        });
        let err = config.validate(config.years()).unwrap_err();
        assert!(err.to_string().contains("hazard.termination.levels"), "{err}");
    }

    #[test]
    fn test_bands_must_cover_zero_to_open_end() {
        let mut late_start = sample();
        late_start.hazard.promotion.age_bands[0].min = 18;
        let err = late_start.validate(late_start.years()).unwrap_err();
        assert!(err.to_string().contains("hazard.promotion.age_bands"), "{err}");

        let mut closed = sample();
        closed.hazard.termination.tenure_bands[1].max = Some(40);
        let err = closed.validate(closed.years()).unwrap_err();
        assert!(err.to_string().contains("hazard.termination.tenure_bands"), "{err}");
    }

    #[test]
    fn test_termination_rate_bounds() {
        let bounded = SAMPLE.replace(
            "[compensation]",
            "[workforce]\ntermination_rate_bounds = { min = 0.05, max = 0.2 }\n\n[compensation]",
        );
        let config = SimulationConfig::from_toml_str(&bounded).unwrap();
        config.validate(config.years()).unwrap();
        let bounds = config.workforce.termination_rate_bounds.unwrap();
        assert_eq!(bounds.count_range(50), (3, 10));
        assert_eq!(bounds.count_range(0), (0, 0));
        assert_eq!(RateBounds { min: 0.15, max: 0.15 }.count_range(10), (2, 2));

        let mut inverted = config.clone();
        inverted.workforce.termination_rate_bounds = Some(RateBounds { min: 0.3, max: 0.1 });
        let err = inverted.validate(inverted.years()).unwrap_err();
        assert!(err.to_string().contains("workforce.termination_rate_bounds"), "{err}");
    }

    #[test]
    fn test_band_contains() {
        let band = Band { min: 30, max: Some(40), multiplier: 1.0 };
        assert!(band.contains(30));
        assert!(band.contains(39));
        assert!(!band.contains(40));
        let open = Band { min: 40, max: None, multiplier: 1.0 };
        assert!(open.contains(99));
    }
}
