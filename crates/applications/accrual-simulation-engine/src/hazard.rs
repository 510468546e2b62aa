//! Hazard engine
//!
//! Annual event probability for an employee:
//! `clamp(base_rate * age * tenure * level * performance, 0, 1)`.
//! Every multiplier comes from the configured [`HazardTable`]; a lookup miss
//! is a configuration error naming the table and band, never a silent 1.0.

use accrual_core::{AccrualError, Band, HazardConfig, HazardTable, Level, PerformanceTier, Result};

/// Which hazard table to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardKind {
    Termination,
    /// Termination for employees in their first year of service
    NewHireTermination,
    Promotion,
    Enrollment,
}

impl HazardKind {
    /// Configuration key of the table
    pub fn config_key(&self) -> &'static str {
        match self {
            HazardKind::Termination => "hazard.termination",
            HazardKind::NewHireTermination => "hazard.new_hire_termination",
            HazardKind::Promotion => "hazard.promotion",
            HazardKind::Enrollment => "hazard.enrollment",
        }
    }
}

/// Current-year attributes the hazard depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardInputs {
    pub age: u32,
    pub tenure_years: u32,
    pub level: Level,
    pub performance_tier: PerformanceTier,
}

/// Stateless probability lookups over the configured hazard tables
#[derive(Debug, Clone)]
pub struct HazardEngine {
    tables: HazardConfig,
}

impl HazardEngine {
    pub fn new(tables: HazardConfig) -> Self {
        Self { tables }
    }

    fn table(&self, kind: HazardKind) -> &HazardTable {
        match kind {
            HazardKind::Termination => &self.tables.termination,
            HazardKind::NewHireTermination => &self.tables.new_hire_termination,
            HazardKind::Promotion => &self.tables.promotion,
            HazardKind::Enrollment => &self.tables.enrollment,
        }
    }

    /// Termination probability, choosing the new-hire table inside the first year of service
    pub fn termination_probability(&self, inputs: &HazardInputs) -> Result<f64> {
        let kind = if inputs.tenure_years < 1 {
            HazardKind::NewHireTermination
        } else {
            HazardKind::Termination
        };
        self.probability(kind, inputs)
    }

    /// Probability in [0, 1] that the event fires this year
    ///
    /// # Errors
    /// `AccrualError::Configuration` when no age band, tenure band, or level
    /// multiplier covers the inputs.
    pub fn probability(&self, kind: HazardKind, inputs: &HazardInputs) -> Result<f64> {
        let table = self.table(kind);
        let key = kind.config_key();

        let age = band_multiplier(&table.age_bands, inputs.age)
            .ok_or_else(|| AccrualError::config(format!("{}.age_bands", key), format!("no band covers age {}", inputs.age)))?;
        let tenure = band_multiplier(&table.tenure_bands, inputs.tenure_years).ok_or_else(|| {
            AccrualError::config(
                format!("{}.tenure_bands", key),
                format!("no band covers tenure {}", inputs.tenure_years),
            )
        })?;
        let level = table
            .levels
            .iter()
            .find(|l| l.level == inputs.level)
            .map(|l| l.multiplier)
            .ok_or_else(|| AccrualError::config(format!("{}.levels", key), format!("no multiplier for level {}", inputs.level)))?;
        let performance = table.performance.get(inputs.performance_tier);

        let raw = table.base_rate * age * tenure * level * performance;
        if raw.is_nan() {
            return Err(AccrualError::config(key, "hazard product is not a number"));
        }
        Ok(raw.clamp(0.0, 1.0))
    }
}

fn band_multiplier(bands: &[Band], value: u32) -> Option<f64> {
    bands.iter().find(|b| b.contains(value)).map(|b| b.multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn inputs(age: u32, tenure_years: u32, level: Level) -> HazardInputs {
        HazardInputs {
            age,
            tenure_years,
            level,
            performance_tier: PerformanceTier::Meets,
        }
    }

    #[test]
    fn test_multiplies_bands() {
        let engine = HazardEngine::new(testing::config().hazard);
        // 0.12 * 1.2 (age < 30) * 1.3 (tenure < 3) * 1.0 * 1.0
        let p = engine.probability(HazardKind::Termination, &inputs(25, 1, 1)).unwrap();
        assert!((p - 0.12 * 1.2 * 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_clamps_to_one() {
        let mut hazard = testing::config().hazard;
        hazard.termination.base_rate = 0.9;
        hazard.termination.performance.below = 5.0;
        let engine = HazardEngine::new(hazard);
        let mut i = inputs(25, 1, 1);
        i.performance_tier = PerformanceTier::Below;
        assert_eq!(engine.probability(HazardKind::Termination, &i).unwrap(), 1.0);
    }

    #[test]
    fn test_first_year_uses_new_hire_table() {
        let engine = HazardEngine::new(testing::config().hazard);
        let p = engine.termination_probability(&inputs(40, 0, 1)).unwrap();
        assert!((p - 0.25).abs() < 1e-12);
        let q = engine.termination_probability(&inputs(40, 5, 1)).unwrap();
        assert!((q - 0.12 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_missing_level_is_configuration_error() {
        let engine = HazardEngine::new(testing::config().hazard);
        let err = engine.probability(HazardKind::Promotion, &inputs(30, 2, 9)).unwrap_err();
        match err {
            AccrualError::Configuration { key, .. } => assert_eq!(key, "hazard.promotion.levels"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_age_band_is_configuration_error() {
        let mut hazard = testing::config().hazard;
        hazard.termination.age_bands = vec![Band { min: 18, max: Some(65), multiplier: 1.0 }];
        let engine = HazardEngine::new(hazard);
        let err = engine.probability(HazardKind::Termination, &inputs(70, 5, 1)).unwrap_err();
        assert!(err.to_string().contains("hazard.termination.age_bands"));
        assert!(err.to_string().contains("age 70"));
    }

    #[test]
    fn test_same_inputs_same_probability() {
        let engine = HazardEngine::new(testing::config().hazard);
        let a = engine.probability(HazardKind::Promotion, &inputs(35, 4, 2)).unwrap();
        let b = engine.probability(HazardKind::Promotion, &inputs(35, 4, 2)).unwrap();
        assert_eq!(a, b);
    }
}
