//! Run context threaded through every stage

use std::path::Path;

use accrual_core::{CensusRecord, Result, ScenarioId, SimulationConfig};
use tracing::info;

use crate::store::content_hash;

/// Immutable inputs of one run
///
/// Built once in `main` (or a test) and passed by reference to each stage;
/// nothing about a run lives in globals.
#[derive(Debug, Clone)]
pub struct RunContext {
    config: SimulationConfig,
    config_hash: String,
}

impl RunContext {
    /// Wrap a configuration, validating it for its own year range
    ///
    /// # Errors
    /// `Configuration` naming the first bad key.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate(config.years())?;
        let config_hash = content_hash(&serde_json::to_vec(&config)?);
        info!(
            scenario = %config.simulation.scenario_id,
            plan = %config.simulation.plan_design_id,
            seed = config.simulation.random_seed,
            years = ?config.years(),
            "📋 Run context ready"
        );
        Ok(Self { config, config_hash })
    }

    /// Load a TOML configuration and apply command-line overrides
    pub fn load(path: &Path, seed: Option<u64>, scenario: Option<String>) -> Result<Self> {
        let mut config = SimulationConfig::load(path)?;
        if let Some(seed) = seed {
            config.simulation.random_seed = seed;
        }
        if let Some(scenario) = scenario {
            config.simulation.scenario_id = ScenarioId::new(scenario);
        }
        Self::new(config)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Hash of the effective configuration, recorded in every checkpoint
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn seed(&self) -> u64 {
        self.config.simulation.random_seed
    }

    pub fn start_year(&self) -> i32 {
        self.config.simulation.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.config.simulation.end_year
    }
}

/// Read a census baseline (JSON array of records)
pub fn load_census(path: &Path) -> Result<Vec<CensusRecord>> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrual_simulation_engine::testing;

    #[test]
    fn test_config_hash_tracks_seed() {
        let a = RunContext::new(testing::config()).unwrap();
        let b = RunContext::new(testing::config()).unwrap();
        assert_eq!(a.config_hash(), b.config_hash());

        let mut changed = testing::config();
        changed.simulation.random_seed += 1;
        let c = RunContext::new(changed).unwrap();
        assert_ne!(a.config_hash(), c.config_hash());
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = testing::config();
        config.limits.remove("2026");
        assert!(RunContext::new(config).is_err());
    }
}
