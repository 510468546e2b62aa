//! Dependency registry
//!
//! Maps each pipeline stage to the per-year artifacts it needs, and checks
//! them against a [`CompletionLedger`] before the stage writes anything.

use std::collections::BTreeMap;
use std::fmt;

use accrual_core::{AccrualError, CompletionLedger, Result};

/// A persisted per-year artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    EventPartition,
    Snapshot,
    FinalizedSnapshot,
}

/// "artifact X must exist for year N - offset"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub artifact: Artifact,
    pub years_back: i32,
}

impl Requirement {
    pub const fn new(artifact: Artifact, years_back: i32) -> Self {
        Self { artifact, years_back }
    }

    fn satisfied(&self, year: i32, ledger: &dyn CompletionLedger) -> bool {
        let target = year - self.years_back;
        match self.artifact {
            Artifact::EventPartition => ledger.events_written(target),
            Artifact::Snapshot => ledger.snapshot_written(target),
            Artifact::FinalizedSnapshot => ledger.snapshot_finalized(target),
        }
    }

    fn describe(&self, year: i32) -> String {
        let target = year - self.years_back;
        match self.artifact {
            Artifact::EventPartition => format!("event partition for {} must be written", target),
            Artifact::Snapshot => format!("snapshot for {} must be written", target),
            Artifact::FinalizedSnapshot => format!("snapshot for {} must exist and be finalized", target),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (N-{})", self.artifact, self.years_back)
    }
}

/// Stage name to prerequisite mapping
#[derive(Debug, Clone, Default)]
pub struct DependencyRegistry {
    rules: BTreeMap<&'static str, Vec<Requirement>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prerequisites of the year pipeline
    ///
    /// The first simulated year reads the census baseline, stored as the
    /// finalized snapshot for `start_year - 1`, so one rule covers every year.
    pub fn standard() -> Self {
        use Artifact::*;
        Self::new()
            .register("foundation", vec![Requirement::new(FinalizedSnapshot, 1)])
            .register("event_generation", vec![Requirement::new(FinalizedSnapshot, 1)])
            .register(
                "state_accumulation",
                vec![Requirement::new(FinalizedSnapshot, 1), Requirement::new(EventPartition, 0)],
            )
            .register(
                "validation",
                vec![Requirement::new(EventPartition, 0), Requirement::new(Snapshot, 0)],
            )
            .register("reporting", vec![Requirement::new(FinalizedSnapshot, 0)])
    }

    pub fn register(mut self, stage: &'static str, requirements: Vec<Requirement>) -> Self {
        self.rules.insert(stage, requirements);
        self
    }

    pub fn requirements(&self, stage: &str) -> Option<&[Requirement]> {
        self.rules.get(stage).map(Vec::as_slice)
    }

    /// Fail with `DependencyViolation` unless every prerequisite of `stage` for `year` holds
    pub fn check(&self, stage: &str, year: i32, ledger: &dyn CompletionLedger) -> Result<()> {
        let requirements = self
            .requirements(stage)
            .ok_or_else(|| AccrualError::dependency(year, stage, "stage has no registry entry"))?;
        for requirement in requirements {
            if !requirement.satisfied(year, ledger) {
                tracing::error!(year, stage, requirement = %requirement, "❌ Dependency not satisfied");
                return Err(AccrualError::dependency(year, stage, requirement.describe(year)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Ledger {
        events: HashSet<i32>,
        snapshots: HashSet<i32>,
        finalized: HashSet<i32>,
    }

    impl CompletionLedger for Ledger {
        fn events_written(&self, year: i32) -> bool {
            self.events.contains(&year)
        }
        fn snapshot_written(&self, year: i32) -> bool {
            self.snapshots.contains(&year)
        }
        fn snapshot_finalized(&self, year: i32) -> bool {
            self.finalized.contains(&year)
        }
    }

    #[test]
    fn test_accumulation_requires_finalized_prior_year() {
        let registry = DependencyRegistry::standard();
        let mut ledger = Ledger::default();
        ledger.events.insert(2027);
        ledger.snapshots.insert(2026);

        let err = registry.check("state_accumulation", 2027, &ledger).unwrap_err();
        match err {
            AccrualError::DependencyViolation { year, stage, requirement } => {
                assert_eq!(year, 2027);
                assert_eq!(stage, "state_accumulation");
                assert!(requirement.contains("2026"));
            }
            other => panic!("unexpected error: {other}"),
        }

        ledger.finalized.insert(2026);
        registry.check("state_accumulation", 2027, &ledger).unwrap();
    }

    #[test]
    fn test_accumulation_requires_current_events() {
        let registry = DependencyRegistry::standard();
        let mut ledger = Ledger::default();
        ledger.finalized.insert(2024);
        let err = registry.check("state_accumulation", 2025, &ledger).unwrap_err();
        assert!(err.to_string().contains("event partition for 2025"));
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let registry = DependencyRegistry::standard();
        let ledger = Ledger::default();
        assert!(registry.check("publish", 2025, &ledger).is_err());
    }
}
