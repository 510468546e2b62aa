//! Accrual Simulation Engine
//!
//! Pure per-year computation for the workforce and DC plan simulation:
//! hazard lookups, event generation, state accumulation, compliance, and the
//! invariant checks run before a year is finalized. Nothing here touches
//! storage; the orchestrator owns persistence and checkpoints.

pub mod accumulator;
pub mod compliance;
pub mod contribution;
pub mod generator;
pub mod hazard;
pub mod proration;
pub mod registry;
pub mod rng;
pub mod summary;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validation;

// ============================================================================
// Re-exports
// ============================================================================

pub use accumulator::{resolve_deferral_rate, StateAccumulator};
pub use compliance::{ComplianceCalculator, ComplianceRecord, ComplianceReport};
pub use contribution::{ContributionAmounts, ContributionInputs};
pub use generator::{
    BudgetShortfall, EventGenerator, GenerationOutcome, GenerationReport, ShortfallCategory,
};
pub use hazard::{HazardEngine, HazardInputs, HazardKind};
pub use registry::{Artifact, DependencyRegistry, Requirement};
pub use rng::{DecisionKind, DecisionRng};
pub use summary::YearSummary;
pub use validation::{validate_year, ValidationReport, YearArtifacts};
