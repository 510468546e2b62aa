//! # Accrual Orchestrator
//!
//! Drives the simulation one year at a time through a fixed stage sequence,
//! persisting every stage's output and a checkpoint before moving on.
//!
//! ## Architecture
//!
//! ```text
//! accrual run 2025-2027
//!   └── Orchestrator (single writer, data directory lock)
//!         for each year:
//!           FOUNDATION → EVENT_GENERATION → STATE_ACCUMULATION → VALIDATION → REPORTING
//!                │               │                  │                 │            │
//!                └── DependencyRegistry check before each stage ──────┘            │
//!                └── artifacts written atomically, then checkpoint appended ───────┘
//! ```
//!
//! Stages run one at a time: no two stages ever write the same
//! year's event log or snapshot at once. Finalized years are read-only and
//! can be inspected (`status`, `summary`) while a later year runs.
//!
//! ## Resume
//!
//! A stage interrupted before its checkpoint is recomputed on the next run.
//! A checkpointed stage is skipped after confirming its artifacts still hash
//! to the recorded value, so re-running a completed range writes nothing.

#![warn(clippy::all)]

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod stage;
pub mod store;

// ============================================================================
// Public exports
// ============================================================================

// Pipeline
pub use orchestrator::{load_compliance, load_summaries, verify, FoundationRecord, Orchestrator, RunReport, VerifyReport};
pub use stage::{parse_year_range, Stage, StopPoint};

// Run inputs
pub use context::{load_census, RunContext};

// Persistence
pub use checkpoint::{Checkpoint, CheckpointDecision, CheckpointLog};
pub use store::{ArtifactKind, FileStore, WriterLock};

// Error handling
pub use error::{OrchestratorError, Result};
