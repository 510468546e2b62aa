//! Error types for the orchestrator

use accrual_core::{AccrualError, ErrorCategory};
use thiserror::Error;

use crate::stage::Stage;

/// Orchestrator result type
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while driving the year pipeline
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A stage failed; carries the year and stage it failed in
    #[error("{year}/{stage} failed: {source}")]
    Stage {
        year: i32,
        stage: Stage,
        #[source]
        source: AccrualError,
    },

    /// Failure outside any year's pipeline (configuration, baseline import, store setup)
    #[error(transparent)]
    Core(#[from] AccrualError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed command-line input
    #[error("Invalid argument: {0}")]
    Usage(String),
}

impl OrchestratorError {
    /// Attach year and stage to a core error
    pub fn stage(year: i32, stage: Stage, source: AccrualError) -> Self {
        Self::Stage { year, stage, source }
    }

    /// Create a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Stage { source, .. } | Self::Core(source) => source.category(),
            Self::Io(_) | Self::Json(_) | Self::Usage(_) => ErrorCategory::Io,
        }
    }

    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_category() {
        let dependency = OrchestratorError::stage(
            2027,
            Stage::StateAccumulation,
            AccrualError::dependency(2027, "state_accumulation", "snapshot for 2026 must exist and be finalized"),
        );
        assert_eq!(dependency.exit_code(), 3);
        assert_eq!(
            dependency.to_string(),
            "2027/state_accumulation failed: Dependency violation for state_accumulation in 2027: snapshot for 2026 must exist and be finalized"
        );

        let config = OrchestratorError::from(AccrualError::config("limits.2026", "missing"));
        assert_eq!(config.exit_code(), 2);
        assert_eq!(OrchestratorError::usage("bad range").exit_code(), 1);
    }
}
