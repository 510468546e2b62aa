//! Error types for Accrual

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, AccrualError>;

/// Broad failure category, used for exit codes and propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Dependency,
    DataQuality,
    Conflict,
    Io,
}

impl ErrorCategory {
    /// Process exit code reported by the CLI for this category
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Dependency => 3,
            ErrorCategory::DataQuality => 4,
            ErrorCategory::Conflict => 5,
            ErrorCategory::Io => 1,
        }
    }
}

/// Core error type for Accrual operations
///
/// Every variant is fatal for the year being processed. Recoverable budget
/// shortfalls are not errors; they travel in the generation outcome.
#[derive(Error, Debug)]
pub enum AccrualError {
    /// Missing or invalid configuration (hazard band, vesting schedule, limits)
    #[error("Configuration error at `{key}`: {message}")]
    Configuration { key: String, message: String },

    /// A stage was asked to run before the state it depends on was finalized
    #[error("Dependency violation for {stage} in {year}: {requirement}")]
    DependencyViolation {
        year: i32,
        stage: String,
        requirement: String,
    },

    /// Post-stage validation found an invariant violation
    #[error("Data quality error in {year} ({invariant}): {detail}")]
    DataQuality {
        year: i32,
        invariant: String,
        detail: String,
    },

    /// Concurrent modification detected on single-writer state
    #[error("Transaction conflict on {resource}: {detail}")]
    TransactionConflict { resource: String, detail: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AccrualError {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a dependency violation
    pub fn dependency(year: i32, stage: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self::DependencyViolation {
            year,
            stage: stage.into(),
            requirement: requirement.into(),
        }
    }

    /// Create a data quality error
    pub fn data_quality(year: i32, invariant: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DataQuality {
            year,
            invariant: invariant.into(),
            detail: detail.into(),
        }
    }

    /// Create a transaction conflict
    pub fn conflict(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::TransactionConflict {
            resource: resource.into(),
            detail: detail.into(),
        }
    }

    /// Category used for exit codes
    pub fn category(&self) -> ErrorCategory {
        match self {
            AccrualError::Configuration { .. } | AccrualError::Toml(_) => ErrorCategory::Configuration,
            AccrualError::DependencyViolation { .. } => ErrorCategory::Dependency,
            AccrualError::DataQuality { .. } => ErrorCategory::DataQuality,
            AccrualError::TransactionConflict { .. } => ErrorCategory::Conflict,
            AccrualError::Io(_) | AccrualError::Json(_) => ErrorCategory::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_map_to_distinct_exit_codes() {
        let config = AccrualError::config("vesting.schedule", "unknown schedule");
        let dependency = AccrualError::dependency(2026, "state_accumulation", "2025 not finalized");
        let quality = AccrualError::data_quality(2026, "unique_event_id", "duplicate");
        let conflict = AccrualError::conflict("events/2026", "lock lost");

        let codes = [
            config.category().exit_code(),
            dependency.category().exit_code(),
            quality.category().exit_code(),
            conflict.category().exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }

    #[test]
    fn test_message_names_key() {
        let err = AccrualError::config("hazard.termination.age_bands", "no band covers age 71");
        let msg = err.to_string();
        assert!(msg.contains("hazard.termination.age_bands"));
        assert!(msg.contains("age 71"));
    }
}
