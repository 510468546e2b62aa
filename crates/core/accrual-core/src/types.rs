//! Core types shared across Accrual components

use serde::{Deserialize, Serialize};

/// Unique identifier for an employee
///
/// Ordering is lexicographic on the string and is the tie-breaker used by
/// every selection algorithm, so it must stay stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Synthetic identifier for the `ordinal`-th hire of a year
    pub fn new_hire(year: i32, ordinal: u32) -> Self {
        Self(format!("NH_{}_{:05}", year, ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scenario being simulated (one scenario per store)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

impl ScenarioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plan design the scenario applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanDesignId(pub String);

impl PlanDesignId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PlanDesignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job level (1 = entry)
pub type Level = u8;

/// Employment status at the end of a simulation year
///
/// `not_yet_hired` is represented by absence from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Active,
    Terminated,
}

/// Annual performance rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Below,
    #[default]
    Meets,
    Exceeds,
    Outstanding,
}

impl PerformanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::Below => "below",
            PerformanceTier::Meets => "meets",
            PerformanceTier::Exceeds => "exceeds",
            PerformanceTier::Outstanding => "outstanding",
        }
    }
}

/// Plan enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    #[default]
    NotEnrolled,
    Enrolled,
    OptedOut,
}

/// How an employee came to be enrolled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentSource {
    /// Enrolled before the simulation started (census import)
    Census,
    Voluntary,
    Auto,
}

/// Why employment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Voluntary,
    Involuntary,
}

/// Why a deferral rate changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferralChangeReason {
    OptOut,
    Escalation,
    Election,
}

/// Round a dollar amount to cents
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Convert a dollar amount to integer cents
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert integer cents to dollars
pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}
