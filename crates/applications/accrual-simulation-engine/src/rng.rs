//! Per-decision seeded random streams
//!
//! Each stochastic decision (does employee E terminate in year Y?) draws from
//! its own ChaCha stream whose seed is the SHA-256 of
//! `(scenario_seed, employee_id, year, decision kind)`. Outcomes therefore
//! depend only on those four inputs, never on iteration order or on how many
//! other decisions were made first.

use accrual_core::EmployeeId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Kind of stochastic decision, part of the stream seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    Termination,
    Hire,
    Promotion,
    VoluntaryEnrollment,
    OptOut,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Termination => "termination",
            DecisionKind::Hire => "hire",
            DecisionKind::Promotion => "promotion",
            DecisionKind::VoluntaryEnrollment => "voluntary_enrollment",
            DecisionKind::OptOut => "opt_out",
        }
    }
}

/// Source of per-decision random streams for one scenario seed
#[derive(Debug, Clone, Copy)]
pub struct DecisionRng {
    seed: u64,
}

impl DecisionRng {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent stream for one decision
    pub fn stream(&self, employee_id: &EmployeeId, year: i32, kind: DecisionKind) -> ChaCha8Rng {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(employee_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(year.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(kind.as_str().as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();
        ChaCha8Rng::from_seed(seed)
    }

    /// First uniform draw in [0, 1) from a decision's stream
    pub fn uniform(&self, employee_id: &EmployeeId, year: i32, kind: DecisionKind) -> f64 {
        self.stream(employee_id, year, kind).gen_range(0.0..1.0)
    }
}

/// Pick an index from non-negative weights; `None` when no weight is positive
pub fn weighted_index<R: Rng>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let mut target = rng.gen_range(0.0..total);
    for (i, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        if target < *weight {
            return Some(i);
        }
        target -= weight;
    }
    weights.iter().rposition(|w| *w > 0.0)
}
