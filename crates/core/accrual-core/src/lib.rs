//! Accrual Core - Shared types and traits
//!
//! This crate defines the data model used across:
//! - accrual-simulation-engine (hazards, event generation, accumulation, compliance)
//! - accrual-orchestrator (year loop, checkpoints, store, CLI)
//!
//! Key types:
//! - SimulationEvent / EventPartition (immutable event log)
//! - EmployeeYearState / YearSnapshot (per-year plan state)
//! - SimulationConfig (TOML scenario configuration)
//! - AccrualError (error taxonomy mapped to exit codes)

pub mod calendar;
pub mod config;
pub mod error;
pub mod event;
pub mod state;
pub mod traits;
pub mod types;
pub mod vesting;

pub use config::*;
pub use error::*;
pub use event::*;
pub use state::*;
pub use traits::*;
pub use types::*;
pub use vesting::*;
