//! Core traits for Accrual
//!
//! The dependency registry checks stage prerequisites through
//! [`CompletionLedger`] only, so it works the same against the on-disk store
//! and against in-memory fixtures.

/// Read-only view of which per-year artifacts have been persisted
pub trait CompletionLedger {
    /// The event partition for `year` has been written
    fn events_written(&self, year: i32) -> bool;

    /// A snapshot (finalized or not) exists for `year`
    fn snapshot_written(&self, year: i32) -> bool;

    /// The snapshot for `year` exists and is finalized
    fn snapshot_finalized(&self, year: i32) -> bool;
}
