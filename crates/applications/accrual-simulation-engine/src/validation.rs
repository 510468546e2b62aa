//! Post-accumulation invariant checks
//!
//! Run against the year's artifacts as read back from storage, before the
//! snapshot is finalized. Any failure is a `DataQuality` error naming the
//! invariant; the snapshot then stays unfinalized and later years cannot run.

use std::collections::{HashMap, HashSet};

use accrual_core::{
    to_cents, AccrualError, EmployeeId, EventPartition, EventPayload, EventType, Result, YearSnapshot,
};
use serde::Serialize;
use tracing::info;

use crate::compliance::ComplianceCalculator;
use crate::generator::GenerationReport;

/// Names of the checks that passed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub simulation_year: i32,
    pub checks: Vec<&'static str>,
}

/// Artifacts of one year under validation
pub struct YearArtifacts<'a> {
    pub prior: &'a YearSnapshot,
    pub partition: &'a EventPartition,
    pub generation: &'a GenerationReport,
    pub snapshot: &'a YearSnapshot,
}

pub fn validate_year(artifacts: &YearArtifacts<'_>, compliance: &ComplianceCalculator<'_>) -> Result<ValidationReport> {
    let year = artifacts.snapshot.simulation_year();
    let mut checks = Vec::new();
    let fail = |invariant: &str, detail: String| Err(AccrualError::data_quality(year, invariant, detail));

    if artifacts.partition.simulation_year() != year || artifacts.prior.simulation_year() != year - 1 {
        return fail(
            "artifact_years",
            format!(
                "prior {}, events {}, snapshot {}",
                artifacts.prior.simulation_year(),
                artifacts.partition.simulation_year(),
                year
            ),
        );
    }
    checks.push("artifact_years");

    let events = artifacts.partition.events();
    let mut ids = HashSet::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        if !ids.insert(event.event_id()) {
            return fail("unique_event_id", format!("duplicate event_id {}", event.event_id()));
        }
        if event.sequence() as usize != i {
            return fail("event_sequence", format!("event {} has sequence {} at {}", event.event_id(), event.sequence(), i));
        }
    }
    checks.push("unique_event_id");

    let mut hires: HashMap<&EmployeeId, usize> = HashMap::new();
    for event in artifacts.partition.of_type(EventType::Hire) {
        *hires.entry(event.employee_id()).or_default() += 1;
    }
    if let Some((employee_id, count)) = hires.iter().find(|(_, count)| **count > 1) {
        return fail("single_hire", format!("{} hired {} times", employee_id, count));
    }
    for event in events {
        match artifacts.prior.get(event.employee_id()) {
            Some(state) if !state.is_active() => {
                return fail(
                    "event_for_terminated_employee",
                    format!("{} event for {} terminated before {}", event.event_type(), event.employee_id(), year),
                );
            }
            None if !hires.contains_key(event.employee_id()) => {
                return fail(
                    "event_for_unknown_employee",
                    format!("{} event for {}", event.event_type(), event.employee_id()),
                );
            }
            _ => {}
        }
    }
    checks.push("event_references");

    for state in artifacts.prior.states() {
        if artifacts.snapshot.get(&state.employee_id).is_none() {
            return fail("employee_continuity", format!("{} missing from {}", state.employee_id, year));
        }
    }
    let hired = artifacts.partition.count(EventType::Hire);
    let terminated = artifacts.partition.count(EventType::Termination);
    let expected = (artifacts.prior.active_count() + hired).checked_sub(terminated);
    if expected != Some(artifacts.snapshot.active_count()) {
        return fail(
            "headcount_reconciliation",
            format!(
                "{} active at start + {} hires - {} terminations != {} active at end",
                artifacts.prior.active_count(),
                hired,
                terminated,
                artifacts.snapshot.active_count()
            ),
        );
    }
    checks.push("headcount_reconciliation");

    let merit_cents: i64 = artifacts
        .partition
        .of_type(EventType::Merit)
        .map(|e| match e.payload() {
            EventPayload::Merit { increase, .. } => to_cents(*increase),
            _ => 0,
        })
        .sum();
    if merit_cents > to_cents(artifacts.generation.merit_pool) {
        return fail(
            "merit_budget",
            format!("merit increases {:.2} exceed pool {:.2}", merit_cents as f64 / 100.0, artifacts.generation.merit_pool),
        );
    }
    checks.push("merit_budget");

    for state in artifacts.snapshot.states() {
        if !(0.0..=1.0).contains(&state.deferral_rate) {
            return fail("deferral_rate_range", format!("{} defers {}", state.employee_id, state.deferral_rate));
        }
        let inactive_all_year = !state.is_active() && !state.terminated_this_year;
        if inactive_all_year && (state.prorated_compensation != 0.0 || state.employer_contributions() != 0.0) {
            return fail(
                "terminated_accrual",
                format!("{} accrued after termination", state.employee_id),
            );
        }
    }
    checks.push("deferral_rate_range");
    checks.push("terminated_accrual");

    let finalized = artifacts.snapshot.clone().finalize();
    let report = compliance.evaluate(&finalized)?;
    if let Some(bad) = report
        .records
        .iter()
        .find(|r| !(0.0..=1.0).contains(&r.vested_percentage))
    {
        return fail("vesting_percentage_range", format!("{} vested {}", bad.employee_id, bad.vested_percentage));
    }
    checks.push("vesting_percentage_range");

    info!(year, checks = checks.len(), "✅ Validation passed");
    Ok(ValidationReport {
        simulation_year: year,
        checks,
    })
}
