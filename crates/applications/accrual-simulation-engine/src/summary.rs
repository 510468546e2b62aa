//! Per-year workforce and plan summary

use accrual_core::{
    round_cents, DeferralChangeReason, EnrollmentSource, EventPartition, EventPayload, EventType, TerminationReason,
    YearSnapshot,
};
use serde::{Deserialize, Serialize};

use crate::compliance::ComplianceReport;
use crate::generator::{BudgetShortfall, GenerationReport};

/// Headline figures for one simulated year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSummary {
    pub simulation_year: i32,

    pub opening_headcount: usize,
    pub closing_headcount: usize,
    pub hires: usize,
    pub terminations: usize,
    pub voluntary_terminations: usize,
    pub involuntary_terminations: usize,
    /// Terminations of employees hired in the previous year
    pub new_hire_terminations: usize,
    pub promotions: usize,

    pub merit_increases: usize,
    pub merit_pool: f64,
    pub merit_allocated: f64,

    pub voluntary_enrollments: usize,
    pub auto_enrollments: usize,
    pub opt_outs: usize,
    pub escalations: usize,
    /// Enrolled share of active employees at year end
    pub participation_rate: f64,

    pub total_compensation: f64,
    pub total_deferrals: f64,
    pub total_employer_match: f64,
    pub total_employer_core: f64,
    pub total_forfeitures: f64,
    pub compensation_capped_count: usize,
    pub annual_additions_exceeded_count: usize,

    pub shortfalls: Vec<BudgetShortfall>,
}

impl YearSummary {
    pub fn build(
        prior: &YearSnapshot,
        partition: &EventPartition,
        generation: &GenerationReport,
        snapshot: &YearSnapshot,
        compliance: &ComplianceReport,
    ) -> Self {
        let mut summary = Self {
            simulation_year: snapshot.simulation_year(),
            opening_headcount: prior.active_count(),
            closing_headcount: snapshot.active_count(),
            hires: partition.count(EventType::Hire),
            terminations: partition.count(EventType::Termination),
            voluntary_terminations: 0,
            involuntary_terminations: 0,
            new_hire_terminations: 0,
            promotions: partition.count(EventType::Promotion),
            merit_increases: partition.count(EventType::Merit),
            merit_pool: generation.merit_pool,
            merit_allocated: generation.merit_allocated,
            voluntary_enrollments: 0,
            auto_enrollments: 0,
            opt_outs: 0,
            escalations: 0,
            participation_rate: 0.0,
            total_compensation: 0.0,
            total_deferrals: 0.0,
            total_employer_match: 0.0,
            total_employer_core: 0.0,
            total_forfeitures: compliance.total_forfeitures,
            compensation_capped_count: compliance.capped_count(),
            annual_additions_exceeded_count: compliance.exceeded_count(),
            shortfalls: generation.shortfalls.clone(),
        };

        for event in partition.events() {
            match event.payload() {
                EventPayload::Termination { reason, .. } => {
                    match reason {
                        TerminationReason::Voluntary => summary.voluntary_terminations += 1,
                        TerminationReason::Involuntary => summary.involuntary_terminations += 1,
                    }
                    if prior.get(event.employee_id()).is_some_and(|s| s.hired_this_year) {
                        summary.new_hire_terminations += 1;
                    }
                }
                EventPayload::Enrollment { source, .. } => match source {
                    EnrollmentSource::Auto => summary.auto_enrollments += 1,
                    _ => summary.voluntary_enrollments += 1,
                },
                EventPayload::DeferralChange { reason, .. } => match reason {
                    DeferralChangeReason::OptOut => summary.opt_outs += 1,
                    DeferralChangeReason::Escalation => summary.escalations += 1,
                    DeferralChangeReason::Election => {}
                },
                _ => {}
            }
        }

        let mut enrolled = 0usize;
        for state in snapshot.states() {
            if state.is_active() && state.is_enrolled() && state.deferral_rate > 0.0 {
                enrolled += 1;
            }
            summary.total_compensation += state.prorated_compensation;
            summary.total_deferrals += state.employee_deferrals;
            summary.total_employer_match += state.employer_match;
            summary.total_employer_core += state.employer_core;
        }
        if summary.closing_headcount > 0 {
            summary.participation_rate = enrolled as f64 / summary.closing_headcount as f64;
        }
        summary.total_compensation = round_cents(summary.total_compensation);
        summary.total_deferrals = round_cents(summary.total_deferrals);
        summary.total_employer_match = round_cents(summary.total_employer_match);
        summary.total_employer_core = round_cents(summary.total_employer_core);
        summary
    }
}
