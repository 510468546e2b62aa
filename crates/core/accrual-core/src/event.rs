//! Unified simulation event model
//!
//! Every simulated occurrence is a [`SimulationEvent`]: an immutable record
//! with a type-specific [`EventPayload`]. Events are created by the event
//! generator, validated at construction, and ordered within a year by
//! [`EventType::resolution_rank`].

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{AccrualError, Result};
use crate::types::{
    DeferralChangeReason, EmployeeId, EnrollmentSource, Level, PerformanceTier, PlanDesignId,
    ScenarioId, TerminationReason,
};

/// Event schema version written into every partition
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Kind of simulated occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Termination,
    Hire,
    Promotion,
    Merit,
    Enrollment,
    DeferralChange,
    EmployerContribution,
}

impl EventType {
    /// Position in the mandatory within-year resolution order
    ///
    /// termination → hire → promotion → merit → enrollment/deferral →
    /// employer contribution. Later categories read the population produced
    /// by earlier ones.
    pub fn resolution_rank(&self) -> u8 {
        match self {
            EventType::Termination => 0,
            EventType::Hire => 1,
            EventType::Promotion => 2,
            EventType::Merit => 3,
            EventType::Enrollment | EventType::DeferralChange => 4,
            EventType::EmployerContribution => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Termination => "termination",
            EventType::Hire => "hire",
            EventType::Promotion => "promotion",
            EventType::Merit => "merit",
            EventType::Enrollment => "enrollment",
            EventType::DeferralChange => "deferral_change",
            EventType::EmployerContribution => "employer_contribution",
        }
    }

    /// Whether this event sets the employee's deferral rate
    pub fn sets_deferral_rate(&self) -> bool {
        matches!(self, EventType::Enrollment | EventType::DeferralChange)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific event data, tagged by `event_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    Termination {
        reason: TerminationReason,
        final_salary: f64,
    },
    Hire {
        level: Level,
        annual_salary: f64,
        birth_date: NaiveDate,
        performance_tier: PerformanceTier,
    },
    Promotion {
        from_level: Level,
        to_level: Level,
        previous_salary: f64,
        new_salary: f64,
    },
    Merit {
        performance_tier: PerformanceTier,
        previous_salary: f64,
        increase: f64,
        new_salary: f64,
    },
    Enrollment {
        deferral_rate: f64,
        source: EnrollmentSource,
    },
    DeferralChange {
        previous_rate: f64,
        new_rate: f64,
        reason: DeferralChangeReason,
    },
    EmployerContribution {
        eligible_compensation: f64,
        capped_compensation: f64,
        compensation_capped: bool,
        employee_deferral: f64,
        match_amount: f64,
        core_amount: f64,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Termination { .. } => EventType::Termination,
            EventPayload::Hire { .. } => EventType::Hire,
            EventPayload::Promotion { .. } => EventType::Promotion,
            EventPayload::Merit { .. } => EventType::Merit,
            EventPayload::Enrollment { .. } => EventType::Enrollment,
            EventPayload::DeferralChange { .. } => EventType::DeferralChange,
            EventPayload::EmployerContribution { .. } => EventType::EmployerContribution,
        }
    }

    /// Check field-level invariants for this payload
    fn validate(&self, year: i32, effective_date: NaiveDate) -> Result<()> {
        let fail = |invariant: &str, detail: String| Err(AccrualError::data_quality(year, invariant, detail));
        match self {
            EventPayload::Termination { final_salary, .. } => {
                if *final_salary < 0.0 {
                    return fail("termination_salary", format!("negative final salary {}", final_salary));
                }
            }
            EventPayload::Hire {
                annual_salary,
                birth_date,
                ..
            } => {
                if *annual_salary <= 0.0 {
                    return fail("hire_salary", format!("non-positive salary {}", annual_salary));
                }
                if *birth_date >= effective_date {
                    return fail("hire_birth_date", format!("born {} after hire {}", birth_date, effective_date));
                }
            }
            EventPayload::Promotion {
                from_level,
                to_level,
                new_salary,
                ..
            } => {
                if to_level <= from_level {
                    return fail("promotion_level", format!("level {} -> {} is not a promotion", from_level, to_level));
                }
                if *new_salary <= 0.0 {
                    return fail("promotion_salary", format!("non-positive salary {}", new_salary));
                }
            }
            EventPayload::Merit {
                previous_salary,
                increase,
                new_salary,
                ..
            } => {
                if *increase < 0.0 {
                    return fail("merit_increase", format!("negative increase {}", increase));
                }
                if (previous_salary + increase - new_salary).abs() > 0.005 {
                    return fail(
                        "merit_arithmetic",
                        format!("{} + {} != {}", previous_salary, increase, new_salary),
                    );
                }
            }
            EventPayload::Enrollment { deferral_rate, .. } => {
                if !(0.0..=1.0).contains(deferral_rate) {
                    return fail("deferral_rate_range", format!("rate {} outside [0,1]", deferral_rate));
                }
            }
            EventPayload::DeferralChange {
                previous_rate,
                new_rate,
                ..
            } => {
                if !(0.0..=1.0).contains(previous_rate) || !(0.0..=1.0).contains(new_rate) {
                    return fail(
                        "deferral_rate_range",
                        format!("rates {} -> {} outside [0,1]", previous_rate, new_rate),
                    );
                }
            }
            EventPayload::EmployerContribution {
                eligible_compensation,
                capped_compensation,
                employee_deferral,
                match_amount,
                core_amount,
                ..
            } => {
                if [*eligible_compensation, *capped_compensation, *employee_deferral, *match_amount, *core_amount]
                    .iter()
                    .any(|v| *v < 0.0)
                {
                    return fail("contribution_amounts", "negative contribution amount".to_string());
                }
                if *capped_compensation > *eligible_compensation + 0.005 {
                    return fail(
                        "contribution_cap",
                        format!("capped {} exceeds eligible {}", capped_compensation, eligible_compensation),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Identity shared by every event generated for one scenario-year
#[derive(Debug, Clone)]
pub struct EventScope {
    pub scenario_id: ScenarioId,
    pub plan_design_id: PlanDesignId,
    pub simulation_year: i32,
}

impl EventScope {
    pub fn new(scenario_id: ScenarioId, plan_design_id: PlanDesignId, simulation_year: i32) -> Self {
        Self {
            scenario_id,
            plan_design_id,
            simulation_year,
        }
    }
}

/// An immutable simulated occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    event_id: Uuid,
    sequence: u32,
    employee_id: EmployeeId,
    simulation_year: i32,
    effective_date: NaiveDate,
    scenario_id: ScenarioId,
    plan_design_id: PlanDesignId,
    #[serde(flatten)]
    payload: EventPayload,
}

impl SimulationEvent {
    /// Build and validate an event
    ///
    /// `ordinal` distinguishes repeated events of one type for the same
    /// employee within a year; it feeds the deterministic `event_id`.
    pub fn new(
        scope: &EventScope,
        employee_id: EmployeeId,
        effective_date: NaiveDate,
        payload: EventPayload,
        ordinal: u32,
    ) -> Result<Self> {
        let year = scope.simulation_year;
        if effective_date.year() != year {
            return Err(AccrualError::data_quality(
                year,
                "effective_date_in_year",
                format!("{} event for {} dated {}", payload.event_type(), employee_id, effective_date),
            ));
        }
        payload.validate(year, effective_date)?;

        let name = format!(
            "{}:{}:{}:{}:{}",
            scope.scenario_id,
            year,
            employee_id,
            payload.event_type(),
            ordinal
        );
        let event_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());

        Ok(Self {
            event_id,
            sequence: 0,
            employee_id,
            simulation_year: year,
            effective_date,
            scenario_id: scope.scenario_id.clone(),
            plan_design_id: scope.plan_design_id.clone(),
            payload,
        })
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Position of this event in its year's partition
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn employee_id(&self) -> &EmployeeId {
        &self.employee_id
    }

    pub fn simulation_year(&self) -> i32 {
        self.simulation_year
    }

    pub fn effective_date(&self) -> NaiveDate {
        self.effective_date
    }

    pub fn scenario_id(&self) -> &ScenarioId {
        &self.scenario_id
    }

    pub fn plan_design_id(&self) -> &PlanDesignId {
        &self.plan_design_id
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// The finalized, ordered event log for one simulation year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPartition {
    schema_version: u32,
    simulation_year: i32,
    events: Vec<SimulationEvent>,
}

impl EventPartition {
    /// Order events by resolution rank and assign sequences
    ///
    /// Rejects events from other years and duplicate `event_id`s.
    pub fn assemble(simulation_year: i32, mut events: Vec<SimulationEvent>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(events.len());
        for event in &events {
            if event.simulation_year != simulation_year {
                return Err(AccrualError::data_quality(
                    simulation_year,
                    "partition_year",
                    format!("event {} belongs to {}", event.event_id, event.simulation_year),
                ));
            }
            if !seen.insert(event.event_id) {
                return Err(AccrualError::data_quality(
                    simulation_year,
                    "unique_event_id",
                    format!("duplicate event_id {}", event.event_id),
                ));
            }
        }

        events.sort_by(|a, b| {
            let ta = a.event_type();
            let tb = b.event_type();
            ta.resolution_rank()
                .cmp(&tb.resolution_rank())
                .then_with(|| a.employee_id.cmp(&b.employee_id))
                .then_with(|| a.effective_date.cmp(&b.effective_date))
                .then_with(|| ta.cmp(&tb))
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        for (i, event) in events.iter_mut().enumerate() {
            event.sequence = i as u32;
        }

        Ok(Self {
            schema_version: EVENT_SCHEMA_VERSION,
            simulation_year,
            events,
        })
    }

    pub fn simulation_year(&self) -> i32 {
        self.simulation_year
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn events(&self) -> &[SimulationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of one type, in log order
    pub fn of_type(&self, event_type: EventType) -> impl Iterator<Item = &SimulationEvent> {
        self.events.iter().filter(move |e| e.event_type() == event_type)
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.of_type(event_type).count()
    }

    /// Events for one employee, in log order
    pub fn for_employee<'a>(&'a self, employee_id: &'a EmployeeId) -> impl Iterator<Item = &'a SimulationEvent> {
        self.events.iter().filter(move |e| &e.employee_id == employee_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> EventScope {
        EventScope::new(ScenarioId::new("baseline"), PlanDesignId::new("standard"), 2026)
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn termination(id: &str) -> SimulationEvent {
        SimulationEvent::new(
            &scope(),
            EmployeeId::new(id),
            date(3, 1),
            EventPayload::Termination {
                reason: TerminationReason::Voluntary,
                final_salary: 50_000.0,
            },
            0,
        )
        .unwrap()
    }

    fn enrollment(id: &str) -> SimulationEvent {
        SimulationEvent::new(
            &scope(),
            EmployeeId::new(id),
            date(2, 1),
            EventPayload::Enrollment {
                deferral_rate: 0.06,
                source: EnrollmentSource::Auto,
            },
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_event_id_is_deterministic() {
        let a = termination("E001");
        let b = termination("E001");
        let c = termination("E002");
        assert_eq!(a.event_id(), b.event_id());
        assert_ne!(a.event_id(), c.event_id());
    }

    #[test]
    fn test_rejects_out_of_year_date() {
        let err = SimulationEvent::new(
            &scope(),
            EmployeeId::new("E001"),
            NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            EventPayload::Enrollment {
                deferral_rate: 0.06,
                source: EnrollmentSource::Voluntary,
            },
            0,
        )
        .unwrap_err();
        assert!(matches!(err, AccrualError::DataQuality { .. }));
    }

    #[test]
    fn test_rejects_invalid_payloads() {
        let bad_rate = SimulationEvent::new(
            &scope(),
            EmployeeId::new("E001"),
            date(1, 1),
            EventPayload::Enrollment {
                deferral_rate: 1.5,
                source: EnrollmentSource::Voluntary,
            },
            0,
        );
        assert!(bad_rate.is_err());

        let demotion = SimulationEvent::new(
            &scope(),
            EmployeeId::new("E001"),
            date(1, 1),
            EventPayload::Promotion {
                from_level: 3,
                to_level: 2,
                previous_salary: 80_000.0,
                new_salary: 70_000.0,
            },
            0,
        );
        assert!(demotion.is_err());

        let bad_merit = SimulationEvent::new(
            &scope(),
            EmployeeId::new("E001"),
            date(7, 1),
            EventPayload::Merit {
                performance_tier: PerformanceTier::Meets,
                previous_salary: 50_000.0,
                increase: 1_000.0,
                new_salary: 52_000.0,
            },
            0,
        );
        assert!(bad_merit.is_err());
    }

    #[test]
    fn test_partition_orders_by_resolution_rank() {
        let partition =
            EventPartition::assemble(2026, vec![enrollment("E001"), termination("E003"), termination("E002")]).unwrap();
        let types: Vec<EventType> = partition.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec![EventType::Termination, EventType::Termination, EventType::Enrollment]);
        assert_eq!(partition.events()[0].employee_id().as_str(), "E002");
        let sequences: Vec<u32> = partition.events().iter().map(|e| e.sequence()).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_partition_rejects_duplicate_ids() {
        let err = EventPartition::assemble(2026, vec![termination("E001"), termination("E001")]).unwrap_err();
        match err {
            AccrualError::DataQuality { invariant, .. } => assert_eq!(invariant, "unique_event_id"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_payload_serializes_with_event_type_tag() {
        let event = termination("E001");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "termination");
        assert_eq!(json["reason"], "voluntary");
        let back: SimulationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
