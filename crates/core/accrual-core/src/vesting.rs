//! Vesting schedules
//!
//! A schedule maps completed years of vesting service to the fraction of
//! employer contributions the employee keeps on termination. Schedules are
//! validated on construction: percentages lie in [0,1], never decrease, and
//! end at 1.0.

use serde::{Deserialize, Serialize};

use crate::error::{AccrualError, Result};

/// One step of a vesting schedule: from `years` of service onward, `percentage` is vested
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VestingStep {
    pub years: u32,
    pub percentage: f64,
}

/// Schedule selection as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VestingScheduleSpec {
    /// One of the built-in schedules (`immediate`, `cliff_3`, `graded_6`, ...)
    Named(String),
    /// Explicit steps
    Custom(Vec<VestingStep>),
}

/// A validated vesting schedule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VestingSchedule {
    name: String,
    steps: Vec<VestingStep>,
}

impl VestingSchedule {
    /// Names accepted by [`VestingSchedule::named`]
    pub const BUILT_IN: [&'static str; 7] = [
        "immediate",
        "cliff_2",
        "cliff_3",
        "graded_3",
        "graded_4",
        "graded_5",
        "graded_6",
    ];

    /// Build and validate a schedule from explicit steps
    pub fn new(name: impl Into<String>, mut steps: Vec<VestingStep>) -> Result<Self> {
        let name = name.into();
        let key = "vesting.schedule";
        if steps.is_empty() {
            return Err(AccrualError::config(key, format!("schedule '{}' has no steps", name)));
        }
        steps.sort_by_key(|s| s.years);

        let mut previous: Option<VestingStep> = None;
        for step in &steps {
            if !(0.0..=1.0).contains(&step.percentage) {
                return Err(AccrualError::config(
                    key,
                    format!("'{}' vests {} at {} years, outside [0,1]", name, step.percentage, step.years),
                ));
            }
            if let Some(prev) = previous {
                if prev.years == step.years {
                    return Err(AccrualError::config(
                        key,
                        format!("'{}' lists {} years of service twice", name, step.years),
                    ));
                }
                if step.percentage < prev.percentage {
                    return Err(AccrualError::config(
                        key,
                        format!(
                            "'{}' decreases from {} to {} at {} years",
                            name, prev.percentage, step.percentage, step.years
                        ),
                    ));
                }
            }
            previous = Some(*step);
        }
        if previous.map(|s| s.percentage) != Some(1.0) {
            return Err(AccrualError::config(
                key,
                format!("'{}' must end fully vested (1.0)", name),
            ));
        }

        Ok(Self { name, steps })
    }

    /// One of the built-in schedules
    pub fn named(name: &str) -> Result<Self> {
        let step = |years: u32, percentage: f64| VestingStep { years, percentage };
        let steps = match name {
            "immediate" => vec![step(0, 1.0)],
            "cliff_2" => vec![step(0, 0.0), step(2, 1.0)],
            "cliff_3" => vec![step(0, 0.0), step(3, 1.0)],
            "graded_3" => vec![step(0, 0.0), step(1, 1.0 / 3.0), step(2, 2.0 / 3.0), step(3, 1.0)],
            "graded_4" => vec![step(0, 0.0), step(1, 0.25), step(2, 0.5), step(3, 0.75), step(4, 1.0)],
            "graded_5" => vec![
                step(0, 0.0),
                step(1, 0.2),
                step(2, 0.4),
                step(3, 0.6),
                step(4, 0.8),
                step(5, 1.0),
            ],
            "graded_6" => vec![
                step(0, 0.0),
                step(2, 0.2),
                step(3, 0.4),
                step(4, 0.6),
                step(5, 0.8),
                step(6, 1.0),
            ],
            other => {
                return Err(AccrualError::config(
                    "vesting.schedule",
                    format!("unknown schedule '{}' (expected one of {:?})", other, Self::BUILT_IN),
                ));
            }
        };
        Self::new(name, steps)
    }

    /// Resolve a configured schedule
    pub fn from_spec(spec: &VestingScheduleSpec) -> Result<Self> {
        match spec {
            VestingScheduleSpec::Named(name) => Self::named(name),
            VestingScheduleSpec::Custom(steps) => Self::new("custom", steps.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[VestingStep] {
        &self.steps
    }

    /// Vested fraction after `years` of credited service
    pub fn percentage(&self, years: u32) -> f64 {
        self.steps
            .iter()
            .take_while(|s| s.years <= years)
            .last()
            .map_or(0.0, |s| s.percentage)
    }
}
