//! Per-year pipeline stages
//!
//! ```text
//! FOUNDATION → EVENT_GENERATION → STATE_ACCUMULATION → VALIDATION → REPORTING
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Foundation,
    EventGeneration,
    StateAccumulation,
    Validation,
    Reporting,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 5] = [
        Stage::Foundation,
        Stage::EventGeneration,
        Stage::StateAccumulation,
        Stage::Validation,
        Stage::Reporting,
    ];

    /// Name used in checkpoints, logs, and the dependency registry
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Foundation => "foundation",
            Stage::EventGeneration => "event_generation",
            Stage::StateAccumulation => "state_accumulation",
            Stage::Validation => "validation",
            Stage::Reporting => "reporting",
        }
    }

    /// Stage that runs after this one within the same year
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Foundation => Some(Stage::EventGeneration),
            Stage::EventGeneration => Some(Stage::StateAccumulation),
            Stage::StateAccumulation => Some(Stage::Validation),
            Stage::Validation => Some(Stage::Reporting),
            Stage::Reporting => None,
        }
    }

    /// Stage that must be checkpointed before this one runs
    pub fn previous(&self) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|s| s.next() == Some(*self))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| OrchestratorError::usage(format!("unknown stage `{}`", s)))
    }
}

/// A (year, stage) position in the run, used for `--until`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StopPoint {
    pub year: i32,
    pub stage: Stage,
}

impl fmt::Display for StopPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.year, self.stage)
    }
}

impl FromStr for StopPoint {
    type Err = OrchestratorError;

    /// Parse `2027:state_accumulation`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, stage) = s
            .split_once(':')
            .ok_or_else(|| OrchestratorError::usage(format!("expected <year>:<stage>, got `{}`", s)))?;
        let year = year
            .parse()
            .map_err(|_| OrchestratorError::usage(format!("invalid year `{}`", year)))?;
        Ok(Self {
            year,
            stage: stage.parse()?,
        })
    }
}

/// Parse a `<start>-<end>` year range, or a single year
pub fn parse_year_range(s: &str) -> Result<std::ops::RangeInclusive<i32>, OrchestratorError> {
    let parse = |part: &str| {
        part.trim()
            .parse::<i32>()
            .map_err(|_| OrchestratorError::usage(format!("invalid year `{}` in range `{}`", part, s)))
    };
    let (start, end) = match s.split_once('-') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let year = parse(s)?;
            (year, year)
        }
    };
    if start > end {
        return Err(OrchestratorError::usage(format!("range `{}` ends before it starts", s)));
    }
    Ok(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::Foundation.next(), Some(Stage::EventGeneration));
        assert_eq!(Stage::Reporting.next(), None);
        assert_eq!(Stage::Validation.previous(), Some(Stage::StateAccumulation));
        assert_eq!(Stage::Foundation.previous(), None);
        assert!(Stage::EventGeneration < Stage::Reporting);
    }

    #[test]
    fn test_parse_stop_point() {
        let stop: StopPoint = "2027:state_accumulation".parse().unwrap();
        assert_eq!(stop.year, 2027);
        assert_eq!(stop.stage, Stage::StateAccumulation);
        assert_eq!(stop.to_string(), "2027:state_accumulation");
        assert!("2027".parse::<StopPoint>().is_err());
        assert!("2027:publish".parse::<StopPoint>().is_err());
    }

    #[test]
    fn test_parse_year_range() {
        assert_eq!(parse_year_range("2025-2027").unwrap(), 2025..=2027);
        assert_eq!(parse_year_range("2026").unwrap(), 2026..=2026);
        assert!(parse_year_range("2027-2025").is_err());
        assert!(parse_year_range("twenty").is_err());
    }
}
