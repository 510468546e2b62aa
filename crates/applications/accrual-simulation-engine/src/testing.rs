//! Fixture builders shared by unit and integration tests
//!
//! Panics on malformed fixtures; not for production paths.

use accrual_core::{CensusRecord, EmployeeId, HazardTable, Level, PerformanceTier, SimulationConfig, TierRates, YearSnapshot};
use chrono::NaiveDate;

/// The bundled baseline scenario configuration
pub const BASELINE_CONFIG: &str = include_str!("../../../../config/baseline.toml");

/// Parsed baseline configuration (2025-2027, seed 42)
pub fn config() -> SimulationConfig {
    SimulationConfig::from_toml_str(BASELINE_CONFIG).expect("bundled baseline config parses")
}

/// Make every multiplier in `table` 1.0 so each employee's hazard is `base_rate`
pub fn flatten_hazard(table: &mut HazardTable, base_rate: f64) {
    table.base_rate = base_rate;
    for band in table.age_bands.iter_mut().chain(table.tenure_bands.iter_mut()) {
        band.multiplier = 1.0;
    }
    for level in table.levels.iter_mut() {
        level.multiplier = 1.0;
    }
    table.performance = TierRates {
        below: 1.0,
        meets: 1.0,
        exceeds: 1.0,
        outstanding: 1.0,
    };
}

/// Census record with the given age and tenure at the end of `first_year - 1`
pub fn census_record(id: &str, age: i32, tenure: i32, level: Level, salary: f64, first_year: i32) -> CensusRecord {
    let baseline_year = first_year - 1;
    CensusRecord {
        employee_id: EmployeeId::new(id),
        birth_date: NaiveDate::from_ymd_opt(baseline_year - age, 6, 30).expect("valid birth date"),
        hire_date: NaiveDate::from_ymd_opt(baseline_year - tenure, 3, 1).expect("valid hire date"),
        level,
        annual_salary: salary,
        performance_tier: PerformanceTier::Meets,
        deferral_rate: None,
        vesting_service_years: None,
        cumulative_employer_contributions: 0.0,
    }
}

/// Deterministic synthetic workforce of `size` employees
pub fn workforce(size: usize, first_year: i32) -> Vec<CensusRecord> {
    const TIERS: [PerformanceTier; 4] = [
        PerformanceTier::Meets,
        PerformanceTier::Exceeds,
        PerformanceTier::Meets,
        PerformanceTier::Outstanding,
    ];
    (0..size)
        .map(|i| {
            let age = 24 + ((i * 7) % 36) as i32;
            let tenure = (((i * 3) % 16) as i32).min(age - 20);
            let level = (1 + i % 3) as Level;
            let salary = match level {
                1 => 50_000.0,
                2 => 72_000.0,
                _ => 105_000.0,
            } + ((i * 137) % 5_000) as f64;
            let mut record = census_record(&format!("E{:04}", i + 1), age, tenure, level, salary, first_year);
            record.performance_tier = if i % 11 == 0 {
                PerformanceTier::Below
            } else {
                TIERS[i % 4]
            };
            if i % 3 == 0 {
                record.deferral_rate = Some(0.04 + (i % 4) as f64 * 0.01);
            }
            record
        })
        .collect()
}

/// Finalized baseline snapshot for `first_year - 1`
pub fn baseline(first_year: i32, records: Vec<CensusRecord>) -> YearSnapshot {
    YearSnapshot::from_census(first_year, records).expect("fixture census is valid")
}
