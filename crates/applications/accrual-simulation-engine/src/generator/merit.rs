//! Merit step
//!
//! All arithmetic is in integer cents so the pool check is exact.

use accrual_core::{calendar, from_cents, to_cents, EmployeeId, EventPayload, PerformanceTier, Result};
use tracing::debug;

use super::{ShortfallCategory, YearPass};

struct Recipient {
    employee_id: EmployeeId,
    tier: PerformanceTier,
    salary_cents: i64,
    floor_cents: i64,
    desired_cents: i64,
    granted_cents: i64,
}

/// Split `pool_cents` across recipients; never grants more than the pool
///
/// 1. If every desired increase fits, grant it.
/// 2. Otherwise grant every floor and scale the above-floor portions down
///    proportionally (rounding down).
/// 3. If even the floors do not fit, grant floors in priority order (highest
///    tier first, then lowest employee id) and trim the lowest-priority
///    recipients.
///
/// Returns whether the floor guarantee had to be broken.
fn allocate(recipients: &mut [Recipient], pool_cents: i64) -> bool {
    let desired: i64 = recipients.iter().map(|r| r.desired_cents).sum();
    let floors: i64 = recipients.iter().map(|r| r.floor_cents).sum();

    if desired <= pool_cents {
        for r in recipients.iter_mut() {
            r.granted_cents = r.desired_cents;
        }
        return false;
    }

    if floors <= pool_cents {
        let room = (pool_cents - floors) as i128;
        let above_floor = (desired - floors) as i128;
        for r in recipients.iter_mut() {
            let extra = (r.desired_cents - r.floor_cents) as i128 * room / above_floor;
            r.granted_cents = r.floor_cents + extra as i64;
        }
        return false;
    }

    recipients.sort_by(|a, b| b.tier.cmp(&a.tier).then_with(|| a.employee_id.cmp(&b.employee_id)));
    let mut remaining = pool_cents;
    for r in recipients.iter_mut() {
        if r.floor_cents <= remaining {
            r.granted_cents = r.floor_cents;
            remaining -= r.floor_cents;
        } else {
            r.granted_cents = 0;
        }
    }
    true
}

impl YearPass<'_> {
    /// Allocate the merit pool
    ///
    /// `pool = sum(eligible salaries) * budget_percentage`. Eligible employees
    /// survived the year and were not hired in it. The salary base is the rate
    /// in effect on the merit date, so it includes promotions effective on or
    /// before it. Each asks for `salary * max(tier_rate, floor)`.
    pub(super) fn merit(&mut self) -> Result<()> {
        let config = self.config;
        let merit = &config.merit;
        let year = self.year;
        let effective = calendar::month_start(year, merit.effective_month);

        let mut recipients: Vec<Recipient> = self
            .roster
            .survivors()
            .filter(|w| !w.hired_this_year)
            .map(|w| {
                let salary_cents = to_cents(w.salary_on(effective));
                let rate = merit.tier_rates.get(w.performance_tier).max(merit.floor_rate);
                Recipient {
                    employee_id: w.employee_id.clone(),
                    tier: w.performance_tier,
                    salary_cents,
                    floor_cents: (salary_cents as f64 * merit.floor_rate).floor() as i64,
                    desired_cents: (salary_cents as f64 * rate).floor() as i64,
                    granted_cents: 0,
                }
            })
            .collect();

        let base_cents: i64 = recipients.iter().map(|r| r.salary_cents).sum();
        let pool_cents = (base_cents as f64 * merit.budget_percentage).floor() as i64;
        let floors: i64 = recipients.iter().map(|r| r.floor_cents).sum();
        if allocate(&mut recipients, pool_cents) {
            let granted: i64 = recipients.iter().map(|r| r.granted_cents).sum();
            self.shortfall(
                ShortfallCategory::Merit,
                from_cents(floors),
                from_cents(granted),
                format!("merit pool of {:.2} cannot fund the {:.1}% floor", from_cents(pool_cents), merit.floor_rate * 100.0),
            );
        }
        recipients.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));

        let mut allocated_cents = 0i64;
        for r in &recipients {
            if r.granted_cents <= 0 {
                continue;
            }
            allocated_cents += r.granted_cents;
            let previous_salary = from_cents(r.salary_cents);
            let increase = from_cents(r.granted_cents);
            let new_salary = from_cents(r.salary_cents + r.granted_cents);
            if let Some(worker) = self.roster.get_mut(&r.employee_id) {
                worker.change_salary(effective, new_salary);
            }
            self.emit(
                &r.employee_id,
                effective,
                EventPayload::Merit {
                    performance_tier: r.tier,
                    previous_salary,
                    increase,
                    new_salary,
                },
            )?;
        }

        self.report.merit_pool = from_cents(pool_cents);
        self.report.merit_allocated = from_cents(allocated_cents);
        debug!(
            year,
            pool = self.report.merit_pool,
            allocated = self.report.merit_allocated,
            recipients = recipients.len(),
            "Merit complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::EventGenerator;
    use crate::testing;
    use accrual_core::EventType;

    fn recipient(id: &str, tier: PerformanceTier, salary: i64, floor: f64, rate: f64) -> Recipient {
        Recipient {
            employee_id: EmployeeId::new(id),
            tier,
            salary_cents: salary * 100,
            floor_cents: (salary as f64 * 100.0 * floor).floor() as i64,
            desired_cents: (salary as f64 * 100.0 * rate).floor() as i64,
            granted_cents: 0,
        }
    }

    #[test]
    fn test_full_grant_when_pool_suffices() {
        let mut rs = vec![recipient("A", PerformanceTier::Meets, 100_000, 0.01, 0.03)];
        assert!(!allocate(&mut rs, 1_000_000));
        assert_eq!(rs[0].granted_cents, 300_000);
    }

    #[test]
    fn test_scales_above_floor_portion() {
        let mut rs = vec![
            recipient("A", PerformanceTier::Outstanding, 100_000, 0.01, 0.05),
            recipient("B", PerformanceTier::Meets, 100_000, 0.01, 0.03),
        ];
        // floors 2,000; desired 8,000; pool 5,000 leaves 3,000 for 6,000 above floor
        assert!(!allocate(&mut rs, 500_000));
        assert_eq!(rs[0].granted_cents, 100_000 + 200_000);
        assert_eq!(rs[1].granted_cents, 100_000 + 100_000);
    }

    #[test]
    fn test_trims_lowest_priority_when_floor_does_not_fit() {
        let mut rs = vec![
            recipient("A", PerformanceTier::Meets, 100_000, 0.01, 0.03),
            recipient("B", PerformanceTier::Outstanding, 100_000, 0.01, 0.05),
            recipient("C", PerformanceTier::Meets, 100_000, 0.01, 0.03),
        ];
        assert!(allocate(&mut rs, 250_000));
        let granted: Vec<(&str, i64)> = rs.iter().map(|r| (r.employee_id.as_str(), r.granted_cents)).collect();
        assert_eq!(granted, vec![("B", 100_000), ("A", 100_000), ("C", 0)]);
    }

    #[test]
    fn test_generated_merit_never_exceeds_pool() {
        for budget in [0.001, 0.01, 0.035, 0.2] {
            let mut config = testing::config();
            config.merit.budget_percentage = budget;
            let baseline = testing::baseline(2025, testing::workforce(150, 2025));
            let outcome = EventGenerator::new(&config, 9).generate(&baseline, 2025).unwrap();

            let total: i64 = outcome
                .partition
                .of_type(EventType::Merit)
                .map(|e| match e.payload() {
                    EventPayload::Merit { increase, .. } => to_cents(*increase),
                    _ => 0,
                })
                .sum();
            assert!(total <= to_cents(outcome.report.merit_pool), "budget {budget}");
            assert_eq!(total, to_cents(outcome.report.merit_allocated));
        }
    }
}
