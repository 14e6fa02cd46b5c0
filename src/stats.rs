use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{QuitPlan, QuitProgress};

/// Score a member's progress for ranking.
///
/// `money_saved` is in the smallest currency unit, the same unit the
/// progress records store. Negative inputs are clamped to zero so callers
/// never have to pre-sanitize.
pub fn compute_points(days_smoke_free: i64, money_saved: i64, smoke_free_days: i64) -> i64 {
    let days = days_smoke_free.max(0);
    let money = money_saved.max(0);
    let streak = smoke_free_days.max(0);

    days * 10 + money / 1000 + (streak / 7) * 5
}

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct PlanStatistics {
    pub total_days: i64,
    pub days_smoke_free: i64,
    pub total_money_saved: i64,
    pub smoke_free_day_count: i64,
    pub completion_percentage: i64,
}

/// Derive per-plan statistics from the plan's progress records.
///
/// The stored `days_smoke_free` counter is the source of truth for the
/// streak; it is recomputed on every write and never accepted from a
/// client, so taking the max here is safe. A plan with no records yields
/// all-zero statistics.
pub fn plan_statistics(plan: &QuitPlan, records: &[QuitProgress], today: NaiveDate) -> PlanStatistics {
    let total_days = (today - plan.start_date).num_days().max(0) + 1;

    let days_smoke_free = records
        .iter()
        .map(|r| r.days_smoke_free)
        .max()
        .unwrap_or(0);

    let total_money_saved = records.iter().map(|r| r.money_saved).sum();

    let smoke_free_day_count = records.iter().filter(|r| !r.smoked_today).count() as i64;

    let completion_percentage = match plan.target_date {
        Some(target) => {
            let planned = (target - plan.start_date).num_days() + 1;
            if planned <= 0 {
                100
            } else {
                (total_days * 100 / planned).min(100)
            }
        }
        None => 0,
    };

    PlanStatistics {
        total_days,
        days_smoke_free,
        total_money_saved,
        smoke_free_day_count,
        completion_percentage,
    }
}
