#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use crate::models::{PlanSource, PlanStatus, QuitPlan, QuitProgress};
    use crate::stats::plan_statistics;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan(start: NaiveDate, target: Option<NaiveDate>) -> QuitPlan {
        QuitPlan {
            id: 1,
            user_id: 1,
            doctor_id: None,
            cigarettes_per_day: 20,
            cigarettes_per_pack: 20,
            price_per_pack: 30000,
            years_smoked: 5,
            daily_cost: 30000,
            start_date: start,
            target_date: target,
            status: PlanStatus::Active,
            approved_by_doctor: false,
            doctor_notes: String::new(),
            source: PlanSource::SelfInitiated,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn record(day: NaiveDate, smoked: bool, streak: i64, money: i64) -> QuitProgress {
        QuitProgress {
            id: 0,
            plan_id: 1,
            user_id: 1,
            date: day,
            smoked_today: smoked,
            cigarettes_smoked: if smoked { 5 } else { 0 },
            money_saved: money,
            days_smoke_free: streak,
            mood: String::new(),
            note: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_daily_cost_from_baseline() {
        assert_eq!(QuitPlan::derive_daily_cost(20, 30000, 20), 30000);
        assert_eq!(QuitPlan::derive_daily_cost(10, 30000, 20), 15000);
        assert_eq!(QuitPlan::derive_daily_cost(20, 30000, 0), 0);
    }

    #[test]
    fn test_zero_records_yield_zero_statistics() {
        let start = date(2025, 6, 1);
        let stats = plan_statistics(&plan(start, None), &[], start);

        assert_eq!(stats.total_days, 1);
        assert_eq!(stats.days_smoke_free, 0);
        assert_eq!(stats.total_money_saved, 0);
        assert_eq!(stats.smoke_free_day_count, 0);
        assert_eq!(stats.completion_percentage, 0);
    }

    #[test]
    fn test_statistics_aggregate_records() {
        let start = date(2025, 6, 1);
        let records = vec![
            record(date(2025, 6, 1), false, 1, 30000),
            record(date(2025, 6, 2), false, 2, 30000),
            record(date(2025, 6, 3), true, 0, 0),
            record(date(2025, 6, 4), false, 1, 30000),
        ];

        let stats = plan_statistics(&plan(start, None), &records, date(2025, 6, 4));

        assert_eq!(stats.total_days, 4);
        assert_eq!(stats.days_smoke_free, 2);
        assert_eq!(stats.total_money_saved, 90000);
        assert_eq!(stats.smoke_free_day_count, 3);
    }

    #[test]
    fn test_completion_percentage_with_target() {
        let start = date(2025, 6, 1);
        let target = Some(date(2025, 6, 10));

        let halfway = plan_statistics(&plan(start, target), &[], date(2025, 6, 5));
        assert_eq!(halfway.completion_percentage, 50);

        // Elapsed days past the target are capped at 100.
        let overdue = plan_statistics(&plan(start, target), &[], date(2025, 7, 1));
        assert_eq!(overdue.completion_percentage, 100);
    }
}
