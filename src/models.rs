use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Completed,
    Paused,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Paused => "paused",
            PlanStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, anyhow::Error> {
        match s {
            "active" => Ok(PlanStatus::Active),
            "completed" => Ok(PlanStatus::Completed),
            "paused" => Ok(PlanStatus::Paused),
            "cancelled" => Ok(PlanStatus::Cancelled),
            _ => Err(anyhow::Error::msg(format!("Unknown plan status: {}", s))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Cancelled)
    }

    /// Legal transitions out of each status. Terminal statuses allow none.
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        match self {
            PlanStatus::Active => matches!(
                next,
                PlanStatus::Paused | PlanStatus::Completed | PlanStatus::Cancelled
            ),
            _ => matches!(next, PlanStatus::Active | PlanStatus::Cancelled),
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanSource {
    #[serde(rename = "self")]
    SelfInitiated,
    #[serde(rename = "doctor")]
    DoctorRecommended,
}

impl PlanSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanSource::SelfInitiated => "self",
            PlanSource::DoctorRecommended => "doctor",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, anyhow::Error> {
        match s {
            "self" => Ok(PlanSource::SelfInitiated),
            "doctor" => Ok(PlanSource::DoctorRecommended),
            _ => Err(anyhow::Error::msg(format!("Unknown plan source: {}", s))),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct QuitPlan {
    pub id: i64,
    pub user_id: i64,
    pub doctor_id: Option<i64>,
    pub cigarettes_per_day: i64,
    pub cigarettes_per_pack: i64,
    pub price_per_pack: i64,
    pub years_smoked: i64,
    pub daily_cost: i64,
    pub start_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub status: PlanStatus,
    pub approved_by_doctor: bool,
    pub doctor_notes: String,
    pub source: PlanSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbQuitPlan {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub cigarettes_per_day: Option<i64>,
    pub cigarettes_per_pack: Option<i64>,
    pub price_per_pack: Option<i64>,
    pub years_smoked: Option<i64>,
    pub daily_cost: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub approved_by_doctor: Option<bool>,
    pub doctor_notes: Option<String>,
    pub source: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbQuitPlan> for QuitPlan {
    fn from(plan: DbQuitPlan) -> Self {
        Self {
            id: plan.id.unwrap_or_default(),
            user_id: plan.user_id.unwrap_or_default(),
            doctor_id: plan.doctor_id,
            cigarettes_per_day: plan.cigarettes_per_day.unwrap_or_default(),
            cigarettes_per_pack: plan.cigarettes_per_pack.unwrap_or_default(),
            price_per_pack: plan.price_per_pack.unwrap_or_default(),
            years_smoked: plan.years_smoked.unwrap_or_default(),
            daily_cost: plan.daily_cost.unwrap_or_default(),
            start_date: plan.start_date.unwrap_or_else(|| Utc::now().date_naive()),
            target_date: plan.target_date,
            status: PlanStatus::from_str(&plan.status.unwrap_or_default())
                .unwrap_or(PlanStatus::Cancelled),
            approved_by_doctor: plan.approved_by_doctor.unwrap_or_default(),
            doctor_notes: plan.doctor_notes.unwrap_or_default(),
            source: PlanSource::from_str(&plan.source.unwrap_or_default())
                .unwrap_or(PlanSource::SelfInitiated),
            created_at: to_utc(plan.created_at),
            updated_at: to_utc(plan.updated_at),
        }
    }
}

impl QuitPlan {
    /// Cost of one day of the baseline habit, in the smallest currency unit.
    pub fn derive_daily_cost(
        cigarettes_per_day: i64,
        price_per_pack: i64,
        cigarettes_per_pack: i64,
    ) -> i64 {
        if cigarettes_per_pack <= 0 {
            return 0;
        }
        cigarettes_per_day * price_per_pack / cigarettes_per_pack
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct QuitProgress {
    pub id: i64,
    pub plan_id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub smoked_today: bool,
    pub cigarettes_smoked: i64,
    pub money_saved: i64,
    pub days_smoke_free: i64,
    pub mood: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbQuitProgress {
    pub id: Option<i64>,
    pub plan_id: Option<i64>,
    pub user_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub smoked_today: Option<bool>,
    pub cigarettes_smoked: Option<i64>,
    pub money_saved: Option<i64>,
    pub days_smoke_free: Option<i64>,
    pub mood: Option<String>,
    pub note: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbQuitProgress> for QuitProgress {
    fn from(db: DbQuitProgress) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            plan_id: db.plan_id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            date: db.date.unwrap_or_else(|| Utc::now().date_naive()),
            smoked_today: db.smoked_today.unwrap_or_default(),
            cigarettes_smoked: db.cigarettes_smoked.unwrap_or_default(),
            money_saved: db.money_saved.unwrap_or_default(),
            days_smoke_free: db.days_smoke_free.unwrap_or_default(),
            mood: db.mood.unwrap_or_default(),
            note: db.note.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}
