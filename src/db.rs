use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{DbUser, DbUserSession, User, UserSession};
use crate::error::AppError;
use crate::models::{DbQuitPlan, DbQuitProgress, PlanSource, PlanStatus, QuitPlan, QuitProgress};
use crate::ranking::MemberProgressTotals;

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, role, display_name, avatar, archived FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Looking up user by username");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, role, display_name, avatar, archived FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument]
pub async fn get_users_by_role(
    pool: &Pool<Sqlite>,
    role: &str,
    show_archived: bool,
) -> Result<Vec<User>, AppError> {
    info!(role = %role, show_archived = %show_archived, "Getting users by role");

    let query = if show_archived {
        "SELECT id, username, role, display_name, avatar, archived FROM users WHERE role = ?"
    } else {
        "SELECT id, username, role, display_name, avatar, archived FROM users WHERE role = ? AND archived IS 0"
    };

    let rows = sqlx::query_as::<_, DbUser>(query)
        .bind(role)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

#[instrument(skip_all, fields(username, role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
    display_name: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating new user");

    if find_user_by_username(pool, username).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password, role, display_name) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hashed_password)
    .bind(role)
    .bind(display_name.unwrap_or(username))
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let stored: Option<String> = sqlx::query_scalar("SELECT password FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    match stored {
        Some(hash) => match bcrypt::verify(password, &hash) {
            Ok(true) => find_user_by_username(pool, username).await,
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub struct PlanBaseline {
    pub cigarettes_per_day: i64,
    pub cigarettes_per_pack: i64,
    pub price_per_pack: i64,
    pub years_smoked: i64,
    pub target_date: Option<NaiveDate>,
}

#[instrument(skip(pool, baseline))]
pub async fn create_quit_plan(
    pool: &Pool<Sqlite>,
    user_id: i64,
    doctor_id: Option<i64>,
    source: PlanSource,
    baseline: PlanBaseline,
) -> Result<QuitPlan, AppError> {
    info!("Creating quit plan");

    // The one-active-plan invariant lives here, not in a DB constraint:
    // check and insert inside one transaction so two concurrent creates
    // cannot both pass the check.
    let mut tx = pool.begin().await?;

    let active: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM quit_plans WHERE user_id = ? AND status = 'active'",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    if active.is_some() {
        return Err(AppError::Conflict(
            "An active quit plan already exists; reset it before starting a new one".to_string(),
        ));
    }

    let daily_cost = QuitPlan::derive_daily_cost(
        baseline.cigarettes_per_day,
        baseline.price_per_pack,
        baseline.cigarettes_per_pack,
    );
    let start_date = Utc::now().date_naive();

    let res = sqlx::query(
        "INSERT INTO quit_plans
         (user_id, doctor_id, cigarettes_per_day, cigarettes_per_pack, price_per_pack,
          years_smoked, daily_cost, start_date, target_date, status, source)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?)",
    )
    .bind(user_id)
    .bind(doctor_id)
    .bind(baseline.cigarettes_per_day)
    .bind(baseline.cigarettes_per_pack)
    .bind(baseline.price_per_pack)
    .bind(baseline.years_smoked)
    .bind(daily_cost)
    .bind(start_date)
    .bind(baseline.target_date)
    .bind(source.as_str())
    .execute(&mut *tx)
    .await?;

    let plan_id = res.last_insert_rowid();
    tx.commit().await?;

    get_plan(pool, plan_id).await
}

#[instrument]
pub async fn get_plan(pool: &Pool<Sqlite>, id: i64) -> Result<QuitPlan, AppError> {
    info!("Fetching quit plan");
    let row = sqlx::query_as::<_, DbQuitPlan>("SELECT * FROM quit_plans WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(plan) => Ok(QuitPlan::from(plan)),
        _ => Err(AppError::NotFound(format!(
            "Quit plan with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn get_active_plan(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<QuitPlan>, AppError> {
    info!("Fetching active quit plan");
    let row = sqlx::query_as::<_, DbQuitPlan>(
        "SELECT * FROM quit_plans WHERE user_id = ? AND status = 'active'",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(QuitPlan::from))
}

#[instrument]
pub async fn get_plans_by_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<QuitPlan>, AppError> {
    info!("Fetching user's quit plans");
    let rows = sqlx::query_as::<_, DbQuitPlan>(
        "SELECT * FROM quit_plans WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(QuitPlan::from).collect())
}

#[instrument]
pub async fn update_plan_status(
    pool: &Pool<Sqlite>,
    plan_id: i64,
    next: PlanStatus,
) -> Result<QuitPlan, AppError> {
    info!(next = %next, "Updating quit plan status");

    let plan = get_plan(pool, plan_id).await?;

    if !plan.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move plan from {} to {}",
            plan.status, next
        )));
    }

    // Resuming a paused plan must not break the one-active-plan invariant.
    if next == PlanStatus::Active {
        if let Some(active) = get_active_plan(pool, plan.user_id).await? {
            if active.id != plan_id {
                return Err(AppError::Conflict(
                    "Another quit plan is already active".to_string(),
                ));
            }
        }
    }

    let now = Utc::now().naive_utc();
    sqlx::query("UPDATE quit_plans SET status = ?, updated_at = ? WHERE id = ?")
        .bind(next.as_str())
        .bind(now)
        .bind(plan_id)
        .execute(pool)
        .await?;

    get_plan(pool, plan_id).await
}

/// Reset workflow: retire the user's active plan so a new one may be
/// created. The plan is cancelled, never deleted; its progress history
/// stays in place.
#[instrument]
pub async fn cancel_active_plan(pool: &Pool<Sqlite>, user_id: i64) -> Result<QuitPlan, AppError> {
    info!("Resetting active quit plan");

    let plan = get_active_plan(pool, user_id).await?.ok_or_else(|| {
        AppError::NotFound("No active quit plan to reset".to_string())
    })?;

    update_plan_status(pool, plan.id, PlanStatus::Cancelled).await
}

#[instrument(skip(pool, notes))]
pub async fn approve_plan(
    pool: &Pool<Sqlite>,
    plan_id: i64,
    doctor_id: i64,
    notes: &str,
) -> Result<QuitPlan, AppError> {
    info!("Recording doctor approval");

    // Approval never touches the status column.
    let plan = get_plan(pool, plan_id).await?;

    let now = Utc::now().naive_utc();
    sqlx::query(
        "UPDATE quit_plans
         SET approved_by_doctor = 1, doctor_id = ?, doctor_notes = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(doctor_id)
    .bind(notes)
    .bind(now)
    .bind(plan.id)
    .execute(pool)
    .await?;

    get_plan(pool, plan_id).await
}

#[instrument]
pub async fn get_progress_by_plan(
    pool: &Pool<Sqlite>,
    plan_id: i64,
) -> Result<Vec<QuitProgress>, AppError> {
    info!("Fetching progress records for plan");
    let rows = sqlx::query_as::<_, DbQuitProgress>(
        "SELECT * FROM quit_progress WHERE plan_id = ? ORDER BY date",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(QuitProgress::from).collect())
}

pub struct ProgressEntry<'a> {
    pub smoked_today: bool,
    pub cigarettes_smoked: i64,
    pub mood: &'a str,
    pub note: &'a str,
}

/// Write the day's progress record for a plan.
///
/// The streak counter and money saved are always recomputed here from the
/// previous day's record and the plan's daily cost; values supplied by a
/// client are never stored. Writing the same date twice upserts: the
/// second write supersedes the first, and the UNIQUE(plan_id, user_id,
/// date) index serializes concurrent same-day writes into one row.
#[instrument(skip(pool, plan, entry), fields(plan_id = plan.id))]
pub async fn upsert_progress(
    pool: &Pool<Sqlite>,
    plan: &QuitPlan,
    date: NaiveDate,
    entry: ProgressEntry<'_>,
) -> Result<QuitProgress, AppError> {
    info!(smoked_today = entry.smoked_today, "Recording daily progress");

    let previous_streak: Option<i64> = match date.pred_opt() {
        Some(yesterday) => {
            sqlx::query_scalar(
                "SELECT days_smoke_free FROM quit_progress
                 WHERE plan_id = ? AND user_id = ? AND date = ? AND smoked_today IS 0",
            )
            .bind(plan.id)
            .bind(plan.user_id)
            .bind(yesterday)
            .fetch_optional(pool)
            .await?
        }
        None => None,
    };

    let days_smoke_free = if entry.smoked_today {
        0
    } else {
        previous_streak.unwrap_or(0) + 1
    };
    let money_saved = if entry.smoked_today { 0 } else { plan.daily_cost };

    sqlx::query(
        "INSERT INTO quit_progress
         (plan_id, user_id, date, smoked_today, cigarettes_smoked, money_saved,
          days_smoke_free, mood, note)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (plan_id, user_id, date) DO UPDATE SET
           smoked_today = excluded.smoked_today,
           cigarettes_smoked = excluded.cigarettes_smoked,
           money_saved = excluded.money_saved,
           days_smoke_free = excluded.days_smoke_free,
           mood = excluded.mood,
           note = excluded.note",
    )
    .bind(plan.id)
    .bind(plan.user_id)
    .bind(date)
    .bind(entry.smoked_today)
    .bind(entry.cigarettes_smoked)
    .bind(money_saved)
    .bind(days_smoke_free)
    .bind(entry.mood)
    .bind(entry.note)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DbQuitProgress>(
        "SELECT * FROM quit_progress WHERE plan_id = ? AND user_id = ? AND date = ?",
    )
    .bind(plan.id)
    .bind(plan.user_id)
    .bind(date)
    .fetch_one(pool)
    .await?;

    Ok(QuitProgress::from(row))
}

/// Per-member totals feeding the ranking builder: best streak, summed
/// savings and the count of smoke-free days, with zero rows for members
/// who have no progress yet. Explicit join instead of per-user fetches.
#[instrument]
pub async fn get_member_progress_totals(
    pool: &Pool<Sqlite>,
) -> Result<Vec<MemberProgressTotals>, AppError> {
    info!("Aggregating member progress totals");

    let rows = sqlx::query_as::<_, MemberProgressTotals>(
        "SELECT u.id AS user_id,
                u.display_name AS display_name,
                u.avatar AS avatar,
                COALESCE(MAX(p.days_smoke_free), 0) AS days_smoke_free,
                COALESCE(SUM(p.money_saved), 0) AS total_money_saved,
                COALESCE(SUM(CASE WHEN p.smoked_today IS 0 THEN 1 ELSE 0 END), 0)
                    AS smoke_free_days
         FROM users u
         LEFT JOIN quit_progress p ON p.user_id = u.id
         WHERE u.role = 'member' AND u.archived IS 0
         GROUP BY u.id, u.display_name, u.avatar
         ORDER BY u.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
