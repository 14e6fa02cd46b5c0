use chrono::{NaiveDate, Utc};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{json::Json, Deserialize, Serialize};
use rocket::State;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, Role, User, UserSession};
use crate::db::{
    approve_plan, authenticate_user, cancel_active_plan, create_quit_plan, create_user,
    create_user_session, find_user_by_username, get_active_plan, get_member_progress_totals,
    get_plan, get_plans_by_user, get_progress_by_plan, get_users_by_role, invalidate_session,
    update_plan_status, upsert_progress, PlanBaseline, ProgressEntry,
};
use crate::models::{PlanSource, PlanStatus, QuitPlan, QuitProgress};
use crate::ranking::{
    leaderboard, leaderboard_with_user, user_rank, LeaderboardWithUser, RankingEntry,
    DEFAULT_COMBINED_LIMIT, DEFAULT_LEADERBOARD_LIMIT,
};
use crate::stats::{plan_statistics, PlanStatistics};
use crate::validation::{AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationResponse};

#[derive(Deserialize, Validate, Clone)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar: String,
    pub role: String,
    pub archived: bool,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar: user.avatar.clone(),
            role: user.role.to_string(),
            archived: user.archived,
        }
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    use rocket::http::{Cookie, SameSite};

    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    // The cookie is cleared either way; a failed delete leaves the row
    // for the cleanup job, but must not go unrecorded.
    if let Some(token) = token {
        if let Err(err) = invalidate_session(db, &token).await {
            err.log_and_record("Logout session invalidation");
        }
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));
    cookies.remove_private(rocket::http::Cookie::build("user_id"));

    Status::Ok
}

#[derive(Deserialize, Validate, Clone)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3-32 characters"))]
    username: String,
    display_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
    role: Option<String>,
}

#[post("/register", data = "<registration>")]
pub async fn api_register_user(
    registration: Json<RegisterRequest>,
    caller: Option<User>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = registration.validate_custom()?;

    let role = match validated.role.as_deref() {
        Some(role) => Role::from_str(role)
            .map_err(|e| crate::error::AppError::Validation(e.to_string()))
            .validate_custom()?,
        None => Role::Member,
    };

    // Anyone may sign up as a member; creating doctor or admin accounts
    // takes an authenticated caller with the right permissions.
    if role != Role::Member {
        let caller = caller.ok_or_else(|| Status::Unauthorized.to_validation_response())?;

        match role {
            Role::Admin => caller
                .require_all_permissions(&[Permission::RegisterUsers, Permission::EditUserRoles])
                .map_err(|s| s.to_validation_response())?,
            _ => caller
                .require_permission(Permission::RegisterUsers)
                .map_err(|s| s.to_validation_response())?,
        }
    }

    if find_user_by_username(db, &validated.username)
        .await
        .validate_custom()?
        .is_some()
    {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "username",
                "Username already exists",
            )),
        ));
    }

    create_user(
        db,
        &validated.username,
        &validated.password,
        role.as_str(),
        Some(&validated.display_name),
    )
    .await
    .validate_custom()?;

    Ok(Status::Created)
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

/// Patient roster for doctors and admins. Archived accounts are excluded.
#[get("/patients")]
pub async fn api_get_patients(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserData>>, Status> {
    user.require_permission(Permission::ViewAllPatients)?;

    let members = get_users_by_role(db, Role::Member.as_str(), false).await?;

    Ok(Json(members.into_iter().map(UserData::from).collect()))
}

#[derive(Deserialize, Validate, Clone)]
pub struct CreatePlanRequest {
    #[validate(range(min = 1, max = 200, message = "Cigarettes per day must be 1-200"))]
    cigarettes_per_day: i64,
    #[validate(range(min = 1, max = 100, message = "Cigarettes per pack must be 1-100"))]
    cigarettes_per_pack: i64,
    #[validate(range(min = 0, message = "Price per pack cannot be negative"))]
    price_per_pack: i64,
    #[validate(range(min = 0, max = 100, message = "Years smoked must be 0-100"))]
    years_smoked: i64,
    target_date: Option<NaiveDate>,
    /// Set by doctors creating a plan on a patient's behalf.
    patient_id: Option<i64>,
}

#[post("/plans", data = "<request>")]
pub async fn api_create_plan(
    request: Json<CreatePlanRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<QuitPlan>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let (owner_id, doctor_id, source) = match validated.patient_id {
        Some(patient_id) if patient_id != user.id => {
            user.require_permission(Permission::RecommendPlans)
                .map_err(|s| {
                    Custom(
                        s,
                        Json(ValidationResponse::with_error(
                            "permission",
                            "Only doctors may create plans for other users",
                        )),
                    )
                })?;
            (patient_id, Some(user.id), PlanSource::DoctorRecommended)
        }
        _ => {
            user.require_permission(Permission::ManageOwnPlans)
                .map_err(|s| s.to_validation_response())?;
            (user.id, None, PlanSource::SelfInitiated)
        }
    };

    let plan = create_quit_plan(
        db,
        owner_id,
        doctor_id,
        source,
        PlanBaseline {
            cigarettes_per_day: validated.cigarettes_per_day,
            cigarettes_per_pack: validated.cigarettes_per_pack,
            price_per_pack: validated.price_per_pack,
            years_smoked: validated.years_smoked,
            target_date: validated.target_date,
        },
    )
    .await
    .validate_custom()?;

    Ok(Json(plan))
}

#[get("/plans")]
pub async fn api_get_my_plans(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<QuitPlan>>, Status> {
    user.require_permission(Permission::ViewOwnPlans)?;

    let plans = get_plans_by_user(db, user.id).await?;

    Ok(Json(plans))
}

#[get("/plans/active")]
pub async fn api_get_active_plan(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<QuitPlan>, Status> {
    user.require_permission(Permission::ViewOwnPlans)?;

    match get_active_plan(db, user.id).await? {
        Some(plan) => Ok(Json(plan)),
        None => Err(Status::NotFound),
    }
}

#[get("/plans/<id>/stats")]
pub async fn api_get_plan_stats(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<PlanStatistics>, Status> {
    let plan = get_plan(db, id).await?;

    if plan.user_id != user.id && !user.has_permission(Permission::ViewAllPatients) {
        return Err(Status::Forbidden);
    }

    let records = get_progress_by_plan(db, plan.id).await?;
    let stats = plan_statistics(&plan, &records, Utc::now().date_naive());

    Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct PlanStatusUpdateRequest {
    status: String,
}

#[put("/plans/<id>/status", data = "<request>")]
pub async fn api_update_plan_status(
    id: i64,
    request: Json<PlanStatusUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<QuitPlan>, Custom<Json<ValidationResponse>>> {
    let next = PlanStatus::from_str(&request.status)
        .map_err(|e| crate::error::AppError::Validation(e.to_string()))
        .validate_custom()?;

    let plan = get_plan(db, id).await.validate_custom()?;

    if plan.user_id != user.id {
        return Err(Custom(
            Status::Forbidden,
            Json(ValidationResponse::with_error(
                "permission",
                "You can only change your own quit plans",
            )),
        ));
    }

    let updated = update_plan_status(db, id, next).await.validate_custom()?;

    Ok(Json(updated))
}

#[derive(Deserialize)]
pub struct ApprovePlanRequest {
    notes: Option<String>,
}

#[put("/plans/<id>/approve", data = "<request>")]
pub async fn api_approve_plan(
    id: i64,
    request: Json<ApprovePlanRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<QuitPlan>, Status> {
    user.require_permission(Permission::ApprovePlans)?;

    let notes = request.notes.clone().unwrap_or_default();
    let plan = approve_plan(db, id, user.id, &notes).await?;

    Ok(Json(plan))
}

#[derive(Serialize, Deserialize)]
pub struct ResetPlanResponse {
    pub success: bool,
    pub cancelled_plan_id: i64,
}

#[post("/plans/reset")]
pub async fn api_reset_plan(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ResetPlanResponse>, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ManageOwnPlans)
        .map_err(|s| s.to_validation_response())?;

    let cancelled = cancel_active_plan(db, user.id).await.validate_custom()?;

    Ok(Json(ResetPlanResponse {
        success: true,
        cancelled_plan_id: cancelled.id,
    }))
}

#[post("/progress/smoke-free")]
pub async fn api_add_smoke_free_day(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<QuitProgress>, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::TrackProgress)
        .map_err(|s| s.to_validation_response())?;

    let plan = get_active_plan(db, user.id)
        .await
        .validate_custom()?
        .ok_or_else(|| {
            crate::error::AppError::NotFound("No active quit plan".to_string())
                .to_validation_response()
        })?;

    let record = upsert_progress(
        db,
        &plan,
        Utc::now().date_naive(),
        ProgressEntry {
            smoked_today: false,
            cigarettes_smoked: 0,
            mood: "",
            note: "",
        },
    )
    .await
    .validate_custom()?;

    Ok(Json(record))
}

#[derive(Deserialize, Validate, Clone)]
pub struct ProgressRequest {
    smoked_today: bool,
    #[validate(range(min = 0, max = 200, message = "Cigarettes smoked must be 0-200"))]
    cigarettes_smoked: i64,
    mood: Option<String>,
    note: Option<String>,
}

#[post("/progress", data = "<request>")]
pub async fn api_record_progress(
    request: Json<ProgressRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<QuitProgress>, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::TrackProgress)
        .map_err(|s| s.to_validation_response())?;

    let validated = request.validate_custom()?;

    if !validated.smoked_today && validated.cigarettes_smoked > 0 {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "cigarettes_smoked",
                "A smoke-free day cannot record smoked cigarettes",
            )),
        ));
    }

    let plan = get_active_plan(db, user.id)
        .await
        .validate_custom()?
        .ok_or_else(|| {
            crate::error::AppError::NotFound("No active quit plan".to_string())
                .to_validation_response()
        })?;

    let record = upsert_progress(
        db,
        &plan,
        Utc::now().date_naive(),
        ProgressEntry {
            smoked_today: validated.smoked_today,
            cigarettes_smoked: validated.cigarettes_smoked,
            mood: validated.mood.as_deref().unwrap_or(""),
            note: validated.note.as_deref().unwrap_or(""),
        },
    )
    .await
    .validate_custom()?;

    Ok(Json(record))
}

#[get("/leaderboard?<limit>")]
pub async fn api_get_leaderboard(
    limit: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<RankingEntry>>, Status> {
    user.require_permission(Permission::ViewLeaderboard)?;

    let totals = get_member_progress_totals(db).await?;
    let entries = leaderboard(totals, limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT));

    Ok(Json(entries))
}

#[get("/leaderboard/me?<limit>")]
pub async fn api_get_leaderboard_with_me(
    limit: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LeaderboardWithUser>, Status> {
    user.require_permission(Permission::ViewLeaderboard)?;

    let totals = get_member_progress_totals(db).await?;
    let combined = leaderboard_with_user(totals, user.id, limit.unwrap_or(DEFAULT_COMBINED_LIMIT));

    Ok(Json(combined))
}

#[get("/users/<id>/rank")]
pub async fn api_get_user_rank(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RankingEntry>, Status> {
    user.require_permission(Permission::ViewLeaderboard)?;

    let totals = get_member_progress_totals(db).await?;

    match user_rank(totals, id) {
        Some(entry) => Ok(Json(entry)),
        None => Err(Status::NotFound),
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
