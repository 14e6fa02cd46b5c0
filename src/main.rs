#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod ranking;
mod stats;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_add_smoke_free_day, api_approve_plan, api_create_plan, api_get_active_plan,
    api_get_leaderboard, api_get_leaderboard_with_me, api_get_my_plans, api_get_patients,
    api_get_plan_stats, api_get_user_rank, api_login, api_logout, api_me, api_me_unauthorized,
    api_record_progress, api_register_user, api_reset_plan, api_update_plan_status, health,
};
use auth::unauthorized_api;
use db::clean_expired_sessions;
use rocket::fairing::AdHoc;
use rocket::{tokio, Build, Rocket};
use telemetry::{init_tracing, shutdown_telemetry, TelemetryFairing};

use sqlx::SqlitePool;
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    let _ = env::load_environment();
    init_tracing();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting smokefree tracker");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_register_user,
                api_me,
                api_me_unauthorized,
                api_get_patients,
                api_create_plan,
                api_get_my_plans,
                api_get_active_plan,
                api_get_plan_stats,
                api_update_plan_status,
                api_approve_plan,
                api_reset_plan,
                api_add_smoke_free_day,
                api_record_progress,
                api_get_leaderboard,
                api_get_leaderboard_with_me,
                api_get_user_rank,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async {
                shutdown_telemetry();
            })
        }))
}
