use crate::auth::Role;
use crate::db::{create_quit_plan, create_user, PlanBaseline};
use crate::error::AppError;
use crate::models::{PlanSource, QuitPlan};
use rocket::local::asynchronous::Client;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Once;

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<TestUser>,
}

pub struct TestUser {
    pub username: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub password: String,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, username: &str, display_name: Option<&str>) -> Self {
        self.users.push(TestUser {
            username: username.to_string(),
            display_name: display_name.map(String::from),
            role: Role::Member,
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    pub fn doctor(mut self, username: &str, display_name: Option<&str>) -> Self {
        self.users.push(TestUser {
            username: username.to_string(),
            display_name: display_name.map(String::from),
            role: Role::Doctor,
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    pub fn admin(mut self, username: &str, display_name: Option<&str>) -> Self {
        self.users.push(TestUser {
            username: username.to_string(),
            display_name: display_name.map(String::from),
            role: Role::Admin,
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });

        // A single connection keeps every test query on the same
        // in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mut user_id_map: HashMap<String, i64> = HashMap::new();

        for user in &self.users {
            let user_id = create_user(
                &pool,
                &user.username,
                &user.password,
                user.role.as_str(),
                user.display_name.as_deref(),
            )
            .await?;

            user_id_map.insert(user.username.clone(), user_id);
        }

        Ok(TestDb { pool, user_id_map })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub user_id_map: HashMap<String, i64>,
}

impl TestDb {
    pub fn user_id(&self, username: &str) -> i64 {
        self.user_id_map
            .get(username)
            .copied()
            .expect("unknown test user")
    }
}

pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .member("member_user", Some("Member User"))
        .member("other_member", Some("Other Member"))
        .doctor("doctor_user", Some("Doctor User"))
        .admin("admin_user", Some("Admin User"))
        .build()
        .await
        .expect("Failed to build test database")
}

pub fn standard_baseline() -> PlanBaseline {
    // 20 a day from 30000-per-pack packs of 20 costs 30000 a day.
    PlanBaseline {
        cigarettes_per_day: 20,
        cigarettes_per_pack: 20,
        price_per_pack: 30000,
        years_smoked: 5,
        target_date: None,
    }
}

pub async fn create_active_plan(pool: &Pool<Sqlite>, user_id: i64) -> QuitPlan {
    create_quit_plan(
        pool,
        user_id,
        None,
        PlanSource::SelfInitiated,
        standard_baseline(),
    )
    .await
    .expect("Failed to create test plan")
}

pub async fn setup_test_client(test_db: &TestDb) -> Client {
    let rocket = crate::init_rocket(test_db.pool.clone()).await;
    Client::tracked(rocket)
        .await
        .expect("Failed to build test client")
}

pub async fn login_test_user(client: &Client, username: &str, password: &str) {
    use rocket::http::{ContentType, Status};

    let response = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(
            serde_json::json!({
                "username": username,
                "password": password
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
}
