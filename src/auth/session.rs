use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;

pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub token: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        Self {
            id: session.id.unwrap_or_default(),
            user_id: session.user_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: to_utc(session.created_at),
            // Missing expiry means the row is unusable; treat as expired.
            expires_at: session
                .expires_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_else(Utc::now)),
        }
    }
}

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

impl UserSession {
    /// Opaque bearer token: a v4 UUID plus random tail, stored server-side.
    pub fn generate_token() -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let tail: u64 = rand::rng().random();
        format!("{}{:016x}", uuid, tail)
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}
