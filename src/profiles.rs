use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// Investment preferences used to condition the system prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub risk_tolerance: Option<String>,
    #[serde(default)]
    pub investment_experience: Option<String>,
    #[serde(default)]
    pub time_horizon: Option<String>,
    #[serde(default)]
    pub investment_goals: Option<Vec<String>>,
    #[serde(default)]
    pub liquidity_needs: Option<String>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, String>;
    async fn put_profile(&self, user_id: &str, profile: &UserProfile) -> Result<(), String>;
}

#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: Pool<Sqlite>,
}

impl SqliteProfileStore {
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self, String> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS investor_profiles (
                user_id TEXT PRIMARY KEY,
                profile TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(&pool)
        .await
        .map_err(|e| e.to_string())?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, String> {
        let row = sqlx::query("SELECT profile FROM investor_profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.to_string())?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("profile").map_err(|e| e.to_string())?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| format!("stored profile for {user_id} is corrupt: {e}"))
    }

    async fn put_profile(&self, user_id: &str, profile: &UserProfile) -> Result<(), String> {
        let raw = serde_json::to_string(profile).map_err(|e| e.to_string())?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO investor_profiles (user_id, profile, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET profile = excluded.profile, updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(&raw)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| e.to_string())?;
        Ok(())
    }
}
