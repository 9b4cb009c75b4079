use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::models::Session;
use crate::utils::{ApiError, ApiResult};

/// Owner id recorded for sessions opened by anonymous uploads
pub const ANONYMOUS_USER_ID: i64 = 0;

#[derive(Clone)]
pub struct SessionService {
    pool: SqlitePool,
}

impl SessionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a session for `user_id`, expiring after `ttl_secs` when given
    pub async fn create(&self, user_id: i64, ttl_secs: Option<i64>) -> ApiResult<Session> {
        let now = Utc::now();
        let expires_at = ttl_secs.map(|secs| now + Duration::seconds(secs));

        let result = sqlx::query("INSERT INTO sessions (user_id, created_at, expires_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(now)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        let session_id = result.last_insert_rowid();
        tracing::debug!("Created session {} for user {}", session_id, user_id);
        self.get(session_id).await
    }

    pub async fn get(&self, session_id: i64) -> ApiResult<Session> {
        sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::session_not_found(session_id))
    }

    pub async fn list(&self) -> ApiResult<Vec<Session>> {
        let sessions = sqlx::query_as("SELECT * FROM sessions ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }

    pub async fn count(&self) -> ApiResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
