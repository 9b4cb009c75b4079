use std::sync::Arc;

use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{LoginResponse, RegisterRequest, User};
use crate::services::SessionService;
use crate::utils::{ApiError, ApiResult, JwtUtil};

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
    session_service: Arc<SessionService>,
    jwt_util: Arc<JwtUtil>,
}

impl UserService {
    pub fn new(pool: SqlitePool, session_service: Arc<SessionService>, jwt_util: Arc<JwtUtil>) -> Self {
        Self { pool, session_service, jwt_util }
    }

    pub async fn register(&self, req: RegisterRequest) -> ApiResult<User> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ? OR email = ?")
            .bind(&req.username)
            .bind(&req.email)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_some() {
            return Err(ApiError::validation_error("Username or email already registered"));
        }

        let password_hash = hash(&req.password, DEFAULT_COST)
            .map_err(|err| ApiError::internal_error(format!("Failed to hash password: {}", err)))?;

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, full_name, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&req.username)
        .bind(&req.email)
        .bind(&password_hash)
        .bind(&req.full_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_user(result.last_insert_rowid()).await
    }

    /// Verify credentials, open a session and issue a bearer token
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        let user = self
            .find_by_username(username)
            .await?
            .ok_or_else(ApiError::invalid_credentials)?;

        let valid = verify(password, &user.password_hash)
            .map_err(|err| ApiError::internal_error(format!("Failed to verify password: {}", err)))?;
        if !valid {
            tracing::warn!("Invalid password for user: {}", username);
            return Err(ApiError::invalid_credentials());
        }

        let session = self
            .session_service
            .create(user.id, Some(self.jwt_util.ttl_secs()))
            .await?;
        let access_token = self.jwt_util.generate_token(&user.username)?;

        Ok(LoginResponse {
            access_token,
            token_type: "bearer".to_string(),
            session_id: session.id.to_string(),
        })
    }

    pub async fn get_user(&self, user_id: i64) -> ApiResult<User> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("User {}", user_id)))
    }

    pub async fn find_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn count(&self) -> ApiResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
