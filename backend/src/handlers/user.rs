use std::sync::Arc;

use axum::{Extension, Form, Json, extract::State, http::StatusCode};
use validator::Validate;

use crate::AppState;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UserResponse};
use crate::utils::{ApiError, ApiResult, Claims};

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Validation error or duplicate user"),
    ),
    tag = "Users"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    payload.validate()?;
    tracing::info!("Registering user: {}", payload.username);
    let user = state.user_service.register(payload).await?;
    tracing::info!("Registered user: {} (ID: {})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Exchange credentials for a bearer token and a new session
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body(content = LoginRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    tracing::info!("Login attempt for user: {}", payload.username);
    let response = state
        .user_service
        .login(&payload.username, &payload.password)
        .await?;
    tracing::info!("User {} logged in (session {})", payload.username, response.session_id);
    Ok(Json(response))
}

/// Current user
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let user = state
        .user_service
        .find_by_username(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized(format!("Unknown user: {}", claims.sub)))?;
    Ok(Json(user.into()))
}
