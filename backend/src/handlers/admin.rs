use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;
use crate::services::DebugOverview;
use crate::utils::ApiResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "System"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

/// Row counts, latest analysis jobs and cache counters
#[utoipa::path(
    get,
    path = "/api/v1/admin/debug/overview",
    responses(
        (status = 200, description = "Debug overview", body = DebugOverview),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "System"
)]
pub async fn debug_overview(State(state): State<Arc<AppState>>) -> ApiResult<Json<DebugOverview>> {
    let overview = state.overview_service.debug_overview().await?;
    tracing::debug!(
        "Overview: {} datasets, {} jobs",
        overview.counts.datasets,
        overview.counts.analysis_jobs
    );
    Ok(Json(overview))
}
