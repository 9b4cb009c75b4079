use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::AppState;
use crate::models::{
    HistogramRequest, HistogramResponse, ParetoRequest, ParetoResponse, TimeSeriesRequest,
    TimeSeriesResponse,
};
use crate::services::AnalysisOutcome;
use crate::services::analysis::{HistogramParams, ParetoParams, TimeSeriesParams};
use crate::utils::ApiResult;

pub const JOB_ID_HEADER: &str = "x-analysis-job-id";
pub const CACHE_HEADER: &str = "x-cache";

fn cached_response<T: Serialize>(outcome: AnalysisOutcome<T>) -> Response {
    let mut response = Json(outcome.result).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_HEADER, HeaderValue::from_static(if outcome.cached { "HIT" } else { "MISS" }));
    if let Some(job_id) = outcome.job_id {
        headers.insert(JOB_ID_HEADER, HeaderValue::from(job_id));
    }
    response
}

/// Aggregate a numeric column over daily, weekly or monthly buckets
#[utoipa::path(
    post,
    path = "/api/v1/analysis/timeseries",
    request_body = TimeSeriesRequest,
    responses(
        (status = 200, description = "Time series", body = TimeSeriesResponse),
        (status = 400, description = "Column not found or invalid range"),
        (status = 404, description = "Dataset not found"),
    ),
    tag = "Analysis"
)]
pub async fn timeseries(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TimeSeriesRequest>,
) -> ApiResult<Response> {
    tracing::debug!(
        "Time series request: session={}, dataset={:?}, target={}",
        req.session_id,
        req.dataset_id,
        req.target_column
    );
    let params = TimeSeriesParams::from(&req);
    let outcome = state
        .analysis_service
        .run(req.session_id, req.dataset_id, params)
        .await?;
    Ok(cached_response(outcome))
}

/// Rank product categories by total value
#[utoipa::path(
    post,
    path = "/api/v1/analysis/pareto",
    request_body = ParetoRequest,
    responses(
        (status = 200, description = "Pareto ranking", body = ParetoResponse),
        (status = 400, description = "No category columns in dataset"),
        (status = 404, description = "Dataset not found"),
    ),
    tag = "Analysis"
)]
pub async fn pareto(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ParetoRequest>,
) -> ApiResult<Response> {
    tracing::debug!(
        "Pareto request: session={}, dataset={:?}, store={:?}, period={:?}",
        req.session_id,
        req.dataset_id,
        req.store,
        req.period
    );
    let params = ParetoParams::from(&req);
    let outcome = state
        .analysis_service
        .run(req.session_id, req.dataset_id, params)
        .await?;
    Ok(cached_response(outcome))
}

/// Bin a numeric column into equal-width buckets
#[utoipa::path(
    post,
    path = "/api/v1/analysis/histogram",
    request_body = HistogramRequest,
    responses(
        (status = 200, description = "Histogram", body = HistogramResponse),
        (status = 400, description = "Column not found or invalid bin count"),
        (status = 404, description = "Dataset not found"),
    ),
    tag = "Analysis"
)]
pub async fn histogram(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HistogramRequest>,
) -> ApiResult<Response> {
    tracing::debug!(
        "Histogram request: session={}, dataset={:?}, column={}, bins={:?}",
        req.session_id,
        req.dataset_id,
        req.column,
        req.bins
    );
    let params = HistogramParams::from_request(&req, state.bin_limits)?;
    let outcome = state
        .analysis_service
        .run(req.session_id, req.dataset_id, params)
        .await?;
    Ok(cached_response(outcome))
}
