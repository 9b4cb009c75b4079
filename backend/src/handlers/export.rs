use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::AppState;
use crate::services::ExportFormat;
use crate::utils::ApiResult;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `csv` (default) or `xlsx`
    pub format: Option<String>,
}

/// Download a cached analysis result as CSV or XLSX
#[utoipa::path(
    get,
    path = "/api/v1/export/{job_id}",
    params(
        ("job_id" = i64, Path, description = "Analysis job ID"),
        ExportQuery
    ),
    responses(
        (status = 200, description = "File attachment"),
        (status = 400, description = "Unsupported format or analysis type"),
        (status = 404, description = "Job not found"),
    ),
    tag = "Export"
)]
pub async fn export_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let format: ExportFormat = query.format.as_deref().unwrap_or("csv").parse()?;
    let file = state.export_service.export(job_id, format).await?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file.file_name)),
        ],
        file.bytes,
    )
        .into_response())
}
