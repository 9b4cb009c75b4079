use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};

use crate::AppState;
use crate::models::{
    DatasetListQuery, DatasetResponse, RenameDatasetRequest, RenameDatasetResponse, Session,
    UploadResponse,
};
use crate::services::UploadFile;
use crate::utils::{ApiError, ApiResult};

/// Multipart form accepted by the upload endpoint
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(format = Binary)]
    file: String,
    session_id: Option<String>,
    sheet_name: Option<String>,
    name: Option<String>,
}

/// Upload a CSV or Excel dataset
#[utoipa::path(
    post,
    path = "/api/v1/data/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Dataset stored", body = UploadResponse),
        (status = 400, description = "Unsupported file type or malformed form"),
        (status = 404, description = "Session not found"),
    ),
    tag = "Data"
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut session_id = None;
    let mut sheet_name = None;
    let mut name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Malformed multipart body: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            },
            "session_id" | "sheet_name" | "name" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read {}: {}", field_name, e)))?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match field_name.as_str() {
                    "session_id" => session_id = value,
                    "sheet_name" => sheet_name = value,
                    _ => name = value,
                }
            },
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| ApiError::validation_error("Missing 'file' field"))?;
    let session_id = session_id
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| ApiError::validation_error(format!("Invalid session_id: {}", raw)))
        })
        .transpose()?;

    tracing::info!("Upload '{}' ({} bytes), session={:?}", file_name, bytes.len(), session_id);

    let response = state
        .dataset_service
        .upload(UploadFile { file_name, bytes, session_id, sheet_name, name })
        .await?;
    Ok(Json(response))
}

/// List sessions, newest first
#[utoipa::path(
    get,
    path = "/api/v1/data/sessions",
    responses((status = 200, description = "Sessions", body = Vec<Session>)),
    tag = "Data"
)]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Session>>> {
    let sessions = state.session_service.list().await?;
    tracing::debug!("Retrieved {} sessions", sessions.len());
    Ok(Json(sessions))
}

/// List the datasets of a session, newest first
#[utoipa::path(
    get,
    path = "/api/v1/data/datasets",
    params(DatasetListQuery),
    responses((status = 200, description = "Datasets", body = Vec<DatasetResponse>)),
    tag = "Data"
)]
pub async fn list_datasets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DatasetListQuery>,
) -> ApiResult<Json<Vec<DatasetResponse>>> {
    let datasets = state.dataset_service.list_for_session(query.session_id).await?;
    Ok(Json(datasets.into_iter().map(DatasetResponse::from).collect()))
}

/// Rename a dataset
#[utoipa::path(
    patch,
    path = "/api/v1/data/datasets/{id}",
    params(("id" = i64, Path, description = "Dataset ID")),
    request_body = RenameDatasetRequest,
    responses(
        (status = 200, description = "Dataset renamed", body = RenameDatasetResponse),
        (status = 400, description = "Name empty or already used in the session"),
        (status = 404, description = "Dataset not found"),
    ),
    tag = "Data"
)]
pub async fn rename_dataset(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<i64>,
    Json(payload): Json<RenameDatasetRequest>,
) -> ApiResult<Json<RenameDatasetResponse>> {
    let dataset = state.dataset_service.rename(dataset_id, &payload.name).await?;
    Ok(Json(RenameDatasetResponse { id: dataset.id, name: dataset.name }))
}
