use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{Dataset, DatasetHandle, DatasetMeta, UploadResponse};
use crate::services::SessionService;
use crate::services::analysis::DatasetStore;
use crate::services::analysis::table::load_table;
use crate::services::session_service::ANONYMOUS_USER_ID;
use crate::utils::{ApiError, ApiResult};

/// Upload formats accepted by the data endpoints
pub const UPLOAD_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

const PREVIEW_ROWS: usize = 5;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-.]+").expect("valid filename regex"));

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub session_id: Option<i64>,
    pub sheet_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct DatasetService {
    pool: SqlitePool,
    session_service: Arc<SessionService>,
    storage_dir: PathBuf,
}

impl DatasetService {
    pub fn new(pool: SqlitePool, session_service: Arc<SessionService>, storage_dir: impl Into<PathBuf>) -> Self {
        Self { pool, session_service, storage_dir: storage_dir.into() }
    }

    /// Persist an upload, parse it once for its header and preview, and
    /// record it as a dataset of the given (or a new anonymous) session.
    pub async fn upload(&self, upload: UploadFile) -> ApiResult<UploadResponse> {
        let ext = extension_of(&upload.file_name);
        if !UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ApiError::UnsupportedFileType(ext));
        }

        let session = match upload.session_id {
            Some(id) => self.session_service.get(id).await?,
            None => self.session_service.create(ANONYMOUS_USER_ID, None).await?,
        };

        let path = self.storage_path(&upload.file_name, &ext);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::internal_error(format!("Failed to create storage dir: {}", e)))?;
        }
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to store upload: {}", e)))?;

        let sheet = upload.sheet_name.clone().filter(|s| !s.trim().is_empty());
        let table = {
            let path = path.clone();
            let sheet = sheet.clone();
            tokio::task::spawn_blocking(move || load_table(&path, sheet.as_deref()))
                .await
                .map_err(|e| ApiError::internal_error(format!("Load task failed: {}", e)))?
        };
        let table = match table {
            Ok(table) => table,
            Err(e) => {
                // Nothing references the file yet
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            },
        };

        let meta = DatasetMeta {
            original_name: upload.file_name.clone(),
            sheet_name: sheet,
            columns: table.columns().to_vec(),
        };
        let name = upload
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| upload.file_name.clone());

        let result = sqlx::query(
            "INSERT INTO datasets (session_id, name, path, meta_json, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(&name)
        .bind(path.to_string_lossy().to_string())
        .bind(serde_json::to_string(&meta)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        let dataset_id = result.last_insert_rowid();

        tracing::info!(
            "Stored dataset {} '{}' ({} rows) in session {} at {}",
            dataset_id,
            name,
            table.len(),
            session.id,
            path.display()
        );

        Ok(UploadResponse {
            session_id: session.id.to_string(),
            dataset_id: dataset_id.to_string(),
            rows: table.len(),
            columns: meta.columns,
            preview: table.preview(PREVIEW_ROWS),
        })
    }

    pub async fn get(&self, dataset_id: i64) -> ApiResult<Dataset> {
        sqlx::query_as("SELECT * FROM datasets WHERE id = ?")
            .bind(dataset_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ApiError::DatasetNotFound)
    }

    pub async fn list_for_session(&self, session_id: i64) -> ApiResult<Vec<Dataset>> {
        let datasets = sqlx::query_as(
            "SELECT * FROM datasets WHERE session_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(datasets)
    }

    pub async fn rename(&self, dataset_id: i64, name: &str) -> ApiResult<Dataset> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation_error("Dataset name must not be empty"));
        }

        let dataset = self.get(dataset_id).await?;
        let taken: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM datasets WHERE session_id = ? AND name = ? AND id != ?")
                .bind(dataset.session_id)
                .bind(name)
                .bind(dataset_id)
                .fetch_optional(&self.pool)
                .await?;
        if taken.is_some() {
            return Err(ApiError::validation_error(format!(
                "A dataset named '{}' already exists in session {}",
                name, dataset.session_id
            )));
        }

        sqlx::query("UPDATE datasets SET name = ? WHERE id = ?")
            .bind(name)
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("Renamed dataset {} to '{}'", dataset_id, name);
        self.get(dataset_id).await
    }

    pub async fn count(&self) -> ApiResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM datasets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// `<storage>/<YYYYMMDD>/<stem>_<uuid>.<ext>`
    fn storage_path(&self, file_name: &str, ext: &str) -> PathBuf {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");
        let stem = UNSAFE_FILENAME_CHARS.replace_all(stem, "_");
        let stem = if stem.trim_matches(|c| c == '_' || c == '.').is_empty() { "upload".into() } else { stem };

        self.storage_dir
            .join(Utc::now().format("%Y%m%d").to_string())
            .join(format!("{}_{}.{}", stem, uuid::Uuid::new_v4().simple(), ext))
    }
}

#[async_trait]
impl DatasetStore for DatasetService {
    async fn resolve(&self, session_id: i64, dataset_id: Option<i64>) -> ApiResult<Option<DatasetHandle>> {
        let dataset: Option<Dataset> = match dataset_id {
            Some(id) => {
                sqlx::query_as("SELECT * FROM datasets WHERE id = ? AND session_id = ?")
                    .bind(id)
                    .bind(session_id)
                    .fetch_optional(&self.pool)
                    .await?
            },
            None => {
                sqlx::query_as(
                    "SELECT * FROM datasets WHERE session_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
                )
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?
            },
        };
        Ok(dataset.map(|d| d.handle()))
    }
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Sales.CSV"), "csv");
        assert_eq!(extension_of("report.2024.xlsx"), "xlsx");
        assert_eq!(extension_of("noext"), "");
    }

    #[test]
    fn test_filename_sanitizing() {
        assert_eq!(UNSAFE_FILENAME_CHARS.replace_all("売上 2024/01", "_"), "売上_2024_01");
        assert_eq!(UNSAFE_FILENAME_CHARS.replace_all("a b?c", "_"), "a_b_c");
    }
}
