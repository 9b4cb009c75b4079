use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;
use utoipa::ToSchema;

/// Server-side analysis session; `user_id == 0` marks an anonymous upload
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Dataset {
    pub id: i64,
    pub session_id: i64,
    pub name: String,
    pub path: String,
    pub meta_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Upload metadata persisted alongside a dataset row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub original_name: String,
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Read-only view of a stored dataset, as consumed by the analysis engine
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetHandle {
    pub id: i64,
    pub session_id: i64,
    pub storage_path: PathBuf,
    pub column_names: Vec<String>,
    pub sheet_name: Option<String>,
}

impl Dataset {
    pub fn meta(&self) -> DatasetMeta {
        self.meta_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }

    pub fn handle(&self) -> DatasetHandle {
        let meta = self.meta();
        DatasetHandle {
            id: self.id,
            session_id: self.session_id,
            storage_path: PathBuf::from(&self.path),
            column_names: meta.columns,
            sheet_name: meta.sheet_name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub session_id: String,
    pub dataset_id: String,
    pub rows: usize,
    pub columns: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub preview: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatasetResponse {
    pub id: i64,
    pub session_id: i64,
    pub name: String,
    pub path: String,
    pub columns: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Dataset> for DatasetResponse {
    fn from(dataset: Dataset) -> Self {
        let columns = dataset.meta().columns;
        Self {
            id: dataset.id,
            session_id: dataset.session_id,
            name: dataset.name,
            path: dataset.path,
            columns,
            created_at: dataset.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameDatasetRequest {
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RenameDatasetResponse {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DatasetListQuery {
    pub session_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(meta_json: Option<&str>) -> Dataset {
        Dataset {
            id: 7,
            session_id: 3,
            name: "sales.csv".to_string(),
            path: "storage/20250101/sales_1.csv".to_string(),
            meta_json: meta_json.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_handle_reads_meta() {
        let ds = dataset(Some(
            r#"{"original_name":"sales.xlsx","sheet_name":"2024","columns":["Date","shop"]}"#,
        ));
        let handle = ds.handle();
        assert_eq!(handle.id, 7);
        assert_eq!(handle.session_id, 3);
        assert_eq!(handle.sheet_name.as_deref(), Some("2024"));
        assert_eq!(handle.column_names, vec!["Date", "shop"]);
    }

    #[test]
    fn test_handle_tolerates_missing_meta() {
        let handle = dataset(None).handle();
        assert!(handle.column_names.is_empty());
        assert!(handle.sheet_name.is_none());

        let handle = dataset(Some("not json")).handle();
        assert!(handle.column_names.is_empty());
    }
}
