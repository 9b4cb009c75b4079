// Common test utilities and helpers

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::{DatasetService, SessionService, UploadFile};

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Default configuration with uploads stored under `storage_dir`
pub fn test_config(storage_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.dir = storage_dir.to_string_lossy().to_string();
    config.auth.jwt_secret = "test-secret".to_string();
    config
}

pub fn create_dataset_service(pool: &SqlitePool, storage_dir: &Path) -> Arc<DatasetService> {
    let session_service = Arc::new(SessionService::new(pool.clone()));
    Arc::new(DatasetService::new(pool.clone(), session_service, storage_dir))
}

/// Twelve months of sales for two stores, one row per store and month
pub fn monthly_sales_csv() -> String {
    let mut csv = String::from("Date,shop,sales,Mens_KNIT,Mens_PANTS,WOMEN'S_TOPS\n");
    for month in 1..=12 {
        csv.push_str(&format!("2024-{:02}-15,Tokyo,{},{},{},{}\n", month, month * 100, month, 2, 10));
        csv.push_str(&format!("2024-{:02}-20,Osaka,{},{},{},{}\n", month, 50, 1, 1, 1));
    }
    csv
}

/// Upload `content` as `file_name` into a new anonymous session
pub async fn upload_csv(service: &DatasetService, file_name: &str, content: &str) -> (i64, i64) {
    let response = service
        .upload(UploadFile {
            file_name: file_name.to_string(),
            bytes: content.as_bytes().to_vec(),
            session_id: None,
            sheet_name: None,
            name: None,
        })
        .await
        .expect("Failed to upload test dataset");

    (
        response.session_id.parse().expect("numeric session id"),
        response.dataset_id.parse().expect("numeric dataset id"),
    )
}
