use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{AnalysisJob, JobSummary};
use crate::services::analysis::{JobKey, JobStore};
use crate::utils::{ApiError, ApiResult};

/// `analysis_jobs` access; the persistent side of the analysis cache
#[derive(Clone)]
pub struct JobService {
    pool: SqlitePool,
}

impl JobService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, job_id: i64) -> ApiResult<AnalysisJob> {
        sqlx::query_as("SELECT * FROM analysis_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ApiError::JobNotFound { job_id })
    }

    pub async fn latest(&self, limit: i64) -> ApiResult<Vec<JobSummary>> {
        let rows: Vec<(i64, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, type, created_at FROM analysis_jobs ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, kind, created_at)| JobSummary { id, kind, created_at })
            .collect())
    }

    pub async fn count(&self) -> ApiResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analysis_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl JobStore for JobService {
    async fn lookup(&self, key: &JobKey) -> ApiResult<Option<AnalysisJob>> {
        let job = sqlx::query_as(
            r#"
            SELECT * FROM analysis_jobs
            WHERE session_id = ? AND dataset_id = ? AND type = ? AND params_json = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(key.session_id)
        .bind(key.dataset_id)
        .bind(key.kind.as_str())
        .bind(&key.fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn store(&self, key: &JobKey, result_json: &str) -> ApiResult<AnalysisJob> {
        let result = sqlx::query(
            r#"
            INSERT INTO analysis_jobs (session_id, dataset_id, type, params_json, result_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.session_id)
        .bind(key.dataset_id)
        .bind(key.kind.as_str())
        .bind(&key.fingerprint)
        .bind(result_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let job_id = result.last_insert_rowid();
        tracing::debug!("Stored {} job {} for dataset {}", key.kind, job_id, key.dataset_id);
        self.get(job_id).await
    }
}
