use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::models::JobSummary;
use crate::services::analysis::CacheStats;
use crate::services::{AnalysisService, DatasetService, JobService, SessionService, UserService};
use crate::utils::ApiResult;

const RECENT_JOBS: i64 = 10;

#[derive(Debug, Serialize, ToSchema)]
pub struct RowCounts {
    pub users: i64,
    pub sessions: i64,
    pub datasets: i64,
    pub analysis_jobs: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DebugOverview {
    pub counts: RowCounts,
    pub latest_jobs: Vec<JobSummary>,
    /// Hit/miss counters since process start
    pub cache: CacheStats,
}

pub struct OverviewService {
    user_service: Arc<UserService>,
    session_service: Arc<SessionService>,
    dataset_service: Arc<DatasetService>,
    job_service: Arc<JobService>,
    analysis_service: Arc<AnalysisService>,
}

impl OverviewService {
    pub fn new(
        user_service: Arc<UserService>,
        session_service: Arc<SessionService>,
        dataset_service: Arc<DatasetService>,
        job_service: Arc<JobService>,
        analysis_service: Arc<AnalysisService>,
    ) -> Self {
        Self { user_service, session_service, dataset_service, job_service, analysis_service }
    }

    pub async fn debug_overview(&self) -> ApiResult<DebugOverview> {
        let counts = RowCounts {
            users: self.user_service.count().await?,
            sessions: self.session_service.count().await?,
            datasets: self.dataset_service.count().await?,
            analysis_jobs: self.job_service.count().await?,
        };
        let latest_jobs = self.job_service.latest(RECENT_JOBS).await?;

        Ok(DebugOverview { counts, latest_jobs, cache: self.analysis_service.cache_stats() })
    }
}
