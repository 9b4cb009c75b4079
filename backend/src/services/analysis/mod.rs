//! Analysis engines and the result cache in front of them
//!
//! A request resolves its dataset, is reduced to a fingerprint and looked up
//! in the job store. Hits return the stored payload; misses load the table,
//! run the engine on the blocking pool and record the result.

pub mod columns;
pub mod filters;
pub mod fingerprint;
pub mod histogram;
pub mod pareto;
pub mod table;
pub mod timeseries;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use columns::{ColumnCandidates, DetectedColumns, detect, detect_column};
pub use fingerprint::fingerprint;
pub use histogram::{BinLimits, HistogramParams};
pub use pareto::{ParetoCategories, ParetoCategory, ParetoParams};
pub use table::{Cell, FileTableLoader, Table, TableLoader};
pub use timeseries::TimeSeriesParams;

use crate::models::{AnalysisJob, AnalysisKind, DatasetHandle};
use crate::utils::{ApiError, ApiResult};

/// Configuration the engines read at compute time
#[derive(Debug, Clone, Default)]
pub struct EngineContext {
    pub candidates: ColumnCandidates,
    pub categories: ParetoCategories,
}

/// One analysis request: its cacheable parameters and the engine that serves it
pub trait Analysis: Send + Sync + 'static {
    type Output: Serialize + DeserializeOwned + Send + 'static;
    const KIND: AnalysisKind;

    /// Parameters as a JSON object; fingerprinting picks its fields from here
    fn params(&self) -> Map<String, Value>;

    fn compute(&self, table: &Table, ctx: &EngineContext) -> ApiResult<Self::Output>;
}

pub(crate) fn to_param_map<T: Serialize>(params: &T) -> Map<String, Value> {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

// ============================================================================
// Collaborators
// ============================================================================

#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Resolve `dataset_id` within the session, or the session's latest
    /// dataset when no id is given.
    async fn resolve(&self, session_id: i64, dataset_id: Option<i64>) -> ApiResult<Option<DatasetHandle>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub session_id: i64,
    pub dataset_id: i64,
    pub kind: AnalysisKind,
    pub fingerprint: String,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Most recently created job matching `key`
    async fn lookup(&self, key: &JobKey) -> ApiResult<Option<AnalysisJob>>;

    async fn store(&self, key: &JobKey, result_json: &str) -> ApiResult<AnalysisJob>;
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnalysisOutcome<T> {
    /// Id of the job row holding this result; `None` when persisting failed
    pub job_id: Option<i64>,
    pub cached: bool,
    pub result: T,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct AnalysisService {
    datasets: Arc<dyn DatasetStore>,
    jobs: Arc<dyn JobStore>,
    loader: Arc<dyn TableLoader>,
    context: Arc<EngineContext>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisService {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        jobs: Arc<dyn JobStore>,
        loader: Arc<dyn TableLoader>,
        context: EngineContext,
    ) -> Self {
        Self {
            datasets,
            jobs,
            loader,
            context: Arc::new(context),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub async fn run<A: Analysis>(
        &self,
        session_id: i64,
        dataset_id: Option<i64>,
        analysis: A,
    ) -> ApiResult<AnalysisOutcome<A::Output>> {
        let dataset = self
            .datasets
            .resolve(session_id, dataset_id)
            .await?
            .ok_or(ApiError::DatasetNotFound)?;

        let key = JobKey {
            session_id,
            dataset_id: dataset.id,
            kind: A::KIND,
            fingerprint: fingerprint(A::KIND, &analysis.params()),
        };

        if let Some(job) = self.jobs.lookup(&key).await? {
            match serde_json::from_str::<A::Output>(&job.result_json) {
                Ok(result) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        "Cache hit: {} job {} (session={}, dataset={})",
                        A::KIND,
                        job.id,
                        session_id,
                        dataset.id
                    );
                    return Ok(AnalysisOutcome { job_id: Some(job.id), cached: true, result });
                },
                Err(e) => {
                    tracing::warn!("Discarding unreadable cached {} job {}: {}", A::KIND, job.id, e);
                },
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Cache miss: {} {} (session={}, dataset={})",
            A::KIND,
            key.fingerprint,
            session_id,
            dataset.id
        );

        let loader = Arc::clone(&self.loader);
        let context = Arc::clone(&self.context);
        let result = tokio::task::spawn_blocking(move || {
            let table = loader.load(&dataset)?;
            analysis.compute(&table, &context)
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Analysis task failed: {}", e)))??;

        let job_id = match serde_json::to_string(&result) {
            Ok(json) => match self.jobs.store(&key, &json).await {
                Ok(job) => Some(job.id),
                Err(e) => {
                    tracing::warn!("Failed to store {} result: {}", A::KIND, e);
                    None
                },
            },
            Err(e) => {
                tracing::warn!("Failed to serialize {} result: {}", A::KIND, e);
                None
            },
        };

        Ok(AnalysisOutcome { job_id, cached: false, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct FixedDataset(Option<DatasetHandle>);

    #[async_trait]
    impl DatasetStore for FixedDataset {
        async fn resolve(&self, _session_id: i64, _dataset_id: Option<i64>) -> ApiResult<Option<DatasetHandle>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct MemoryJobs {
        rows: Mutex<Vec<(JobKey, AnalysisJob)>>,
        fail_store: bool,
    }

    #[async_trait]
    impl JobStore for MemoryJobs {
        async fn lookup(&self, key: &JobKey) -> ApiResult<Option<AnalysisJob>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().rev().find(|(k, _)| k == key).map(|(_, job)| job.clone()))
        }

        async fn store(&self, key: &JobKey, result_json: &str) -> ApiResult<AnalysisJob> {
            if self.fail_store {
                return Err(ApiError::internal_error("disk full"));
            }
            let mut rows = self.rows.lock().unwrap();
            let job = AnalysisJob {
                id: rows.len() as i64 + 1,
                session_id: key.session_id,
                dataset_id: key.dataset_id,
                kind: key.kind.to_string(),
                params_json: key.fingerprint.clone(),
                result_json: result_json.to_string(),
                created_at: Utc::now(),
            };
            rows.push((key.clone(), job.clone()));
            Ok(job)
        }
    }

    /// Serves a fixed table and counts how often it is asked to
    struct CountingLoader {
        table: Table,
        loads: AtomicUsize,
    }

    impl TableLoader for CountingLoader {
        fn load(&self, _dataset: &DatasetHandle) -> ApiResult<Table> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.table.clone())
        }
    }

    fn handle() -> DatasetHandle {
        DatasetHandle {
            id: 1,
            session_id: 1,
            storage_path: PathBuf::from("unused.csv"),
            column_names: vec![],
            sheet_name: None,
        }
    }

    fn price_table() -> Table {
        Table::new(
            vec!["price".to_string()],
            ["1", "2", "3", "4"].iter().map(|v| vec![Cell::infer(v)]).collect(),
        )
    }

    fn service(jobs: Arc<MemoryJobs>, loader: Arc<CountingLoader>) -> AnalysisService {
        AnalysisService::new(
            Arc::new(FixedDataset(Some(handle()))),
            jobs,
            loader,
            EngineContext::default(),
        )
    }

    fn hist(bins: usize) -> HistogramParams {
        HistogramParams { column: "price".to_string(), bins }
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let jobs = Arc::new(MemoryJobs::default());
        let loader = Arc::new(CountingLoader { table: price_table(), loads: AtomicUsize::new(0) });
        let svc = service(jobs.clone(), loader.clone());

        let first = svc.run(1, None, hist(2)).await.unwrap();
        let second = svc.run(1, None, hist(2)).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.result, second.result);
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(svc.cache_stats(), CacheStats { hits: 1, misses: 1 });

        // Different parameters miss
        svc.run(1, None, hist(3)).await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(jobs.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_still_returns_result() {
        let jobs = Arc::new(MemoryJobs { fail_store: true, ..Default::default() });
        let loader = Arc::new(CountingLoader { table: price_table(), loads: AtomicUsize::new(0) });
        let svc = service(jobs, loader.clone());

        let outcome = svc.run(1, None, hist(2)).await.unwrap();
        assert!(!outcome.cached);
        assert!(outcome.job_id.is_none());
        assert_eq!(outcome.result.counts, vec![2, 2]);

        svc.run(1, None, hist(2)).await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_recomputed() {
        let jobs = Arc::new(MemoryJobs::default());
        let key = JobKey {
            session_id: 1,
            dataset_id: 1,
            kind: AnalysisKind::Histogram,
            fingerprint: fingerprint(AnalysisKind::Histogram, &hist(2).params()),
        };
        jobs.store(&key, "{\"legacy\":true}").await.unwrap();

        let loader = Arc::new(CountingLoader { table: price_table(), loads: AtomicUsize::new(0) });
        let svc = service(jobs.clone(), loader.clone());

        let outcome = svc.run(1, None, hist(2)).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(outcome.job_id, Some(2));

        // The fresh row now shadows the unreadable one
        assert!(svc.run(1, None, hist(2)).await.unwrap().cached);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_dataset_and_engine_errors_are_not_cached() {
        let svc = AnalysisService::new(
            Arc::new(FixedDataset(None)),
            Arc::new(MemoryJobs::default()),
            Arc::new(CountingLoader { table: price_table(), loads: AtomicUsize::new(0) }),
            EngineContext::default(),
        );
        assert!(matches!(svc.run(1, None, hist(2)).await, Err(ApiError::DatasetNotFound)));

        let jobs = Arc::new(MemoryJobs::default());
        let svc = service(
            jobs.clone(),
            Arc::new(CountingLoader { table: price_table(), loads: AtomicUsize::new(0) }),
        );
        let missing = HistogramParams { column: "cost".to_string(), bins: 2 };
        assert!(matches!(svc.run(1, None, missing).await, Err(ApiError::ColumnNotFound { .. })));
        assert!(jobs.rows.lock().unwrap().is_empty());
    }
}
