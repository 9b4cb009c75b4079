pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

rust_i18n::i18n!("locales", fallback = "en");

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::middleware::{AuthState, auth_middleware, locale_middleware};
use crate::services::analysis::{BinLimits, FileTableLoader};
use crate::services::{
    AnalysisService, DatasetService, EngineContext, ExportService, JobService, OverviewService,
    SessionService, UserService,
};
use crate::utils::JwtUtil;

/// Shared services handed to every handler
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub session_service: Arc<SessionService>,
    pub dataset_service: Arc<DatasetService>,
    pub job_service: Arc<JobService>,
    pub analysis_service: Arc<AnalysisService>,
    pub export_service: Arc<ExportService>,
    pub overview_service: Arc<OverviewService>,
    pub jwt_util: Arc<JwtUtil>,
    pub bin_limits: BinLimits,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let jwt_util = Arc::new(JwtUtil::new(&config.auth.jwt_secret, config.token_ttl_secs()));
        let session_service = Arc::new(SessionService::new(pool.clone()));
        let user_service = Arc::new(UserService::new(
            pool.clone(),
            Arc::clone(&session_service),
            Arc::clone(&jwt_util),
        ));
        let dataset_service = Arc::new(DatasetService::new(
            pool.clone(),
            Arc::clone(&session_service),
            &config.storage.dir,
        ));
        let job_service = Arc::new(JobService::new(pool));

        let analysis_service = Arc::new(AnalysisService::new(
            dataset_service.clone(),
            job_service.clone(),
            Arc::new(FileTableLoader),
            EngineContext {
                candidates: config.analysis.column_candidates(),
                categories: config.analysis.pareto_categories(),
            },
        ));
        let export_service = Arc::new(ExportService::new(Arc::clone(&job_service)));
        let overview_service = Arc::new(OverviewService::new(
            Arc::clone(&user_service),
            Arc::clone(&session_service),
            Arc::clone(&dataset_service),
            Arc::clone(&job_service),
            Arc::clone(&analysis_service),
        ));

        Self {
            user_service,
            session_service,
            dataset_service,
            job_service,
            analysis_service,
            export_service,
            overview_service,
            jwt_util,
            bin_limits: config.analysis.bin_limits(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::admin::health,
        handlers::admin::debug_overview,
        handlers::user::register,
        handlers::user::login,
        handlers::user::me,
        handlers::data::upload,
        handlers::data::list_sessions,
        handlers::data::list_datasets,
        handlers::data::rename_dataset,
        handlers::analysis::timeseries,
        handlers::analysis::pareto,
        handlers::analysis::histogram,
        handlers::export::export_job,
    ),
    components(schemas(
        handlers::admin::HealthResponse,
        handlers::data::UploadForm,
        models::RegisterRequest,
        models::RegisterResponse,
        models::LoginRequest,
        models::LoginResponse,
        models::UserResponse,
        models::Session,
        models::UploadResponse,
        models::DatasetResponse,
        models::RenameDatasetRequest,
        models::RenameDatasetResponse,
        models::AnalysisKind,
        models::JobSummary,
        models::Aggregation,
        models::Trend,
        models::TimeSeriesRequest,
        models::TimeSeriesStatistics,
        models::TimeSeriesSeries,
        models::TimeSeriesResponse,
        models::ParetoAnalysisType,
        models::ParetoRequest,
        models::ParetoItemMetadata,
        models::ParetoItem,
        models::ParetoResponse,
        models::HistogramRequest,
        models::HistogramFit,
        models::HistogramSummary,
        models::HistogramResponse,
        services::DebugOverview,
        services::RowCounts,
        services::CacheStats,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login and token issuing"),
        (name = "Users", description = "User registration and profile"),
        (name = "Data", description = "Dataset upload and management"),
        (name = "Analysis", description = "Cached time series, Pareto and histogram analyses"),
        (name = "Export", description = "Analysis result downloads"),
        (name = "System", description = "Health and diagnostics"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Largest accepted upload body
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// All API routes plus the Swagger UI. CORS and request tracing are layered
/// on by the binary.
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_state = AuthState { jwt_util: Arc::clone(&state.jwt_util) };

    let protected = Router::new()
        .route("/api/v1/users/me", get(handlers::user::me))
        .route("/api/v1/admin/debug/overview", get(handlers::admin::debug_overview))
        .route_layer(axum::middleware::from_fn_with_state(auth_state, auth_middleware));

    let public = Router::new()
        .route("/api/v1/health", get(handlers::admin::health))
        .route("/api/v1/users/register", post(handlers::user::register))
        .route("/api/v1/auth/login", post(handlers::user::login))
        .route("/api/v1/data/upload", post(handlers::data::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
        .route("/api/v1/data/sessions", get(handlers::data::list_sessions))
        .route("/api/v1/data/datasets", get(handlers::data::list_datasets))
        .route("/api/v1/data/datasets/:id", patch(handlers::data::rename_dataset))
        .route("/api/v1/analysis/timeseries", post(handlers::analysis::timeseries))
        .route("/api/v1/analysis/pareto", post(handlers::analysis::pareto))
        .route("/api/v1/analysis/histogram", post(handlers::analysis::histogram))
        .route("/api/v1/export/:job_id", get(handlers::export::export_job));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(locale_middleware))
}
