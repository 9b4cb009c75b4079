pub mod analysis;
pub mod dataset_service;
pub mod export_service;
pub mod job_service;
pub mod overview_service;
pub mod session_service;
pub mod user_service;

pub use analysis::{AnalysisOutcome, AnalysisService, CacheStats, EngineContext};
pub use dataset_service::{DatasetService, UploadFile};
pub use export_service::{ExportFormat, ExportService};
pub use job_service::JobService;
pub use overview_service::{DebugOverview, OverviewService, RowCounts};
pub use session_service::SessionService;
pub use user_service::UserService;
