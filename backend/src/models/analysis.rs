use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

// ============================================================================
// Analysis kinds and cache entries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    TimeSeries,
    Pareto,
    Histogram,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "timeseries",
            Self::Pareto => "pareto",
            Self::Histogram => "histogram",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "timeseries" => Ok(Self::TimeSeries),
            "pareto" => Ok(Self::Pareto),
            "histogram" => Ok(Self::Histogram),
            other => Err(format!("unknown analysis type: {}", other)),
        }
    }
}

/// Memoized analysis result (`analysis_jobs` row)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AnalysisJob {
    pub id: i64,
    pub session_id: i64,
    pub dataset_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub params_json: String,
    pub result_json: String,
    pub created_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn analysis_kind(&self) -> Option<AnalysisKind> {
        self.kind.parse().ok()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobSummary {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Time series
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Flat,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TimeSeriesRequest {
    pub session_id: i64,
    pub dataset_id: Option<i64>,
    pub store: Option<String>,
    pub target_column: String,
    #[serde(default)]
    pub aggregation: Aggregation,
    /// `[start, end]` as YYYY-MM-DD; an empty or null bound is open
    pub date_range: Option<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeSeriesStatistics {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeSeriesSeries {
    pub name: String,
    pub values: Vec<f64>,
    pub statistics: Option<TimeSeriesStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeSeriesResponse {
    pub timestamp: Vec<String>,
    pub series: Vec<TimeSeriesSeries>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub events: Option<Vec<serde_json::Value>>,
}

// ============================================================================
// Pareto
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParetoAnalysisType {
    #[default]
    ProductCategory,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ParetoRequest {
    pub session_id: i64,
    pub dataset_id: Option<i64>,
    pub store: Option<String>,
    #[serde(default, alias = "analysis_kind")]
    pub analysis_type: ParetoAnalysisType,
    /// Month filter, `YYYY-MM`
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParetoItemMetadata {
    pub display_name: Option<String>,
    pub percentage: Option<f64>,
    pub cumulative: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParetoItem {
    pub category: String,
    pub value: f64,
    #[serde(default)]
    pub metadata: ParetoItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParetoResponse {
    pub data: Vec<ParetoItem>,
    pub total: f64,
    pub vital_few_threshold: usize,
}

// ============================================================================
// Histogram
// ============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HistogramRequest {
    pub session_id: i64,
    pub dataset_id: Option<i64>,
    pub column: String,
    /// Bin count; the configured default (20) applies when omitted
    #[serde(alias = "bin_count")]
    pub bins: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistogramFit {
    pub distribution: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistogramSummary {
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistogramResponse {
    pub bins: Vec<f64>,
    pub counts: Vec<u64>,
    pub fit: Option<HistogramFit>,
    pub summary: Option<HistogramSummary>,
}
