//! Flattening of cached analysis results into CSV or XLSX downloads

use rust_xlsxwriter::Workbook;
use std::str::FromStr;
use std::sync::Arc;

use crate::models::{AnalysisJob, AnalysisKind, HistogramResponse, ParetoResponse, TimeSeriesResponse};
use crate::services::JobService;
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(ApiError::invalid_data(format!("Unsupported export format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportValue {
    Text(String),
    Number(f64),
    Empty,
}

impl ExportValue {
    fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Empty => String::new(),
        }
    }
}

impl From<Option<f64>> for ExportValue {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::Number).unwrap_or(Self::Empty)
    }
}

/// Tabular form of a result: header row plus data rows
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<ExportValue>>,
}

pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct ExportService {
    job_service: Arc<JobService>,
}

impl ExportService {
    pub fn new(job_service: Arc<JobService>) -> Self {
        Self { job_service }
    }

    pub async fn export(&self, job_id: i64, format: ExportFormat) -> ApiResult<ExportFile> {
        let job = self.job_service.get(job_id).await?;
        let table = flatten(&job)?;

        let bytes = match format {
            ExportFormat::Csv => to_csv(&table)?,
            ExportFormat::Xlsx => to_xlsx(&table)?,
        };

        tracing::info!("Exported job {} as {} ({} rows)", job_id, format.extension(), table.rows.len());

        Ok(ExportFile {
            file_name: format!("job_{}.{}", job_id, format.extension()),
            content_type: format.content_type(),
            bytes,
        })
    }
}

pub fn flatten(job: &AnalysisJob) -> ApiResult<ExportTable> {
    let kind = job
        .analysis_kind()
        .ok_or_else(|| ApiError::invalid_data(format!("Unsupported analysis type: {}", job.kind)))?;

    let table = match kind {
        AnalysisKind::TimeSeries => {
            let result: TimeSeriesResponse = serde_json::from_str(&job.result_json)?;
            let mut headers = vec!["timestamp".to_string()];
            headers.extend(result.series.iter().map(|s| s.name.clone()));

            let rows = result
                .timestamp
                .iter()
                .enumerate()
                .map(|(i, ts)| {
                    let mut row = vec![ExportValue::Text(ts.clone())];
                    row.extend(result.series.iter().map(|s| ExportValue::from(s.values.get(i).copied())));
                    row
                })
                .collect();
            ExportTable { headers, rows }
        },
        AnalysisKind::Pareto => {
            let result: ParetoResponse = serde_json::from_str(&job.result_json)?;
            let headers = ["category", "value", "percentage", "cumulative", "display_name"]
                .map(String::from)
                .to_vec();
            let rows = result
                .data
                .into_iter()
                .map(|item| {
                    vec![
                        ExportValue::Text(item.category),
                        ExportValue::Number(item.value),
                        item.metadata.percentage.into(),
                        item.metadata.cumulative.into(),
                        item.metadata.display_name.map(ExportValue::Text).unwrap_or(ExportValue::Empty),
                    ]
                })
                .collect();
            ExportTable { headers, rows }
        },
        AnalysisKind::Histogram => {
            let result: HistogramResponse = serde_json::from_str(&job.result_json)?;
            let headers = ["bin_start", "bin_end", "count"].map(String::from).to_vec();
            let rows = result
                .bins
                .windows(2)
                .zip(&result.counts)
                .map(|(edge, count)| {
                    vec![ExportValue::Number(edge[0]), ExportValue::Number(edge[1]), ExportValue::Number(*count as f64)]
                })
                .collect();
            ExportTable { headers, rows }
        },
    };

    Ok(table)
}

pub fn to_csv(table: &ExportTable) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .map_err(|e| ApiError::internal_error(format!("CSV export failed: {}", e)))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(ExportValue::render))
            .map_err(|e| ApiError::internal_error(format!("CSV export failed: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| ApiError::internal_error(format!("CSV export failed: {}", e)))
}

pub fn to_xlsx(table: &ExportTable) -> ApiResult<Vec<u8>> {
    let xlsx_err = |e: rust_xlsxwriter::XlsxError| ApiError::internal_error(format!("XLSX export failed: {}", e));

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in table.headers.iter().enumerate() {
        sheet.write_string(0, col as u16, header).map_err(xlsx_err)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let col = col as u16;
            match value {
                ExportValue::Text(s) => {
                    sheet.write_string(r, col, s).map_err(xlsx_err)?;
                },
                ExportValue::Number(n) => {
                    sheet.write_number(r, col, *n).map_err(xlsx_err)?;
                },
                ExportValue::Empty => {},
            }
        }
    }
    workbook.save_to_buffer().map_err(xlsx_err)
}
