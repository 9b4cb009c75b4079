//! Pareto ranking over wide-format product category columns

use serde::Serialize;
use serde_json::{Map, Value};

use super::columns::{ColumnCandidates, detect};
use super::filters::{self, Row};
use super::table::{Table, parse_year_month};
use super::{Analysis, EngineContext, to_param_map};
use crate::models::{
    AnalysisKind, ParetoAnalysisType, ParetoItem, ParetoItemMetadata, ParetoRequest, ParetoResponse,
};
use crate::utils::{ApiError, ApiResult};

/// Cumulative percentage at which the "vital few" end
pub const VITAL_FEW_CUTOFF: f64 = 80.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ParetoCategory {
    pub column: String,
    pub display_name: Option<String>,
}

/// Ordered category columns with optional human-readable labels
#[derive(Debug, Clone, PartialEq)]
pub struct ParetoCategories(Vec<ParetoCategory>);

impl ParetoCategories {
    pub fn new(categories: Vec<ParetoCategory>) -> Self {
        Self(categories)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParetoCategory> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label for `column`, falling back to the column name itself
    pub fn display_name_for(&self, column: &str) -> String {
        self.0
            .iter()
            .find(|c| c.column == column)
            .and_then(|c| c.display_name.clone())
            .unwrap_or_else(|| column.to_string())
    }
}

impl Default for ParetoCategories {
    fn default() -> Self {
        let labelled = [
            ("Mens_JACKETS&OUTER2", "メンズ ジャケット・アウター"),
            ("Mens_KNIT", "メンズ ニット"),
            ("Mens_PANTS", "メンズ パンツ"),
            ("WOMEN'S_JACKETS2", "レディース ジャケット"),
            ("WOMEN'S_TOPS", "レディース トップス"),
            ("WOMEN'S_ONEPIECE", "レディース ワンピース"),
            ("WOMEN'S_bottoms", "レディース ボトムス"),
            ("WOMEN'S_SCARF & STOLES", "レディース スカーフ・ストール"),
        ];
        Self(
            labelled
                .into_iter()
                .map(|(column, label)| ParetoCategory {
                    column: column.to_string(),
                    display_name: Some(label.to_string()),
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoParams {
    pub store: Option<String>,
    pub analysis_type: ParetoAnalysisType,
    pub period: Option<String>,
}

impl From<&ParetoRequest> for ParetoParams {
    fn from(req: &ParetoRequest) -> Self {
        Self {
            store: req.store.clone(),
            analysis_type: req.analysis_type,
            period: req.period.clone(),
        }
    }
}

impl Analysis for ParetoParams {
    type Output = ParetoResponse;
    const KIND: AnalysisKind = AnalysisKind::Pareto;

    fn params(&self) -> Map<String, Value> {
        to_param_map(self)
    }

    fn compute(&self, table: &Table, ctx: &EngineContext) -> ApiResult<ParetoResponse> {
        rank(table, &ctx.candidates, &ctx.categories, self)
    }
}

pub fn rank(
    table: &Table,
    candidates: &ColumnCandidates,
    categories: &ParetoCategories,
    params: &ParetoParams,
) -> ApiResult<ParetoResponse> {
    let detected = detect(table, candidates);
    let mut rows: Vec<Row> = table.rows().iter().map(Vec::as_slice).collect();

    // Period filtering needs a date column; without one the period is ignored
    if let Some(period) = params.period.as_deref().filter(|p| !p.trim().is_empty())
        && let Some(date_idx) = detected.date_index(table)
    {
        let mut dated = filters::with_dates(rows, date_idx);
        if let Some(month) = parse_year_month(period) {
            dated = filters::by_month(dated, month);
        } else {
            tracing::warn!("Ignoring unparseable Pareto period '{}'", period);
        }
        rows = dated.into_iter().map(|(_, row)| row).collect();
    }

    let rows = filters::by_store(rows, detected.store_index(table), params.store.as_deref());

    let present: Vec<(&ParetoCategory, usize)> = categories
        .iter()
        .filter_map(|c| table.column_index(&c.column).map(|idx| (c, idx)))
        .collect();
    if present.is_empty() {
        return Err(ApiError::NoCategoryColumns);
    }

    let mut sums: Vec<(&ParetoCategory, f64)> = present
        .into_iter()
        .map(|(category, idx)| {
            let sum = rows.iter().filter_map(|row| row[idx].as_f64()).sum::<f64>();
            (category, sum)
        })
        .collect();
    // Stable: ties keep configured order
    sums.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total: f64 = sums.iter().map(|(_, v)| v).sum();
    let mut cumulative = 0.0;
    let data: Vec<ParetoItem> = sums
        .into_iter()
        .map(|(category, value)| {
            let percentage = if total == 0.0 { 0.0 } else { value * 100.0 / total };
            cumulative += percentage;
            ParetoItem {
                category: category.column.clone(),
                value,
                metadata: ParetoItemMetadata {
                    display_name: Some(categories.display_name_for(&category.column)),
                    percentage: Some(percentage),
                    cumulative: Some(cumulative),
                },
            }
        })
        .collect();

    let vital_few_threshold = vital_few_threshold(&data);
    tracing::debug!(
        "Pareto over {} rows: {} categories, total={}, vital_few={}",
        rows.len(),
        data.len(),
        total,
        vital_few_threshold
    );

    Ok(ParetoResponse { data, total, vital_few_threshold })
}

/// One past the index of the first item reaching the cutoff (last item if none does)
pub fn vital_few_threshold(items: &[ParetoItem]) -> usize {
    items
        .iter()
        .position(|item| item.metadata.cumulative.unwrap_or(0.0) >= VITAL_FEW_CUTOFF)
        .unwrap_or(items.len().saturating_sub(1))
        + 1
}
