//! Uniform-bin histogram of a numeric column

use serde::Serialize;
use serde_json::{Map, Value};

use super::table::Table;
use super::{Analysis, EngineContext, to_param_map};
use crate::models::{AnalysisKind, HistogramFit, HistogramRequest, HistogramResponse, HistogramSummary};
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramParams {
    pub column: String,
    /// Effective bin count after applying the configured default
    pub bins: usize,
}

/// Bin count used when a request omits `bins`, and the largest count accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinLimits {
    pub default: usize,
    pub max: usize,
}

impl Default for BinLimits {
    fn default() -> Self {
        Self { default: 20, max: 1000 }
    }
}

impl HistogramParams {
    pub fn from_request(req: &HistogramRequest, limits: BinLimits) -> ApiResult<Self> {
        let bins = req.bins.unwrap_or(limits.default);
        if bins == 0 {
            return Err(ApiError::invalid_data("bins must be at least 1"));
        }
        if bins > limits.max {
            return Err(ApiError::invalid_data(format!("bins must be at most {}", limits.max)));
        }
        Ok(Self { column: req.column.clone(), bins })
    }
}

impl Analysis for HistogramParams {
    type Output = HistogramResponse;
    const KIND: AnalysisKind = AnalysisKind::Histogram;

    fn params(&self) -> Map<String, Value> {
        to_param_map(self)
    }

    fn compute(&self, table: &Table, _ctx: &EngineContext) -> ApiResult<HistogramResponse> {
        histogram(table, &self.column, self.bins)
    }
}

pub fn histogram(table: &Table, column: &str, bins: usize) -> ApiResult<HistogramResponse> {
    if bins == 0 {
        return Err(ApiError::invalid_data("bins must be at least 1"));
    }
    let idx = table
        .column_index(column)
        .ok_or_else(|| ApiError::column_not_found(column))?;

    let values: Vec<f64> = table.rows().iter().filter_map(|row| row[idx].as_f64()).collect();
    let (edges, counts) = bin_values(&values, bins);

    tracing::debug!("Histogram of '{}': {} values in {} bins", column, values.len(), bins);

    Ok(HistogramResponse {
        bins: edges,
        counts,
        fit: Some(HistogramFit::default()),
        summary: Some(HistogramSummary { count: values.len() }),
    })
}

/// Range covered by the bins: the data extent, widened on each side when
/// degenerate, and `[0, 1]` with no data.
fn bin_range(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min != max {
        return (min, max);
    }
    // 0.5 vanishes below one ulp at large magnitudes
    let pad = 0.5_f64.max(min.abs() * f64::EPSILON);
    ((min - pad).max(f64::MIN), (max + pad).min(f64::MAX))
}

/// `n + 1` evenly spaced edges and per-bin counts. Bins are half-open except
/// the last, which also holds the maximum. No intermediate exceeds the
/// magnitude of the range bounds, so finite input always yields finite edges.
pub fn bin_values(values: &[f64], n: usize) -> (Vec<f64>, Vec<u64>) {
    let (first, last) = bin_range(values);
    let mut edges: Vec<f64> = (0..=n)
        .map(|i| {
            let t = i as f64 / n as f64;
            (first * (1.0 - t) + last * t).clamp(first, last)
        })
        .collect();
    edges[n] = last;

    let half_span = last / 2.0 - first / 2.0;
    let mut counts = vec![0u64; n];
    for &x in values {
        let frac = (x / 2.0 - first / 2.0) / half_span;
        let mut idx = ((frac * n as f64) as usize).min(n - 1);
        // Float rounding can put a value one bin off its edges
        if idx > 0 && x < edges[idx] {
            idx -= 1;
        } else if idx != n - 1 && x >= edges[idx + 1] {
            idx += 1;
        }
        counts[idx] += 1;
    }

    (edges, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analysis::table::Cell;

    fn column(values: &[&str]) -> Table {
        Table::new(vec!["price".to_string()], values.iter().map(|v| vec![Cell::infer(v)]).collect())
    }

    #[test]
    fn test_maximum_lands_in_last_bin() {
        let (edges, counts) = bin_values(&[1.0, 2.0, 3.0, 4.0, 5.0], 4);
        assert_eq!(edges, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(counts, vec![1, 1, 1, 2]);
    }

    #[test]
    fn test_counts_sum_to_values() {
        let values: Vec<f64> = (0..97).map(|i| (i as f64 * 0.37).sin() * 10.0).collect();
        for n in [1, 3, 7, 20] {
            let (edges, counts) = bin_values(&values, n);
            assert_eq!(edges.len(), n + 1);
            assert_eq!(counts.iter().sum::<u64>(), values.len() as u64);
            assert!(edges.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_constant_values_widen_range() {
        let (edges, counts) = bin_values(&[3.0, 3.0], 2);
        assert_eq!(edges, vec![2.5, 3.0, 3.5]);
        assert_eq!(counts, vec![0, 2]);
    }

    #[test]
    fn test_empty_column() {
        let resp = histogram(&column(&["", "n/a"]), "price", 4).unwrap();
        assert_eq!(resp.bins, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(resp.counts, vec![0, 0, 0, 0]);
        assert_eq!(resp.summary, Some(HistogramSummary { count: 0 }));
    }

    #[test]
    fn test_non_numeric_cells_skipped() {
        let resp = histogram(&column(&["10", "abc", "20", ""]), "price", 2).unwrap();
        assert_eq!(resp.counts, vec![1, 1]);
        assert_eq!(resp.summary.unwrap().count, 2);
        assert_eq!(resp.fit, Some(HistogramFit::default()));
    }

    #[test]
    fn test_errors() {
        let t = column(&["1"]);
        assert!(matches!(histogram(&t, "cost", 10), Err(ApiError::ColumnNotFound { .. })));
        assert!(matches!(histogram(&t, "price", 0), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_bin_count_bounded_by_limits() {
        let limits = BinLimits { default: 20, max: 100 };
        let request = |bins: usize| -> HistogramRequest {
            serde_json::from_value(serde_json::json!({"session_id": 1, "column": "price", "bins": bins})).unwrap()
        };

        assert_eq!(HistogramParams::from_request(&request(100), limits).unwrap().bins, 100);
        assert!(matches!(
            HistogramParams::from_request(&request(101), limits),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            HistogramParams::from_request(&request(1 << 42), limits),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            HistogramParams::from_request(&request(0), limits),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_extreme_range_stays_finite() {
        let resp = histogram(&column(&["-1e308", "1e308"]), "price", 2).unwrap();
        assert_eq!(resp.bins, vec![-1e308, 0.0, 1e308]);
        assert_eq!(resp.counts, vec![1, 1]);

        let json = serde_json::to_string(&resp).unwrap();
        let reparsed: HistogramResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, resp);

        let resp = histogram(&column(&["1e308", "1e308"]), "price", 3).unwrap();
        assert!(resp.bins.iter().all(|e| e.is_finite()));
        assert!(resp.bins.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(resp.counts.iter().sum::<u64>(), 2);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(serde_json::from_str::<HistogramResponse>(&json).is_ok());
    }

    #[test]
    fn test_default_bins_are_part_of_params() {
        let req: HistogramRequest = serde_json::from_str(r#"{"session_id":1,"column":"price"}"#).unwrap();
        let params = HistogramParams::from_request(&req, BinLimits::default()).unwrap();
        assert_eq!(params.bins, 20);
        assert_eq!(params.params()["bins"], serde_json::json!(20));
    }
}
