//! Time-series aggregation
//!
//! Rows are filtered by store and date range, bucketed into calendar
//! periods and summed. Buckets without rows are omitted, not zero-filled.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::columns::{ColumnCandidates, detect};
use super::filters::{self, Row};
use super::table::{Table, parse_datetime};
use super::{Analysis, EngineContext, to_param_map};
use crate::models::{
    Aggregation, AnalysisKind, TimeSeriesRequest, TimeSeriesResponse, TimeSeriesSeries,
    TimeSeriesStatistics, Trend,
};
use crate::utils::{ApiError, ApiResult};

/// Relative change over the trend window that counts as a trend
const TREND_TOLERANCE: f64 = 0.05;
const TREND_WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesParams {
    pub store: Option<String>,
    pub target_column: String,
    pub aggregation: Aggregation,
    pub date_range: Option<Vec<Option<String>>>,
}

impl From<&TimeSeriesRequest> for TimeSeriesParams {
    fn from(req: &TimeSeriesRequest) -> Self {
        Self {
            store: req.store.clone(),
            target_column: req.target_column.clone(),
            aggregation: req.aggregation,
            date_range: req.date_range.clone(),
        }
    }
}

impl TimeSeriesParams {
    /// Parsed `[start, end]` bounds. Only a two-element range applies; empty
    /// or null bounds are open. An unparseable bound is a request error.
    fn bounds(&self) -> ApiResult<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        let Some(range) = self.date_range.as_ref().filter(|r| r.len() == 2) else {
            return Ok((None, None));
        };

        let parse = |bound: &Option<String>| -> ApiResult<Option<NaiveDateTime>> {
            match bound.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                None => Ok(None),
                Some(raw) => parse_datetime(raw)
                    .map(Some)
                    .ok_or_else(|| ApiError::invalid_data(format!("Invalid date_range bound: {}", raw))),
            }
        };

        Ok((parse(&range[0])?, parse(&range[1])?))
    }
}

impl Analysis for TimeSeriesParams {
    type Output = TimeSeriesResponse;
    const KIND: AnalysisKind = AnalysisKind::TimeSeries;

    fn params(&self) -> Map<String, Value> {
        to_param_map(self)
    }

    fn compute(&self, table: &Table, ctx: &EngineContext) -> ApiResult<TimeSeriesResponse> {
        aggregate(table, &ctx.candidates, self)
    }
}

/// First day of the bucket containing `date`
pub fn bucket_start(date: NaiveDate, aggregation: Aggregation) -> NaiveDate {
    match aggregation {
        Aggregation::Daily => date,
        Aggregation::Weekly => date
            .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
            .unwrap_or(date),
        Aggregation::Monthly => date.with_day(1).unwrap_or(date),
    }
}

pub fn aggregate(
    table: &Table,
    candidates: &ColumnCandidates,
    params: &TimeSeriesParams,
) -> ApiResult<TimeSeriesResponse> {
    let detected = detect(table, candidates);
    let date_idx = detected
        .date_index(table)
        .ok_or_else(|| ApiError::column_not_found(candidates.date.join(" / ")))?;
    let target_idx = table
        .column_index(&params.target_column)
        .ok_or_else(|| ApiError::column_not_found(params.target_column.clone()))?;
    let (start, end) = params.bounds()?;

    let rows: Vec<Row> = table.rows().iter().map(Vec::as_slice).collect();
    let rows = filters::by_store(rows, detected.store_index(table), params.store.as_deref());
    let mut dated = filters::by_date_range(filters::with_dates(rows, date_idx), start, end);
    dated.sort_by_key(|(dt, _)| *dt);

    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (dt, row) in &dated {
        let sum = buckets.entry(bucket_start(dt.date(), params.aggregation)).or_insert(0.0);
        if let Some(value) = row[target_idx].as_f64() {
            *sum += value;
        }
    }

    let timestamp: Vec<String> = buckets.keys().map(|d| d.format("%Y-%m-%d").to_string()).collect();
    let values: Vec<f64> = buckets.into_values().collect();
    let statistics = summarize(&values);

    tracing::debug!(
        "Aggregated {} rows into {} {:?} buckets for '{}'",
        dated.len(),
        values.len(),
        params.aggregation,
        params.target_column
    );

    Ok(TimeSeriesResponse {
        timestamp,
        series: vec![TimeSeriesSeries {
            name: params.target_column.clone(),
            values,
            statistics: Some(statistics),
        }],
        events: Some(Vec::new()),
    })
}

/// Population statistics and trend; all null below two buckets
pub fn summarize(values: &[f64]) -> TimeSeriesStatistics {
    if values.len() < 2 {
        return TimeSeriesStatistics {
            mean: None,
            std: None,
            min: None,
            max: None,
            trend: Some(Trend::Flat),
        };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let w = TREND_WINDOW.min(values.len());
    let start_avg = values[..w].iter().sum::<f64>() / w as f64;
    let end_avg = values[values.len() - w..].iter().sum::<f64>() / w as f64;

    TimeSeriesStatistics {
        mean: Some(mean),
        std: Some(variance.sqrt()),
        min: Some(min),
        max: Some(max),
        trend: Some(classify_trend(start_avg, end_avg)),
    }
}

pub fn classify_trend(start_avg: f64, end_avg: f64) -> Trend {
    if end_avg > start_avg * (1.0 + TREND_TOLERANCE) {
        Trend::Increasing
    } else if end_avg < start_avg * (1.0 - TREND_TOLERANCE) {
        Trend::Decreasing
    } else {
        Trend::Flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analysis::table::Cell;

    fn table(rows: &[(&str, &str, &str)]) -> Table {
        Table::new(
            vec!["Date".to_string(), "shop".to_string(), "target".to_string()],
            rows.iter()
                .map(|(d, s, v)| vec![Cell::infer(d), Cell::infer(s), Cell::infer(v)])
                .collect(),
        )
    }

    fn params(aggregation: Aggregation) -> TimeSeriesParams {
        TimeSeriesParams {
            store: None,
            target_column: "target".to_string(),
            aggregation,
            date_range: None,
        }
    }

    fn run(table: &Table, params: &TimeSeriesParams) -> ApiResult<TimeSeriesResponse> {
        aggregate(table, &ColumnCandidates::default(), params)
    }

    #[test]
    fn test_trend_window_of_three() {
        // end window (100, 100, 106) averages 102: within 5% of the start window
        assert_eq!(summarize(&[100.0, 100.0, 100.0, 106.0]).trend, Some(Trend::Flat));
        assert_eq!(summarize(&[100.0, 100.0, 100.0, 100.0]).trend, Some(Trend::Flat));
        assert_eq!(summarize(&[100.0, 100.0, 100.0, 120.0]).trend, Some(Trend::Increasing));
        assert_eq!(summarize(&[100.0, 100.0, 100.0, 80.0]).trend, Some(Trend::Decreasing));
    }

    #[test]
    fn test_trend_with_short_series_uses_whole_series() {
        // w = 2: start and end windows coincide
        assert_eq!(summarize(&[100.0, 106.0]).trend, Some(Trend::Flat));
    }

    #[test]
    fn test_classify_trend_boundaries() {
        assert_eq!(classify_trend(100.0, 106.0), Trend::Increasing);
        assert_eq!(classify_trend(100.0, 93.0), Trend::Decreasing);
        assert_eq!(classify_trend(100.0, 104.0), Trend::Flat);
        assert_eq!(classify_trend(100.0, 96.0), Trend::Flat);
    }

    #[test]
    fn test_population_statistics() {
        let stats = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.mean, Some(5.0));
        assert_eq!(stats.std, Some(2.0));
        assert_eq!(stats.min, Some(2.0));
        assert_eq!(stats.max, Some(9.0));
    }

    #[test]
    fn test_single_bucket_has_null_statistics() {
        let stats = summarize(&[42.0]);
        assert!(stats.mean.is_none() && stats.std.is_none() && stats.min.is_none() && stats.max.is_none());
        assert_eq!(stats.trend, Some(Trend::Flat));
        assert_eq!(summarize(&[]).trend, Some(Trend::Flat));
    }

    #[test]
    fn test_bucket_start() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(); // Thursday
        assert_eq!(bucket_start(d, Aggregation::Daily), d);
        assert_eq!(bucket_start(d, Aggregation::Weekly), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(bucket_start(d, Aggregation::Monthly), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        // ISO weeks cross year boundaries
        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(bucket_start(d, Aggregation::Weekly), NaiveDate::from_ymd_opt(2024, 12, 30).unwrap());
    }

    #[test]
    fn test_monthly_sums_skip_empty_months_and_bad_rows() {
        let t = table(&[
            ("2024-03-02", "A", "5"),
            ("2024-01-10", "A", "10"),
            ("2024-01-20", "B", "15"),
            ("garbage", "A", "1000"),
            ("2024-03-30", "B", "n/a"),
        ]);
        let resp = run(&t, &params(Aggregation::Monthly)).unwrap();
        assert_eq!(resp.timestamp, vec!["2024-01-01", "2024-03-01"]);
        assert_eq!(resp.series[0].name, "target");
        assert_eq!(resp.series[0].values, vec![25.0, 5.0]);
        assert_eq!(resp.events, Some(vec![]));
    }

    #[test]
    fn test_store_filter_and_date_range() {
        let t = table(&[
            ("2024-01-01", "A", "1"),
            ("2024-01-02", "B", "2"),
            ("2024-01-03", "A", "4"),
            ("2024-01-04", "A", "8"),
        ]);
        let mut p = params(Aggregation::Daily);
        p.store = Some("A".to_string());
        p.date_range = Some(vec![Some("2024-01-02".to_string()), Some("2024-01-03".to_string())]);
        let resp = run(&t, &p).unwrap();
        assert_eq!(resp.timestamp, vec!["2024-01-03"]);
        assert_eq!(resp.series[0].values, vec![4.0]);

        // Open start bound
        p.date_range = Some(vec![None, Some("2024-01-03".to_string())]);
        let resp = run(&t, &p).unwrap();
        assert_eq!(resp.series[0].values, vec![1.0, 4.0]);
    }

    #[test]
    fn test_store_filter_skipped_without_store_column() {
        let t = Table::new(
            vec!["date".to_string(), "target".to_string()],
            vec![vec![Cell::infer("2024-01-01"), Cell::infer("3")]],
        );
        let mut p = params(Aggregation::Daily);
        p.store = Some("A".to_string());
        let resp = run(&t, &p).unwrap();
        assert_eq!(resp.series[0].values, vec![3.0]);
    }

    #[test]
    fn test_weekly_buckets() {
        let t = table(&[
            ("2024-03-11", "A", "1"), // Monday
            ("2024-03-17", "A", "2"), // Sunday, same ISO week
            ("2024-03-18", "A", "4"), // next Monday
        ]);
        let resp = run(&t, &params(Aggregation::Weekly)).unwrap();
        assert_eq!(resp.timestamp, vec!["2024-03-11", "2024-03-18"]);
        assert_eq!(resp.series[0].values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_missing_columns() {
        let t = table(&[("2024-01-01", "A", "1")]);
        let mut p = params(Aggregation::Monthly);
        p.target_column = "revenue".to_string();
        match run(&t, &p) {
            Err(ApiError::ColumnNotFound { column }) => assert_eq!(column, "revenue"),
            other => panic!("expected ColumnNotFound, got {:?}", other),
        }

        let no_date = Table::new(vec!["when".to_string(), "target".to_string()], vec![]);
        assert!(matches!(
            run(&no_date, &params(Aggregation::Monthly)),
            Err(ApiError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_range_bound_is_rejected() {
        let t = table(&[("2024-01-01", "A", "1")]);
        let mut p = params(Aggregation::Monthly);
        p.date_range = Some(vec![Some("yesterday".to_string()), None]);
        assert!(matches!(run(&t, &p), Err(ApiError::InvalidInput(_))));
    }
}
