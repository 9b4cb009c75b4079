//! Cache key construction
//!
//! The fingerprint is compact JSON with sorted keys over a fixed per-kind
//! field set, so it is stable across field order, whitespace and extra
//! client fields. The format matches the `params_json` column of rows
//! written by earlier releases.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::models::AnalysisKind;

/// Fields that take part in the fingerprint for each analysis kind
pub fn fingerprint_fields(kind: AnalysisKind) -> &'static [&'static str] {
    match kind {
        AnalysisKind::TimeSeries => &["aggregation", "date_range", "store", "target_column"],
        AnalysisKind::Pareto => &["analysis_type", "period", "store"],
        AnalysisKind::Histogram => &["bins", "column"],
    }
}

/// Canonical fingerprint of `params` for `kind`; missing fields count as `null`
pub fn fingerprint(kind: AnalysisKind, params: &Map<String, Value>) -> String {
    let canonical: BTreeMap<&str, &Value> = fingerprint_fields(kind)
        .iter()
        .map(|field| (*field, params.get(*field).unwrap_or(&Value::Null)))
        .collect();

    // A BTreeMap of JSON values always serializes
    serde_json::to_string(&canonical).unwrap_or_default()
}
