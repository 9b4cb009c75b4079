//! Row filters shared by the engines. Filters never fail: rows that cannot
//! be evaluated are dropped, and a filter whose column is missing is skipped.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use super::table::Cell;

pub type Row<'a> = &'a [Cell];

/// Keep rows whose store cell equals `store` exactly. Skipped when no store
/// value is requested (or it is empty) or the table has no store column.
pub fn by_store<'a>(rows: Vec<Row<'a>>, store_idx: Option<usize>, store: Option<&str>) -> Vec<Row<'a>> {
    match (store_idx, store.filter(|s| !s.is_empty())) {
        (Some(idx), Some(store)) => rows.into_iter().filter(|row| row[idx].matches_text(store)).collect(),
        _ => rows,
    }
}

/// Pair each row with its parsed date, dropping rows whose date does not parse
pub fn with_dates<'a>(rows: Vec<Row<'a>>, date_idx: usize) -> Vec<(NaiveDateTime, Row<'a>)> {
    rows.into_iter()
        .filter_map(|row| row[date_idx].as_datetime().map(|dt| (dt, row)))
        .collect()
}

/// Inclusive range filter; either bound may be open
pub fn by_date_range<'a>(
    rows: Vec<(NaiveDateTime, Row<'a>)>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Vec<(NaiveDateTime, Row<'a>)> {
    rows.into_iter()
        .filter(|(dt, _)| start.is_none_or(|s| *dt >= s) && end.is_none_or(|e| *dt <= e))
        .collect()
}

/// Keep rows dated within the calendar month of `month_start`
pub fn by_month<'a>(rows: Vec<(NaiveDateTime, Row<'a>)>, month_start: NaiveDate) -> Vec<(NaiveDateTime, Row<'a>)> {
    rows.into_iter()
        .filter(|(dt, _)| dt.year() == month_start.year() && dt.month() == month_start.month())
        .collect()
}
