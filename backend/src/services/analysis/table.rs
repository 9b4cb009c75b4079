//! In-memory tabular dataset and file loaders
//!
//! Uploaded files are loaded fully into memory. Cells keep the loosest type
//! the source offers; numeric and date coercion happens at use so that
//! malformed cells are skipped by the engines instead of failing the load.

use calamine::{Data, DataType, Reader, open_workbook_auto};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::models::DatasetHandle;
use crate::utils::{ApiError, ApiResult};

// ============================================================================
// Cell and Table
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Infer a cell from raw delimited text
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => Cell::Number(n),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    /// Numeric coercion; `None` for anything that is not a finite number
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
            Cell::Bool(b) => f64::from(u8::from(*b)),
            Cell::Empty | Cell::DateTime(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Date coercion; `None` when the cell does not hold a recognizable date
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Exact, case-sensitive comparison against a filter value.
    /// Whole numbers compare by their integer rendering (`1.0` matches "1").
    pub fn matches_text(&self, needle: &str) -> bool {
        match self {
            Cell::Text(s) => s == needle,
            Cell::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                format!("{}", *n as i64) == needle
            },
            Cell::Number(n) => n.to_string() == needle,
            _ => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Empty => Value::Null,
            Cell::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Bool(b) => Value::Bool(*b),
            Cell::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table; short rows are padded with `Cell::Empty`, long rows truncated
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact (case-sensitive) column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First `n` rows as JSON objects keyed by column name
    pub fn preview(&self, n: usize) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .take(n)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(name, cell)| (name.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }
}

// ============================================================================
// Date parsing
// ============================================================================

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日", "%m/%d/%Y"];

/// Lenient date/datetime parsing shared by the engines and request bounds
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    // Month-only values ("2024-03", "2024/03") resolve to the first day
    parse_year_month(s).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a `YYYY-MM` (or `YYYY/MM`) period into its first day
pub fn parse_year_month(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}/01", s), "%Y/%m/%d"))
        .ok()
}

// ============================================================================
// Loading
// ============================================================================

/// Loads the raw file behind a dataset handle
pub trait TableLoader: Send + Sync {
    fn load(&self, dataset: &DatasetHandle) -> ApiResult<Table>;
}

/// Loader dispatching on file extension: delimited text or spreadsheet
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTableLoader;

impl TableLoader for FileTableLoader {
    fn load(&self, dataset: &DatasetHandle) -> ApiResult<Table> {
        load_table(&dataset.storage_path, dataset.sheet_name.as_deref())
    }
}

pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];

/// Load a table from disk. `.csv` is read as delimited text, spreadsheet
/// extensions through calamine (first sheet unless `sheet` is given).
pub fn load_table(path: &Path, sheet: Option<&str>) -> ApiResult<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let table = if ext == "csv" {
        load_csv(path)?
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        load_excel(path, sheet)?
    } else {
        return Err(ApiError::UnsupportedFileType(ext));
    };

    tracing::debug!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    Ok(table)
}

fn load_csv(path: &Path) -> ApiResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ApiError::load_error(format!("CSV: {}", e)))?;

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| ApiError::load_error(format!("CSV: {}", e)))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| ApiError::load_error(format!("CSV: {}", e)))?
    {
        rows.push(record.iter().map(|field| Cell::infer(&String::from_utf8_lossy(field))).collect());
    }

    Ok(Table::new(normalize_headers(headers), rows))
}

fn load_excel(path: &Path, sheet: Option<&str>) -> ApiResult<Table> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ApiError::load_error(format!("Excel: {}", e)))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .map_err(|e| ApiError::load_error(format!("Excel: {}", e)))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ApiError::load_error("Excel file has no worksheets"))?
            .map_err(|e| ApiError::load_error(format!("Excel: {}", e)))?,
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| c.as_string().unwrap_or_else(|| c.to_string()))
            .collect(),
        None => return Ok(Table::default()),
    };

    let body = rows.map(|row| row.iter().map(excel_cell).collect()).collect();
    Ok(Table::new(normalize_headers(headers), body))
}

fn excel_cell(cell: &Data) -> Cell {
    match cell {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::DateTime(_) => cell.as_datetime().map(Cell::DateTime).unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) => cell
            .as_datetime()
            .or_else(|| parse_datetime(s))
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        _ => Cell::Empty,
    }
}

/// Name blank headers `Unnamed: <idx>` and suffix duplicates with `.<n>`
fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.trim().is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                header.trim().to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 { base } else { format!("{}.{}", base, count) };
            *count += 1;
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(ext: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(ext).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cell_coercion() {
        assert_eq!(Cell::infer(" 12.5 ").as_f64(), Some(12.5));
        assert_eq!(Cell::infer("abc").as_f64(), None);
        assert_eq!(Cell::infer("").as_f64(), None);
        assert_eq!(Cell::infer("NaN").as_f64(), None);
        assert_eq!(Cell::infer("inf").as_f64(), None);
        assert_eq!(Cell::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Cell::Text("7".to_string()).as_f64(), Some(7.0));
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(0, 0, 0).unwrap();
        for raw in ["2024-03-05", "2024/03/05", "2024/3/5", "2024年3月5日", "03/05/2024"] {
            assert_eq!(parse_datetime(raw), Some(expected), "format {}", raw);
        }
        assert_eq!(
            parse_datetime("2024-03-05 10:30:00").unwrap().format("%H:%M").to_string(),
            "10:30"
        );
        assert_eq!(
            parse_datetime("2024-03").unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!(parse_datetime("not a date").is_none());
        assert!(parse_datetime("2024-13-01").is_none());
    }

    #[test]
    fn test_matches_text() {
        assert!(Cell::Text("Tokyo".to_string()).matches_text("Tokyo"));
        assert!(!Cell::Text("Tokyo".to_string()).matches_text("tokyo"));
        assert!(Cell::Number(1.0).matches_text("1"));
        assert!(Cell::Number(1.5).matches_text("1.5"));
        assert!(!Cell::Empty.matches_text(""));
    }

    #[test]
    fn test_load_csv() {
        let file = write_temp(".csv", "\u{feff}Date,shop,target,\n2024-01-01,A,10,x\n2024-01-02,B,,\n");
        let table = load_table(file.path(), None).unwrap();
        assert_eq!(table.columns(), &["Date", "shop", "target", "Unnamed: 3"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][2], Cell::Number(10.0));
        assert_eq!(table.rows()[1][2], Cell::Empty);
        assert_eq!(table.column_index("shop"), Some(1));
    }

    #[test]
    fn test_load_csv_pads_short_rows_and_dedupes_headers() {
        let file = write_temp(".csv", "a,a,b\n1\n");
        let table = load_table(file.path(), None).unwrap();
        assert_eq!(table.columns(), &["a", "a.1", "b"]);
        assert_eq!(table.rows()[0], vec![Cell::Number(1.0), Cell::Empty, Cell::Empty]);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = write_temp(".txt", "a,b\n1,2\n");
        let result = load_table(file.path(), None);
        assert!(matches!(result, Err(ApiError::UnsupportedFileType(ext)) if ext == "txt"));
    }

    #[test]
    fn test_load_corrupt_spreadsheet() {
        let file = write_temp(".xlsx", "definitely not a zip archive");
        let result = load_table(file.path(), None);
        assert!(matches!(result, Err(ApiError::LoadError(_))));
    }

    #[test]
    fn test_preview() {
        let table = Table::new(
            vec!["name".to_string(), "qty".to_string()],
            vec![
                vec![Cell::Text("a".to_string()), Cell::Number(1.0)],
                vec![Cell::Text("b".to_string()), Cell::Empty],
            ],
        );
        let preview = table.preview(5);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0]["qty"], serde_json::json!(1.0));
        assert_eq!(preview[1]["qty"], Value::Null);
    }
}
