//! Heuristic detection of the date and store columns

use super::table::Table;

/// Prioritized header candidates for the columns the engines need to find
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCandidates {
    pub date: Vec<String>,
    pub store: Vec<String>,
}

impl Default for ColumnCandidates {
    fn default() -> Self {
        Self {
            date: ["Date", "年月日", "date"].map(String::from).to_vec(),
            store: ["shop", "店舗名", "store", "Shop"].map(String::from).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedColumns {
    pub date: Option<String>,
    pub store: Option<String>,
}

impl DetectedColumns {
    pub fn date_index(&self, table: &Table) -> Option<usize> {
        self.date.as_deref().and_then(|name| table.column_index(name))
    }

    pub fn store_index(&self, table: &Table) -> Option<usize> {
        self.store.as_deref().and_then(|name| table.column_index(name))
    }
}

/// Return the first column matching a candidate, in candidate priority order.
/// An exact header match wins over a case-insensitive one for the same candidate.
pub fn detect_column(columns: &[String], candidates: &[String]) -> Option<String> {
    for candidate in candidates {
        if let Some(exact) = columns.iter().find(|c| *c == candidate) {
            return Some(exact.clone());
        }
        let lowered = candidate.to_lowercase();
        if let Some(folded) = columns.iter().find(|c| c.to_lowercase() == lowered) {
            return Some(folded.clone());
        }
    }
    None
}

pub fn detect(table: &Table, candidates: &ColumnCandidates) -> DetectedColumns {
    let detected = DetectedColumns {
        date: detect_column(table.columns(), &candidates.date),
        store: detect_column(table.columns(), &candidates.store),
    };
    tracing::debug!("Detected columns: date={:?}, store={:?}", detected.date, detected.store);
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_in_priority_order() {
        let candidates = ColumnCandidates::default();
        let columns = cols(&["date", "年月日", "売上"]);
        // "Date" has no exact match but folds onto "date" before "年月日" is tried
        assert_eq!(detect_column(&columns, &candidates.date).as_deref(), Some("date"));

        let columns = cols(&["年月日", "売上"]);
        assert_eq!(detect_column(&columns, &candidates.date).as_deref(), Some("年月日"));
    }

    #[test]
    fn test_case_insensitive_match() {
        let candidates = ColumnCandidates::default();
        let columns = cols(&["DATE", "SHOP", "target"]);
        assert_eq!(detect_column(&columns, &candidates.date).as_deref(), Some("DATE"));
        assert_eq!(detect_column(&columns, &candidates.store).as_deref(), Some("SHOP"));
    }

    #[test]
    fn test_exact_beats_folded_for_same_candidate() {
        let columns = cols(&["SHOP", "shop"]);
        assert_eq!(detect_column(&columns, &cols(&["shop"])).as_deref(), Some("shop"));
    }

    #[test]
    fn test_no_match() {
        let candidates = ColumnCandidates::default();
        let columns = cols(&["when", "where"]);
        assert!(detect_column(&columns, &candidates.date).is_none());
        assert!(detect_column(&columns, &candidates.store).is_none());
        assert!(detect_column(&columns, &[]).is_none());
    }

    #[test]
    fn test_detect_on_table() {
        let table = Table::new(cols(&["Date", "店舗名", "target"]), vec![]);
        let detected = detect(&table, &ColumnCandidates::default());
        assert_eq!(detected.date.as_deref(), Some("Date"));
        assert_eq!(detected.store.as_deref(), Some("店舗名"));
        assert_eq!(detected.store_index(&table), Some(1));
    }
}
