//! Header-driven column location and per-record jurisdiction filtering
//!
//! Both pieces are pure: `locate_column` resolves the filter column's ordinal
//! position from a header once per file, and `RecordFilter` decides record
//! inclusion against an acceptance set. Comparison is byte-exact after
//! trimming surrounding whitespace; jurisdiction codes are fixed-case vendor
//! tokens, so no case folding happens anywhere.

use rede_common::types::JurisdictionCode;
use rede_common::{PipelineError, Result};
use std::collections::HashSet;

/// Locate `target` in a header, returning its ordinal position.
///
/// Matching is exact and case-sensitive; when a header repeats a name, the
/// first occurrence wins. A missing column is fatal for the owning job.
pub fn locate_column(header_fields: &[&str], target: &str, entry: &str) -> Result<usize> {
    header_fields
        .iter()
        .position(|field| field.trim() == target)
        .ok_or_else(|| PipelineError::ColumnMissing {
            column: target.to_string(),
            entry: entry.to_string(),
        })
}

/// Split one raw record into fields on a fixed single-character delimiter.
pub fn split_record(line: &str, delimiter: char) -> Vec<&str> {
    line.split(delimiter).collect()
}

/// Decides whether a parsed record belongs to an acceptance set.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    acceptance: HashSet<String>,
}

impl RecordFilter {
    /// Build a filter over a set of jurisdiction codes.
    pub fn new<'a>(codes: impl IntoIterator<Item = &'a JurisdictionCode>) -> Self {
        Self {
            acceptance: codes.into_iter().map(|c| c.as_str().to_string()).collect(),
        }
    }

    /// True when the record's filter field, trimmed, is in the acceptance set.
    ///
    /// Records with fewer than `column_index + 1` fields are malformed and
    /// never accepted; the caller counts them.
    pub fn accepts(&self, fields: &[&str], column_index: usize) -> bool {
        fields
            .get(column_index)
            .map(|value| self.acceptance.contains(value.trim()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> JurisdictionCode {
        JurisdictionCode::new(s).unwrap()
    }

    #[test]
    fn test_locate_column_found() {
        let header = vec!["ID", "Name", "SitusStateCode"];
        assert_eq!(locate_column(&header, "SitusStateCode", "a.txt").unwrap(), 2);
    }

    #[test]
    fn test_locate_column_first_occurrence_wins() {
        let header = vec!["ID", "SitusStateCode", "SitusStateCode"];
        assert_eq!(locate_column(&header, "SitusStateCode", "a.txt").unwrap(), 1);
    }

    #[test]
    fn test_locate_column_is_case_sensitive() {
        let header = vec!["ID", "situsstatecode"];
        let err = locate_column(&header, "SitusStateCode", "a.txt").unwrap_err();
        assert_eq!(err.kind(), "column_missing");
        assert!(err.to_string().contains("a.txt"));
    }

    #[test]
    fn test_locate_column_trims_header_whitespace() {
        let header = vec!["ID", " SitusStateCode\r"];
        assert_eq!(locate_column(&header, "SitusStateCode", "a.txt").unwrap(), 1);
    }

    #[test]
    fn test_accepts_exact_match() {
        let filter = RecordFilter::new(&[code("CA")]);
        assert!(filter.accepts(&["1", "A", "CA"], 2));
        assert!(!filter.accepts(&["2", "B", "TX"], 2));
    }

    #[test]
    fn test_accepts_trims_field_whitespace() {
        let filter = RecordFilter::new(&[code("CA")]);
        assert!(filter.accepts(&["1", "A", " CA "], 2));
    }

    #[test]
    fn test_accepts_is_case_sensitive() {
        let filter = RecordFilter::new(&[code("CA")]);
        assert!(!filter.accepts(&["1", "A", "ca"], 2));
    }

    #[test]
    fn test_short_record_never_accepted() {
        let filter = RecordFilter::new(&[code("CA")]);
        assert!(!filter.accepts(&["1", "A"], 2));
        assert!(!filter.accepts(&[], 0));
    }

    #[test]
    fn test_split_record_tab_delimited() {
        let fields = split_record("1\tA\tCA", '\t');
        assert_eq!(fields, vec!["1", "A", "CA"]);
    }

    #[test]
    fn test_split_record_preserves_empty_fields() {
        let fields = split_record("1\t\tCA", '\t');
        assert_eq!(fields, vec!["1", "", "CA"]);
    }
}
