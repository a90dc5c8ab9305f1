//! Filter parameters, record rows, and paginated result sets.

use serde::{Deserialize, Serialize};

/// Hard ceiling on page size, preventing unbounded result sets.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Page size used when the caller specifies none.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// High-level search request as the UI produces it.
///
/// Values are raw and untrusted here; the query builder normalizes and
/// clamps them before anything reaches the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    /// Free-text search over title and architect.
    pub text: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub architect: Option<String>,
    pub sort_by: Option<SortField>,
    /// Zero-based page index; negative values clamp to zero.
    pub page: i64,
    pub page_size: Option<u32>,
}

/// Supported sort dimensions. Ordering always tie-breaks on record id so
/// repeated identical requests return identical row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    Year,
    Region,
}

impl SortField {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Year => "year",
            Self::Region => "region",
        }
    }
}

/// One architecture record row as served to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: i64,
    pub title: String,
    pub category: Option<String>,
    pub region: Option<String>,
    pub year: Option<i32>,
    pub architect: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Ordered page of rows plus the total-count metadata pagination needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub rows: Vec<SiteRecord>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_params_default_is_unfiltered_first_page() {
        let params = FilterParams::default();
        assert!(params.text.is_none());
        assert_eq!(params.page, 0);
        assert!(params.page_size.is_none());
    }

    #[test]
    fn sort_field_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SortField::Year).unwrap(), "\"year\"");
    }
}
