//! Translate UI filter parameters into parameterized SQL and a cache key.
//!
//! Pure, no I/O. User values only ever travel as bound parameters; the SQL
//! text is assembled exclusively from fixed fragments.

use sha2::{Digest, Sha256};

use plinth_types::query::{FilterParams, SortField, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// One positionally bound SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
}

/// Deterministic, normalized description of one query.
///
/// Immutable once built; two semantically identical filter inputs produce
/// byte-identical specs and therefore identical cache keys.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Page SELECT ending in `LIMIT ? OFFSET ?`; the executor appends the
    /// page bounds after `params`.
    pub select_sql: String,
    /// Paired COUNT over the same predicates, bound with `params` alone.
    pub count_sql: String,
    /// WHERE-clause bindings shared by both statements, in order.
    pub params: Vec<SqlValue>,
    pub page: u32,
    pub page_size: u32,
    /// Stable hash of the normalized spec.
    pub cache_key: String,
    /// Whether any filter dimension is active (drives cache TTL choice).
    pub filtered: bool,
}

impl QuerySpec {
    /// Row offset of the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.page_size)
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, title, category, region, year, architect, latitude, longitude FROM sites";
const COUNT_COLUMNS: &str = "SELECT COUNT(*) FROM sites";

/// Build a [`QuerySpec`] from raw filter parameters.
///
/// Normalization: text terms are trimmed and case-folded, empty filters
/// drop out, the page index clamps to non-negative, and the page size
/// clamps into `1..=MAX_PAGE_SIZE` (defaulting when unspecified). The
/// default sort is title ascending; every ordering tie-breaks on id.
#[must_use]
pub fn build(params: &FilterParams) -> QuerySpec {
    let mut predicates: Vec<&'static str> = Vec::new();
    let mut bound: Vec<SqlValue> = Vec::new();

    let text = normalize_term(params.text.as_deref());
    if let Some(term) = &text {
        predicates.push("(instr(lower(title), ?) > 0 OR instr(lower(architect), ?) > 0)");
        bound.push(SqlValue::Text(term.clone()));
        bound.push(SqlValue::Text(term.clone()));
    }
    let category = normalize_exact(params.category.as_deref());
    if let Some(value) = &category {
        predicates.push("category = ?");
        bound.push(SqlValue::Text(value.clone()));
    }
    let region = normalize_exact(params.region.as_deref());
    if let Some(value) = &region {
        predicates.push("region = ?");
        bound.push(SqlValue::Text(value.clone()));
    }
    if let Some(from) = params.year_from {
        predicates.push("year >= ?");
        bound.push(SqlValue::Int(i64::from(from)));
    }
    if let Some(to) = params.year_to {
        predicates.push("year <= ?");
        bound.push(SqlValue::Int(i64::from(to)));
    }
    let architect = normalize_term(params.architect.as_deref());
    if let Some(term) = &architect {
        predicates.push("instr(lower(architect), ?) > 0");
        bound.push(SqlValue::Text(term.clone()));
    }

    let where_clause = if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    };

    let sort = params.sort_by.unwrap_or(SortField::Title);
    let order_clause = match sort {
        SortField::Title => "title COLLATE NOCASE ASC, id ASC",
        SortField::Year => "year ASC, id ASC",
        SortField::Region => "region COLLATE NOCASE ASC, id ASC",
    };

    let page = u32::try_from(params.page.max(0)).unwrap_or(u32::MAX);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let select_sql =
        format!("{SELECT_COLUMNS}{where_clause} ORDER BY {order_clause} LIMIT ? OFFSET ?");
    let count_sql = format!("{COUNT_COLUMNS}{where_clause}");

    let filtered = !predicates.is_empty();
    let cache_key = cache_key(
        text.as_deref(),
        category.as_deref(),
        region.as_deref(),
        params.year_from,
        params.year_to,
        architect.as_deref(),
        sort,
        page,
        page_size,
    );

    QuerySpec {
        select_sql,
        count_sql,
        params: bound,
        page,
        page_size,
        cache_key,
        filtered,
    }
}

/// Trim and case-fold a free-text term; empty terms drop the filter.
fn normalize_term(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim().to_lowercase();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Trim an exact-match value; empty values drop the filter.
fn normalize_exact(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Stable digest over a canonical field order, so semantically identical
/// requests hash identically no matter how the caller assembled them.
#[allow(clippy::too_many_arguments)]
fn cache_key(
    text: Option<&str>,
    category: Option<&str>,
    region: Option<&str>,
    year_from: Option<i32>,
    year_to: Option<i32>,
    architect: Option<&str>,
    sort: SortField,
    page: u32,
    page_size: u32,
) -> String {
    let mut hasher = Sha256::new();
    let canonical = format!(
        "v1\x1ftext={}\x1fcategory={}\x1fregion={}\x1fyear_from={}\x1fyear_to={}\x1farchitect={}\x1fsort={}\x1fpage={page}\x1fsize={page_size}",
        text.unwrap_or(""),
        category.unwrap_or(""),
        region.unwrap_or(""),
        year_from.map_or(String::new(), |y| y.to_string()),
        year_to.map_or(String::new(), |y| y.to_string()),
        architect.unwrap_or(""),
        sort.as_str(),
    );
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
