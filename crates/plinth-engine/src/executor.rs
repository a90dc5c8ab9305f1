//! Run one query spec against an open engine handle.
//!
//! Synchronous by design; the service runs this on a dedicated blocking
//! worker so the async side never touches the connection directly.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Row};

use plinth_query::{QuerySpec, SqlValue};
use plinth_types::query::{ResultSet, SiteRecord};
use plinth_types::DbError;

use crate::host::EngineHandle;

/// Execute the COUNT and page SELECT of `spec` on `handle`.
///
/// # Errors
///
/// Returns [`DbError::QueryFailed`] for any engine-level SQL error.
pub fn execute(handle: &EngineHandle, spec: &QuerySpec) -> Result<ResultSet, DbError> {
    let conn = handle.connection();
    let where_params: Vec<Value> = spec.params.iter().map(to_value).collect();

    let total: i64 = conn
        .query_row(
            &spec.count_sql,
            params_from_iter(where_params.iter().cloned()),
            |row| row.get(0),
        )
        .map_err(sql_error)?;

    let mut page_params = where_params;
    page_params.push(Value::Integer(i64::from(spec.page_size)));
    page_params.push(Value::Integer(
        i64::try_from(spec.offset()).unwrap_or(i64::MAX),
    ));

    let mut stmt = conn.prepare(&spec.select_sql).map_err(sql_error)?;
    let rows = stmt
        .query_map(params_from_iter(page_params), row_to_record)
        .map_err(sql_error)?
        .collect::<Result<Vec<SiteRecord>, _>>()
        .map_err(sql_error)?;

    tracing::debug!(
        rows = rows.len(),
        total_count = total,
        page = spec.page,
        "Query executed"
    );
    Ok(ResultSet {
        rows,
        total_count: u64::try_from(total).unwrap_or(0),
        page: spec.page,
        page_size: spec.page_size,
    })
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Int(n) => Value::Integer(*n),
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        region: row.get(3)?,
        year: row.get(4)?,
        architect: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
    })
}

fn sql_error(err: rusqlite::Error) -> DbError {
    DbError::query(err.to_string())
}
