//! Schema derivation and reconciliation.
//!
//! Destination schema is trusted as-is once a table exists; reconciliation
//! only ever creates, never alters.

use tracing::{debug, info, instrument, warn};

use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::naming::clean_column_name;
use listmirror_core::record::{FieldValue, TabularResult};

use crate::sink::TableSink;

/// Synthetic auto-increment primary key added to every created table.
pub const ROW_ID_COLUMN: &str = "row_id";
/// Row-insertion timestamp system column.
pub const SYNCED_AT_COLUMN: &str = "synced_at";
/// Sync-run identifier system column, the audit/cleanup handle.
pub const SYNC_RUN_ID_COLUMN: &str = "sync_run_id";

/// Check whether a cleaned name collides with a system column.
pub fn is_reserved_column(name: &str) -> bool {
    matches!(name, ROW_ID_COLUMN | SYNCED_AT_COLUMN | SYNC_RUN_ID_COLUMN)
}

/// Logical column type; each backend renders its own dialect.
///
/// Floating-point source columns are stored as text: cross-backend float
/// formatting drifts, and append-only audit rows favor fidelity over
/// numeric querying on those columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// Auto-incrementing primary key.
    PrimaryKey,
    /// Row-insertion timestamp.
    Timestamp,
    /// 64-bit integer.
    Integer,
    /// Bounded-length text.
    Text,
}

/// One destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Infer the column type for one union field from its values.
///
/// Uniformly-integral values map to an integer column; everything else,
/// including uniformly-float, mixed and all-null columns, maps to text.
fn infer_type<'a>(values: impl Iterator<Item = &'a FieldValue>) -> SqlType {
    let mut saw_value = false;
    let mut all_int = true;

    for value in values {
        match value {
            FieldValue::Null => {}
            FieldValue::Int(_) => saw_value = true,
            _ => {
                saw_value = true;
                all_int = false;
            }
        }
    }

    if saw_value && all_int {
        SqlType::Integer
    } else {
        SqlType::Text
    }
}

/// Derive destination columns for a tabular result: the three system
/// columns followed by one column per union field, cleaned and typed.
///
/// A field whose cleaned name duplicates an earlier one, or collides with
/// a system column, is skipped (the writer applies the same rule, so
/// create and write stay aligned).
pub fn derive_columns(result: &TabularResult) -> Vec<ColumnDef> {
    let mut columns = vec![
        ColumnDef::new(ROW_ID_COLUMN, SqlType::PrimaryKey),
        ColumnDef::new(SYNCED_AT_COLUMN, SqlType::Timestamp),
        ColumnDef::new(SYNC_RUN_ID_COLUMN, SqlType::Text),
    ];

    for raw in result.columns() {
        let cleaned = clean_column_name(raw);

        if is_reserved_column(&cleaned) {
            warn!(field = %raw, "field collides with a system column, dropping");
            continue;
        }
        if columns.iter().any(|c| c.name == cleaned) {
            warn!(field = %raw, column = %cleaned, "duplicate cleaned column name, dropping");
            continue;
        }

        let sql_type = infer_type(result.column_values(raw));
        columns.push(ColumnDef::new(cleaned, sql_type));
    }

    columns
}

/// Ensure the destination table exists.
///
/// Returns `true` when the table was created by this call, `false` when
/// it already existed. With `create_if_missing` unset, an absent table is
/// a schema error. DDL failures are not retried.
#[instrument(skip(sink, result), fields(sink = %sink.display_name()))]
pub async fn ensure_table(
    sink: &mut dyn TableSink,
    result: &TabularResult,
    table: &str,
    create_if_missing: bool,
) -> SyncResult<bool> {
    if sink
        .table_exists(table)
        .await
        .map_err(|e| SyncError::schema(format!("table lookup for '{table}': {e}")))?
    {
        debug!(%table, "table already exists, schema trusted as-is");
        return Ok(false);
    }

    if !create_if_missing {
        return Err(SyncError::schema(format!(
            "table '{table}' does not exist and table creation is disabled"
        )));
    }

    let columns = derive_columns(result);
    sink.create_table(table, &columns)
        .await
        .map_err(|e| SyncError::schema(format!("creating table '{table}': {e}")))?;

    info!(%table, columns = columns.len(), "created destination table");
    Ok(true)
}
