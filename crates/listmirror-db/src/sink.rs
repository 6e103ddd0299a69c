//! Destination sink capability trait.

use async_trait::async_trait;

use listmirror_core::config::DatabaseSettings;
use listmirror_core::error::SyncResult;
use listmirror_core::record::FieldValue;

use crate::schema::ColumnDef;

/// Write side of a sync run.
///
/// Implementations report failures as [`listmirror_core::SyncError::Database`];
/// the schema reconciler and table writer reclassify them per operation.
/// Methods take `&mut self` because the SQL Server client multiplexes one
/// connection.
#[async_trait]
pub trait TableSink: Send {
    /// Human-readable target description, safe to log.
    fn display_name(&self) -> &str;

    /// Verify the destination is reachable (`SELECT 1`).
    async fn test_connection(&mut self) -> SyncResult<()>;

    /// Check the destination catalog for a table with this name.
    async fn table_exists(&mut self, table: &str) -> SyncResult<bool>;

    /// Column names of an existing table, in declaration order.
    async fn table_columns(&mut self, table: &str) -> SyncResult<Vec<String>>;

    /// Create a table with the given columns. Fails if it already exists.
    async fn create_table(&mut self, table: &str, columns: &[ColumnDef]) -> SyncResult<()>;

    /// Delete every row from the table (full-refresh mode).
    async fn truncate(&mut self, table: &str) -> SyncResult<()>;

    /// Append one batch of rows. Every row must be aligned to `columns`.
    /// Returns the number of rows written.
    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<FieldValue>],
    ) -> SyncResult<u64>;
}

/// Connect the backend selected by the configuration.
pub async fn connect(settings: &DatabaseSettings) -> SyncResult<Box<dyn TableSink>> {
    match settings {
        DatabaseSettings::Sqlite(s) => Ok(Box::new(crate::sqlite::SqliteSink::connect(s).await?)),
        DatabaseSettings::SqlServer(s) => {
            Ok(Box::new(crate::mssql::MssqlSink::connect(s).await?))
        }
    }
}
