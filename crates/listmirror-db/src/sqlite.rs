//! Embedded SQLite backend.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, SqlitePool};
use tracing::{debug, instrument};

use listmirror_core::config::SqliteSettings;
use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::record::FieldValue;

use crate::schema::{ColumnDef, SqlType};
use crate::sink::TableSink;

/// SQLite destination sink backed by a connection pool.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
    display_name: String,
}

impl SqliteSink {
    /// Open (creating if missing) the configured database file.
    #[instrument(skip(settings), fields(file = %settings.file.display()))]
    pub async fn connect(settings: &SqliteSettings) -> SyncResult<Self> {
        if let Some(parent) = settings.file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SyncError::database(format!(
                        "creating directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&settings.file)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::database_with_source("opening sqlite database", e))?;

        debug!("sqlite database opened");

        Ok(Self {
            pool,
            display_name: format!("sqlite: {}", settings.file.display()),
        })
    }

    fn column_type(sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::PrimaryKey => "INTEGER PRIMARY KEY AUTOINCREMENT",
            SqlType::Timestamp => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Text => "TEXT",
        }
    }
}

#[async_trait]
impl TableSink for SqliteSink {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn test_connection(&mut self) -> SyncResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::database_with_source("connection test", e))?;
        Ok(())
    }

    async fn table_exists(&mut self, table: &str) -> SyncResult<bool> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::database_with_source("catalog query", e))?;
        Ok(row.is_some())
    }

    async fn table_columns(&mut self, table: &str) -> SyncResult<Vec<String>> {
        let rows = sqlx::query(&format!("PRAGMA table_info(\"{table}\")"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::database_with_source("table_info query", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map_err(|e| SyncError::database_with_source("table_info row", e))
            })
            .collect()
    }

    async fn create_table(&mut self, table: &str, columns: &[ColumnDef]) -> SyncResult<()> {
        let column_sql: Vec<String> = columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, Self::column_type(c.sql_type)))
            .collect();

        let ddl = format!("CREATE TABLE \"{table}\" ({})", column_sql.join(", "));
        debug!(%ddl, "creating table");

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::database_with_source("create table", e))?;
        Ok(())
    }

    async fn truncate(&mut self, table: &str) -> SyncResult<()> {
        sqlx::query(&format!("DELETE FROM \"{table}\""))
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::database_with_source("truncate", e))?;
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<FieldValue>],
    ) -> SyncResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let column_list: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO \"{table}\" ({}) ",
            column_list.join(", ")
        ));

        builder.push_values(rows, |mut b, row| {
            for value in row {
                match value {
                    FieldValue::Null => {
                        b.push_bind(Option::<String>::None);
                    }
                    FieldValue::Bool(v) => {
                        b.push_bind(*v);
                    }
                    FieldValue::Int(v) => {
                        b.push_bind(*v);
                    }
                    // Floats travel as text, matching the text column type
                    // the schema step assigns them.
                    FieldValue::Float(v) => {
                        b.push_bind(v.to_string());
                    }
                    FieldValue::Text(v) => {
                        b.push_bind(v.clone());
                    }
                }
            }
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::database_with_source("batch insert", e))?;

        Ok(result.rows_affected())
    }
}
