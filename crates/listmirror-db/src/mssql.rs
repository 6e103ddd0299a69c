//! Microsoft SQL Server backend.
//!
//! Uses tiberius over a tokio TCP stream. The rest of the SQL layer rides
//! on sqlx, which has no SQL Server driver; this backend mirrors the
//! SQLite sink's shape on tiberius instead.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tiberius::{AuthMethod, Client, ColumnData, Config, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, instrument};

use listmirror_core::config::SqlServerSettings;
use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::record::FieldValue;

use crate::schema::{ColumnDef, SqlType};
use crate::sink::TableSink;

/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// TDS caps parameters per request at 2100; stay under it with headroom.
const MAX_PARAMS_PER_STATEMENT: usize = 2000;

type TdsClient = Client<Compat<TcpStream>>;

/// Bind adapter from [`FieldValue`] to a TDS parameter.
struct SqlParam<'a>(&'a FieldValue);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self) -> ColumnData<'_> {
        match self.0 {
            FieldValue::Null => ColumnData::String(None),
            FieldValue::Bool(v) => ColumnData::Bit(Some(*v)),
            FieldValue::Int(v) => ColumnData::I64(Some(*v)),
            // Floats travel as text, matching the text column type the
            // schema step assigns them.
            FieldValue::Float(v) => ColumnData::String(Some(Cow::Owned(v.to_string()))),
            FieldValue::Text(v) => ColumnData::String(Some(Cow::Borrowed(v))),
        }
    }
}

/// SQL Server destination sink over a single TDS connection.
pub struct MssqlSink {
    client: TdsClient,
    display_name: String,
}

impl std::fmt::Debug for MssqlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlSink")
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl MssqlSink {
    /// Connect and authenticate against the configured server.
    #[instrument(skip(settings), fields(server = %settings.server, database = %settings.database))]
    pub async fn connect(settings: &SqlServerSettings) -> SyncResult<Self> {
        let mut config = Config::new();
        config.host(&settings.server);
        config.port(settings.port);
        config.database(&settings.database);
        config.authentication(AuthMethod::sql_server(
            &settings.username,
            settings.password.expose_secret(),
        ));
        if settings.trust_cert {
            config.trust_cert();
        }

        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(config.get_addr()))
            .await
            .map_err(|_| {
                SyncError::database(format!(
                    "connection to {} timed out after {}s",
                    config.get_addr(),
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| SyncError::database_with_source("tcp connect", e))?;
        tcp.set_nodelay(true)
            .map_err(|e| SyncError::database_with_source("tcp configuration", e))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| SyncError::database_with_source("sql server handshake", e))?;

        debug!("sql server connection established");

        Ok(Self {
            client,
            display_name: format!(
                "sqlserver: {}@{}/{}",
                settings.username, settings.server, settings.database
            ),
        })
    }

    fn column_type(sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::PrimaryKey => "BIGINT IDENTITY(1,1) PRIMARY KEY",
            SqlType::Timestamp => "DATETIME2",
            SqlType::Integer => "BIGINT",
            SqlType::Text => "NVARCHAR(4000)",
        }
    }

    /// Multi-row INSERT for one sub-chunk of rows.
    async fn insert_chunk(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<FieldValue>],
    ) -> SyncResult<u64> {
        let column_list: Vec<String> = columns.iter().map(|c| format!("[{c}]")).collect();

        let mut placeholders = Vec::with_capacity(rows.len());
        let mut index = 1usize;
        for _ in rows {
            let row_params: Vec<String> = (0..columns.len())
                .map(|_| {
                    let p = format!("@P{index}");
                    index += 1;
                    p
                })
                .collect();
            placeholders.push(format!("({})", row_params.join(", ")));
        }

        let sql = format!(
            "INSERT INTO [{table}] ({}) VALUES {}",
            column_list.join(", "),
            placeholders.join(", ")
        );

        let params: Vec<SqlParam<'_>> = rows.iter().flatten().map(SqlParam).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();

        let result = self
            .client
            .execute(sql.as_str(), &param_refs)
            .await
            .map_err(|e| SyncError::database_with_source("batch insert", e))?;

        Ok(result.total())
    }
}

#[async_trait]
impl TableSink for MssqlSink {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn test_connection(&mut self) -> SyncResult<()> {
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| SyncError::database_with_source("connection test", e))?
            .into_row()
            .await
            .map_err(|e| SyncError::database_with_source("connection test", e))?;
        Ok(())
    }

    async fn table_exists(&mut self, table: &str) -> SyncResult<bool> {
        let row = self
            .client
            .query(
                "SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @P1",
                &[&table],
            )
            .await
            .map_err(|e| SyncError::database_with_source("catalog query", e))?
            .into_row()
            .await
            .map_err(|e| SyncError::database_with_source("catalog query", e))?;
        Ok(row.is_some())
    }

    async fn table_columns(&mut self, table: &str) -> SyncResult<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_NAME = @P1 ORDER BY ORDINAL_POSITION",
                &[&table],
            )
            .await
            .map_err(|e| SyncError::database_with_source("column query", e))?
            .into_first_result()
            .await
            .map_err(|e| SyncError::database_with_source("column query", e))?;

        rows.iter()
            .map(|row| {
                row.get::<&str, _>(0)
                    .map(str::to_string)
                    .ok_or_else(|| SyncError::database("null column name in catalog"))
            })
            .collect()
    }

    async fn create_table(&mut self, table: &str, columns: &[ColumnDef]) -> SyncResult<()> {
        let column_sql: Vec<String> = columns
            .iter()
            .map(|c| format!("[{}] {}", c.name, Self::column_type(c.sql_type)))
            .collect();

        let ddl = format!("CREATE TABLE [{table}] ({})", column_sql.join(", "));
        debug!(%ddl, "creating table");

        self.client
            .execute(ddl.as_str(), &[])
            .await
            .map_err(|e| SyncError::database_with_source("create table", e))?;
        Ok(())
    }

    async fn truncate(&mut self, table: &str) -> SyncResult<()> {
        let sql = format!("DELETE FROM [{table}]");
        self.client
            .execute(sql.as_str(), &[])
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

        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / columns.len().max(1)).max(1);

        let mut written = 0u64;
        for chunk in rows.chunks(rows_per_statement) {
            written += self.insert_chunk(table, columns, chunk).await?;
        }
        Ok(written)
    }
}
