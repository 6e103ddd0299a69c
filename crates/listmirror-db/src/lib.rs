//! Destination sinks for listmirror.
//!
//! A [`TableSink`] is the write side of a sync run: it can test its
//! connection, introspect and create tables, and append batches of rows.
//! Two backends are provided, an embedded SQLite file (`sqlx`) and
//! Microsoft SQL Server (`tiberius`).
//!
//! Schema reconciliation ([`schema`]) and batched writing ([`writer`])
//! are backend-independent and work through the trait.

pub mod mssql;
pub mod schema;
pub mod sink;
pub mod sqlite;
pub mod writer;

pub use schema::{derive_columns, ensure_table, ColumnDef, SqlType};
pub use sink::{connect, TableSink};
pub use sqlite::SqliteSink;
pub use writer::{TableWriter, WriteReport};
