//! Batched append writes to the destination table.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use listmirror_core::cancel::CancelFlag;
use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::naming::clean_column_name;
use listmirror_core::record::{FieldValue, TabularResult};

use crate::schema::{is_reserved_column, SYNCED_AT_COLUMN, SYNC_RUN_ID_COLUMN};
use crate::sink::TableSink;

/// Timestamp format for the `synced_at` system column; parses implicitly
/// on both backends.
const SYNCED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Outcome of a write pass.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    /// Rows written across all batches.
    pub rows_written: u64,
    /// Result columns that were not written because the destination table
    /// has no matching column (schema drift) or the name is reserved.
    pub dropped_columns: Vec<String>,
}

/// Appends tabular results to a destination table in batches.
///
/// Strictly append-only: rows are never updated or deleted, except for the
/// opt-in truncate-before-insert full-refresh mode. Each row carries the
/// insertion timestamp and the sync-run id.
#[derive(Debug, Clone)]
pub struct TableWriter {
    batch_size: usize,
    truncate_before_insert: bool,
}

impl TableWriter {
    /// Create a writer with the given batch size.
    pub fn new(batch_size: usize, truncate_before_insert: bool) -> Self {
        Self {
            batch_size: batch_size.max(1),
            truncate_before_insert,
        }
    }

    /// Write every record to `table`, tagging rows with `sync_run_id`.
    ///
    /// A batch failure aborts the remaining batches; rows from batches
    /// already committed stay in the table and are identifiable by the
    /// run id. Cancellation is observed between batches.
    #[instrument(skip(self, sink, result, cancel), fields(sink = %sink.display_name(), records = result.len()))]
    pub async fn write(
        &self,
        sink: &mut dyn TableSink,
        result: &TabularResult,
        table: &str,
        sync_run_id: &str,
        cancel: &CancelFlag,
    ) -> SyncResult<WriteReport> {
        let destination_columns = sink
            .table_columns(table)
            .await
            .map_err(|e| SyncError::write(format!("columns of '{table}': {e}")))?;

        // Map raw result columns onto destination columns with the same
        // cleaning rule used at creation time. First cleaned name wins;
        // columns the destination lacks are dropped (schema drift).
        let mut raw_names: Vec<&str> = Vec::new();
        let mut write_columns: Vec<String> = vec![
            SYNCED_AT_COLUMN.to_string(),
            SYNC_RUN_ID_COLUMN.to_string(),
        ];
        let mut dropped_columns: Vec<String> = Vec::new();

        for raw in result.columns() {
            let cleaned = clean_column_name(raw);
            if is_reserved_column(&cleaned) || write_columns.contains(&cleaned) {
                dropped_columns.push(raw.clone());
                continue;
            }
            if !destination_columns.iter().any(|c| c == &cleaned) {
                dropped_columns.push(raw.clone());
                continue;
            }
            raw_names.push(raw);
            write_columns.push(cleaned);
        }

        if !dropped_columns.is_empty() {
            warn!(
                dropped = ?dropped_columns,
                "fields without a destination column are not written"
            );
        }

        if self.truncate_before_insert {
            info!(%table, "truncating destination table before insert");
            sink.truncate(table)
                .await
                .map_err(|e| SyncError::write(format!("truncating '{table}': {e}")))?;
        }

        let synced_at = Utc::now().format(SYNCED_AT_FORMAT).to_string();

        let rows: Vec<Vec<FieldValue>> = result
            .records()
            .iter()
            .map(|record| {
                let mut row = Vec::with_capacity(write_columns.len());
                row.push(FieldValue::Text(synced_at.clone()));
                row.push(FieldValue::Text(sync_run_id.to_string()));
                for raw in &raw_names {
                    row.push(record.get(*raw).cloned().unwrap_or(FieldValue::Null));
                }
                row
            })
            .collect();

        let mut written = 0u64;
        for batch in rows.chunks(self.batch_size) {
            cancel.check()?;

            let count = sink
                .insert_batch(table, &write_columns, batch)
                .await
                .map_err(|e| SyncError::write(format!("batch insert into '{table}': {e}")))?;

            written += count;
            debug!(batch_rows = batch.len(), total = written, "batch committed");
        }

        Ok(WriteReport {
            rows_written: written,
            dropped_columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use listmirror_core::record::ListRecord;

    use crate::schema::ColumnDef;

    /// In-memory sink recording every batch it receives.
    struct RecordingSink {
        columns: Vec<String>,
        batches: Vec<usize>,
        truncated: bool,
        fail_on_batch: Option<usize>,
    }

    impl RecordingSink {
        fn with_columns(columns: &[&str]) -> Self {
            Self {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                batches: Vec::new(),
                truncated: false,
                fail_on_batch: None,
            }
        }
    }

    #[async_trait]
    impl TableSink for RecordingSink {
        fn display_name(&self) -> &str {
            "recording"
        }

        async fn test_connection(&mut self) -> SyncResult<()> {
            Ok(())
        }

        async fn table_exists(&mut self, _table: &str) -> SyncResult<bool> {
            Ok(true)
        }

        async fn table_columns(&mut self, _table: &str) -> SyncResult<Vec<String>> {
            Ok(self.columns.clone())
        }

        async fn create_table(
            &mut self,
            _table: &str,
            _columns: &[ColumnDef],
        ) -> SyncResult<()> {
            Ok(())
        }

        async fn truncate(&mut self, _table: &str) -> SyncResult<()> {
            self.truncated = true;
            Ok(())
        }

        async fn insert_batch(
            &mut self,
            _table: &str,
            _columns: &[String],
            rows: &[Vec<FieldValue>],
        ) -> SyncResult<u64> {
            if self.fail_on_batch == Some(self.batches.len()) {
                return Err(SyncError::database("batch rejected"));
            }
            self.batches.push(rows.len());
            Ok(rows.len() as u64)
        }
    }

    fn result_with(count: i64) -> TabularResult {
        let mut result = TabularResult::new();
        for i in 0..count {
            let mut record = ListRecord::new();
            record.insert("n".to_string(), FieldValue::Int(i));
            result.push(record);
        }
        result
    }

    fn system_columns() -> Vec<&'static str> {
        vec!["row_id", SYNCED_AT_COLUMN, SYNC_RUN_ID_COLUMN, "n"]
    }

    #[tokio::test]
    async fn test_120_records_at_batch_50_issue_three_batches() {
        let mut sink = RecordingSink::with_columns(&system_columns());
        let result = result_with(120);

        let report = TableWriter::new(50, false)
            .write(&mut sink, &result, "t", "sync_1", &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(sink.batches, vec![50, 50, 20]);
        assert_eq!(report.rows_written, 120);
    }

    #[tokio::test]
    async fn test_rows_carry_system_values() {
        let mut sink = RecordingSink::with_columns(&system_columns());
        let result = result_with(1);

        TableWriter::new(10, false)
            .write(&mut sink, &result, "t", "sync_9", &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(sink.batches, vec![1]);
    }

    #[tokio::test]
    async fn test_truncate_runs_before_insert() {
        let mut sink = RecordingSink::with_columns(&system_columns());
        let result = result_with(2);

        TableWriter::new(10, true)
            .write(&mut sink, &result, "t", "sync_1", &CancelFlag::new())
            .await
            .unwrap();

        assert!(sink.truncated);
    }

    #[tokio::test]
    async fn test_batch_failure_aborts_remaining_batches() {
        let mut sink = RecordingSink::with_columns(&system_columns());
        sink.fail_on_batch = Some(1);
        let result = result_with(30);

        let err = TableWriter::new(10, false)
            .write(&mut sink, &result, "t", "sync_1", &CancelFlag::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Write { .. }));
        // First batch committed and stays committed; the rest never ran.
        assert_eq!(sink.batches, vec![10]);
    }

    #[test]
    fn test_writer_clamps_zero_batch_size() {
        let writer = TableWriter::new(0, false);
        assert_eq!(writer.batch_size, 1);
    }
}
