//! One sync run, driven through its phases.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use listmirror_core::cancel::CancelFlag;
use listmirror_core::config::SyncSettings;
use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::events::{EventBus, LogLevel, ServiceKind, ServiceState};
use listmirror_core::run::{SyncPhase, SyncRun};
use listmirror_db::writer::TableWriter;
use listmirror_db::{schema, sink};
use listmirror_sharepoint::{ListFetcher, SharePointClient, TokenCache};

/// Sequences authentication, fetch, schema reconciliation and write for
/// one run, emitting progress at fixed checkpoints.
///
/// Progress is checkpoint-based: the paginated API does not report a
/// total row count up front, so per-row percentages are not possible.
pub struct SyncOrchestrator {
    settings: SyncSettings,
    events: EventBus,
    cancel: CancelFlag,
    token_cache: Arc<TokenCache>,
}

impl SyncOrchestrator {
    /// Create an orchestrator for one run.
    ///
    /// The token cache is injected so the host can share it across runs;
    /// everything else is owned per run.
    pub fn new(
        settings: SyncSettings,
        events: EventBus,
        cancel: CancelFlag,
        token_cache: Arc<TokenCache>,
    ) -> Self {
        Self {
            settings,
            events,
            cancel,
            token_cache,
        }
    }

    /// Execute the run to a terminal phase.
    ///
    /// Never panics through and never leaves the run mid-phase: any error
    /// becomes a `Failed` (or `Cancelled`) terminal, and exactly one
    /// completion event is emitted.
    #[instrument(skip(self), fields(list = %self.settings.sharepoint.list_name, table = %self.settings.table_name))]
    pub async fn run(&self) -> SyncRun {
        let mut run = SyncRun::begin();
        info!(run_id = %run.id, "sync run starting");

        match self.execute(&mut run).await {
            Ok(message) => {
                run.finish(SyncPhase::Completed, None);
                self.events
                    .progress("Synchronization complete", 100, LogLevel::Success)
                    .await;
                info!(run_id = %run.id, duration = run.stats.duration_seconds, "sync run completed");
                self.events
                    .completed(true, message, run.stats.clone())
                    .await;
            }
            Err(SyncError::Cancelled) => {
                run.enter(SyncPhase::Cancelling);
                run.finish(SyncPhase::Cancelled, None);
                warn!(run_id = %run.id, "sync run cancelled");
                self.events
                    .log("Synchronization cancelled", LogLevel::Warning)
                    .await;
                self.events
                    .completed(false, "Synchronization cancelled", run.stats.clone())
                    .await;
            }
            Err(e) => {
                let message = format!("Synchronization failed: {e}");
                run.finish(SyncPhase::Failed, Some(e.to_string()));
                error!(run_id = %run.id, error = %e, code = e.error_code(), "sync run failed");
                self.events.log(&message, LogLevel::Error).await;
                self.events
                    .completed(false, message, run.stats.clone())
                    .await;
            }
        }

        run
    }

    /// The phase sequence. Returns the success message for the completion
    /// event; any error aborts the remaining phases.
    async fn execute(&self, run: &mut SyncRun) -> SyncResult<String> {
        let events = &self.events;

        self.cancel.check()?;
        events
            .progress("Starting synchronization", 5, LogLevel::Info)
            .await;

        // Authentication
        run.enter(SyncPhase::Authenticating);
        events
            .progress("Connecting to SharePoint", 15, LogLevel::Info)
            .await;
        events
            .status(ServiceKind::SharePoint, ServiceState::Connecting)
            .await;

        let client = SharePointClient::new(
            self.settings.sharepoint.clone(),
            Arc::clone(&self.token_cache),
        )?;

        if let Err(e) = client.test_connection().await {
            events
                .status(ServiceKind::SharePoint, ServiceState::Error)
                .await;
            return Err(e);
        }
        events
            .status(ServiceKind::SharePoint, ServiceState::Connected)
            .await;

        // Fetch
        self.cancel.check()?;
        run.enter(SyncPhase::Fetching);
        events
            .progress("Downloading list items", 30, LogLevel::Info)
            .await;

        let fetcher = ListFetcher::new(self.settings.sharepoint.clone(), client);
        let result = fetcher.fetch(&self.cancel).await?;
        run.stats.records_processed = result.len() as u64;

        if result.is_empty() {
            events
                .progress("No records to synchronize", 50, LogLevel::Warning)
                .await;
            return Ok("No records to synchronize".to_string());
        }

        events
            .progress(
                format!("Fetched {} records", result.len()),
                50,
                LogLevel::Success,
            )
            .await;

        // Schema reconciliation
        self.cancel.check()?;
        run.enter(SyncPhase::ReconcilingSchema);
        events
            .progress("Connecting to database", 60, LogLevel::Info)
            .await;
        events
            .status(ServiceKind::Database, ServiceState::Connecting)
            .await;

        let mut sink = match sink::connect(&self.settings.database).await {
            Ok(sink) => sink,
            Err(e) => {
                events
                    .status(ServiceKind::Database, ServiceState::Error)
                    .await;
                return Err(e);
            }
        };
        events
            .status(ServiceKind::Database, ServiceState::Connected)
            .await;

        events
            .progress("Preparing destination table", 70, LogLevel::Info)
            .await;

        let created = schema::ensure_table(
            sink.as_mut(),
            &result,
            &self.settings.table_name,
            self.settings.create_table,
        )
        .await?;
        if created {
            events
                .log(
                    format!("Created table '{}'", self.settings.table_name),
                    LogLevel::Info,
                )
                .await;
        }

        // Write
        self.cancel.check()?;
        run.enter(SyncPhase::Writing);
        events
            .progress("Writing records to database", 85, LogLevel::Info)
            .await;

        let writer = TableWriter::new(
            self.settings.batch_size,
            self.settings.truncate_before_insert,
        );
        let report = writer
            .write(
                sink.as_mut(),
                &result,
                &self.settings.table_name,
                &run.id,
                &self.cancel,
            )
            .await?;

        run.stats.records_inserted = report.rows_written;

        if !report.dropped_columns.is_empty() {
            events
                .log(
                    format!(
                        "Dropped fields without destination columns: {}",
                        report.dropped_columns.join(", ")
                    ),
                    LogLevel::Warning,
                )
                .await;
        }

        Ok(format!(
            "Synchronized {} records ({} written) to '{}'",
            run.stats.records_processed, report.rows_written, self.settings.table_name
        ))
    }
}
