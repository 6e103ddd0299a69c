//! Host-facing sync engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use listmirror_core::cancel::CancelFlag;
use listmirror_core::config::SyncSettings;
use listmirror_core::error::SyncResult;
use listmirror_core::events::{EventBus, LogLevel, ServiceKind, ServiceState};
use listmirror_core::run::SyncRun;
use listmirror_db::sink;
use listmirror_sharepoint::{SharePointClient, TokenCache};

use crate::cache::ConnectionCache;
use crate::orchestrator::SyncOrchestrator;

/// How long a cached token cache stays associated with a credential set.
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

struct ActiveRun {
    cancel: CancelFlag,
    handle: JoinHandle<SyncRun>,
}

/// Result of testing both external connections.
#[derive(Debug)]
pub struct ConnectionReport {
    pub sharepoint: SyncResult<()>,
    pub database: SyncResult<()>,
}

impl ConnectionReport {
    /// True when both services answered.
    pub fn all_connected(&self) -> bool {
        self.sharepoint.is_ok() && self.database.is_ok()
    }
}

/// Owns the worker lifecycle: one sync run at a time, cooperative stop,
/// and the cross-run token cache.
pub struct SyncEngine {
    events: EventBus,
    token_caches: ConnectionCache<Arc<TokenCache>>,
    active: Mutex<Option<ActiveRun>>,
}

impl SyncEngine {
    /// Create an engine publishing to the given event bus.
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            token_caches: ConnectionCache::new(TOKEN_CACHE_TTL),
            active: Mutex::new(None),
        }
    }

    /// Check whether a run is currently active.
    pub fn is_running(&self) -> bool {
        let active = self.active.lock().expect("engine state poisoned");
        active
            .as_ref()
            .map(|run| !run.handle.is_finished())
            .unwrap_or(false)
    }

    /// Start a sync run.
    ///
    /// Returns `Ok(true)` when a worker was spawned and `Ok(false)` when a
    /// run is already active (reported as a warning event, not an error;
    /// start requests are rejected, never queued). Configuration problems
    /// fail with a config error before any worker starts, after emitting a
    /// failure completion event for event-only hosts.
    #[instrument(skip(self, settings))]
    pub async fn start(&self, settings: SyncSettings) -> SyncResult<bool> {
        if self.is_running() {
            warn!("sync already in progress, rejecting start request");
            self.events
                .log("Synchronization already in progress", LogLevel::Warning)
                .await;
            return Ok(false);
        }

        if let Err(e) = settings.validate() {
            self.events
                .log(format!("Configuration invalid: {e}"), LogLevel::Error)
                .await;
            self.events
                .completed(
                    false,
                    format!("Configuration invalid: {e}"),
                    Default::default(),
                )
                .await;
            return Err(e);
        }

        let token_cache = self.token_cache_for(&settings)?;

        let cancel = CancelFlag::new();
        let orchestrator = SyncOrchestrator::new(
            settings,
            self.events.clone(),
            cancel.clone(),
            token_cache,
        );

        let handle = tokio::spawn(async move { orchestrator.run().await });

        let mut active = self.active.lock().expect("engine state poisoned");
        *active = Some(ActiveRun { cancel, handle });

        info!("sync worker started");
        Ok(true)
    }

    /// Request cooperative cancellation of the active run, if any.
    ///
    /// Returns whether a run was active. The worker observes the flag at
    /// its next checkpoint; in-flight calls are not aborted.
    pub async fn stop(&self) -> bool {
        let flagged = {
            let active = self.active.lock().expect("engine state poisoned");
            match active.as_ref() {
                Some(run) if !run.handle.is_finished() => {
                    run.cancel.cancel();
                    true
                }
                _ => false,
            }
        };

        if flagged {
            self.events
                .log("Stopping synchronization", LogLevel::Warning)
                .await;
        } else {
            self.events
                .log("No active synchronization to stop", LogLevel::Info)
                .await;
        }
        flagged
    }

    /// Wait for the active run to reach its terminal phase.
    ///
    /// Returns `None` when no run is active.
    pub async fn wait(&self) -> Option<SyncRun> {
        let run = {
            let mut active = self.active.lock().expect("engine state poisoned");
            active.take()
        }?;

        match run.handle.await {
            Ok(sync_run) => Some(sync_run),
            Err(e) => {
                // A panicking worker still must not poison the engine.
                warn!("sync worker task failed: {e}");
                None
            }
        }
    }

    /// Test both external connections, emitting status events.
    #[instrument(skip(self, settings))]
    pub async fn test_connections(&self, settings: &SyncSettings) -> ConnectionReport {
        let events = &self.events;

        events
            .status(ServiceKind::SharePoint, ServiceState::Connecting)
            .await;
        let sharepoint = match self.token_cache_for(settings) {
            Ok(token_cache) => match SharePointClient::new(settings.sharepoint.clone(), token_cache)
            {
                Ok(client) => client.test_connection().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        events
            .status(
                ServiceKind::SharePoint,
                if sharepoint.is_ok() {
                    ServiceState::Connected
                } else {
                    ServiceState::Error
                },
            )
            .await;

        events
            .status(ServiceKind::Database, ServiceState::Connecting)
            .await;
        let database = match sink::connect(&settings.database).await {
            Ok(mut sink) => sink.test_connection().await,
            Err(e) => Err(e),
        };
        events
            .status(
                ServiceKind::Database,
                if database.is_ok() {
                    ServiceState::Connected
                } else {
                    ServiceState::Error
                },
            )
            .await;

        ConnectionReport {
            sharepoint,
            database,
        }
    }

    /// Reset cached connectors, forcing fresh ones on the next run.
    pub fn reset_connections(&self) {
        self.token_caches.reset();
    }

    fn token_cache_for(&self, settings: &SyncSettings) -> SyncResult<Arc<TokenCache>> {
        self.token_caches
            .get_or_create(&settings.sharepoint.fingerprint(), || {
                TokenCache::new(settings.sharepoint.clone()).map(Arc::new)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use listmirror_core::config::{
        DatabaseSettings, SharePointSettings, SqliteSettings, DEFAULT_AUTHORITY,
    };
    use listmirror_core::error::SyncError;
    use listmirror_core::events::SyncEvent;

    fn settings() -> SyncSettings {
        SyncSettings {
            sharepoint: SharePointSettings {
                tenant_id: "tenant".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string().into(),
                site_url: "https://contoso.sharepoint.com/sites/Ops".to_string(),
                list_name: "Tasks".to_string(),
                authority: DEFAULT_AUTHORITY.to_string(),
                page_size: None,
                page_delay_ms: 0,
                connection_timeout_secs: 5,
                max_retries: 0,
            },
            database: DatabaseSettings::Sqlite(SqliteSettings {
                file: PathBuf::from("/tmp/never-created.db"),
            }),
            table_name: "tasks".to_string(),
            create_table: true,
            truncate_before_insert: false,
            batch_size: 500,
            sync_interval_secs: None,
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_spawn() {
        let (events, mut rx) = EventBus::channel(16);
        let engine = SyncEngine::new(events);

        let mut bad = settings();
        bad.sharepoint.tenant_id = String::new();

        let err = engine.start(bad).await.unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
        assert!(!engine.is_running());

        // Event-only hosts still see a terminal completion.
        let mut saw_completion = false;
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::Completed { success, .. } = event {
                saw_completion = true;
                assert!(!success);
            }
        }
        assert!(saw_completion);
    }

    #[tokio::test]
    async fn test_stop_without_active_run() {
        let (events, _rx) = EventBus::channel(16);
        let engine = SyncEngine::new(events);

        assert!(!engine.stop().await);
        assert!(engine.wait().await.is_none());
    }
}
