//! Sync-run state: phases, statistics and run identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a synchronization run.
///
/// `Failed` is reachable from any non-terminal phase; `Cancelling` /
/// `Cancelled` form the cooperative-stop path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Authenticating,
    Fetching,
    ReconcilingSchema,
    Writing,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
}

impl SyncPhase {
    /// Check whether the phase is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Completed | SyncPhase::Failed | SyncPhase::Cancelled
        )
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Authenticating => "authenticating",
            SyncPhase::Fetching => "fetching",
            SyncPhase::ReconcilingSchema => "reconciling_schema",
            SyncPhase::Writing => "writing",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
            SyncPhase::Cancelling => "cancelling",
            SyncPhase::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Statistics for one synchronization run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// Records fetched from the remote list.
    #[serde(default)]
    pub records_processed: u64,
    /// Records written to the destination table.
    #[serde(default)]
    pub records_inserted: u64,
    /// Error count (0 or 1; the run stops on the first fatal error).
    #[serde(default)]
    pub errors: u64,
    /// Wall-clock duration in seconds.
    #[serde(default)]
    pub duration_seconds: f64,
    /// When the run started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the run reached a terminal phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// One end-to-end execution of fetch-then-write.
///
/// Created when a sync starts, mutated as phases complete, terminal once
/// completed, failed or cancelled - never reused across syncs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Run identifier, derived from the start timestamp.
    pub id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Current phase.
    pub phase: SyncPhase,
    /// Run statistics.
    pub stats: SyncStats,
    /// Failure message, present only in the `Failed` phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncRun {
    /// Start a new run stamped with the current time.
    pub fn begin() -> Self {
        let started_at = Utc::now();
        Self {
            id: format!("sync_{}", started_at.timestamp()),
            started_at,
            phase: SyncPhase::Idle,
            stats: SyncStats {
                start_time: Some(started_at),
                ..SyncStats::default()
            },
            error: None,
        }
    }

    /// Move to a new phase.
    pub fn enter(&mut self, phase: SyncPhase) {
        self.phase = phase;
    }

    /// Close the run in a terminal phase, stamping end time and duration.
    pub fn finish(&mut self, phase: SyncPhase, error: Option<String>) {
        debug_assert!(phase.is_terminal());
        let end = Utc::now();
        self.phase = phase;
        self.error = error;
        self.stats.end_time = Some(end);
        self.stats.duration_seconds =
            (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        if self.phase == SyncPhase::Failed {
            self.stats.errors = 1;
        }
    }
}
