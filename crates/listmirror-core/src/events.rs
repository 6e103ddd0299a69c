//! Progress, log and status events published by the sync engine.
//!
//! The engine publishes to a bounded channel and the host drains it; this
//! keeps the core decoupled from any UI toolkit's threading model.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::run::SyncStats;

/// Severity level attached to progress and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// External service a status event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    SharePoint,
    Database,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::SharePoint => write!(f, "sharepoint"),
            ServiceKind::Database => write!(f, "database"),
        }
    }
}

/// Connection state of an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Event emitted by the sync engine for host consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Phase-checkpoint progress update, percent in 0..=100.
    Progress {
        message: String,
        percent: u8,
        level: LogLevel,
    },
    /// Free-form log line.
    Log { message: String, level: LogLevel },
    /// Connection state change for an external service.
    Status {
        service: ServiceKind,
        state: ServiceState,
    },
    /// Terminal event; emitted exactly once per sync attempt.
    Completed {
        success: bool,
        message: String,
        stats: SyncStats,
    },
}

/// Publishing half of the engine's event channel.
///
/// Cloneable; sends are best-effort - if the host has dropped its receiver
/// the event is discarded rather than failing the sync.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<SyncEvent>,
}

impl EventBus {
    /// Default bound for the event channel.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a bus and the receiver the host drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Publish an event, waiting while the channel is full.
    pub async fn publish(&self, event: SyncEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("event receiver dropped, discarding event");
        }
    }

    /// Emit a progress checkpoint.
    pub async fn progress(&self, message: impl Into<String>, percent: u8, level: LogLevel) {
        self.publish(SyncEvent::Progress {
            message: message.into(),
            percent: percent.min(100),
            level,
        })
        .await;
    }

    /// Emit a log line.
    pub async fn log(&self, message: impl Into<String>, level: LogLevel) {
        self.publish(SyncEvent::Log {
            message: message.into(),
            level,
        })
        .await;
    }

    /// Emit a service status change.
    pub async fn status(&self, service: ServiceKind, state: ServiceState) {
        self.publish(SyncEvent::Status { service, state }).await;
    }

    /// Emit the terminal completion event.
    pub async fn completed(&self, success: bool, message: impl Into<String>, stats: SyncStats) {
        self.publish(SyncEvent::Completed {
            success,
            message: message.into(),
            stats,
        })
        .await;
    }
}
