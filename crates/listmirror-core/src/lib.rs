//! # listmirror-core
//!
//! Shared foundation for the listmirror synchronization engine.
//!
//! This crate defines the types every other listmirror crate speaks:
//!
//! - [`error`] - Error taxonomy with transient/permanent classification
//! - [`retry`] - Retry policy with exponential backoff
//! - [`record`] - Dynamically-typed list records and tabular results
//! - [`naming`] - Column-name cleaning for storage-layer identifiers
//! - [`events`] - Progress/log/status events and the bounded event bus
//! - [`run`] - Sync-run state machine phases and statistics
//! - [`config`] - Configuration types consumed by the engine

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod naming;
pub mod record;
pub mod retry;
pub mod run;

pub use cancel::CancelFlag;
pub use config::{
    DatabaseSettings, SharePointSettings, SqlServerSettings, SqliteSettings, SyncSettings,
};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, LogLevel, ServiceKind, ServiceState, SyncEvent};
pub use naming::clean_column_name;
pub use record::{FieldValue, ListRecord, TabularResult};
pub use retry::{RetryConfig, RetryExecutor};
pub use run::{SyncPhase, SyncRun, SyncStats};
