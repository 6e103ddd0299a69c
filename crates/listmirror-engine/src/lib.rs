//! Sync orchestration for listmirror.
//!
//! [`SyncEngine`] is the host-facing entry point: it enforces the
//! one-run-at-a-time rule, owns the cross-run token cache, and spawns a
//! worker task per run. [`SyncOrchestrator`] drives one run through its
//! phases, publishing progress/log/status events and honoring cooperative
//! cancellation.

pub mod cache;
pub mod engine;
pub mod orchestrator;

pub use cache::ConnectionCache;
pub use engine::{ConnectionReport, SyncEngine};
pub use orchestrator::SyncOrchestrator;
