//! Cooperative cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};

/// Shared cancellation flag checked at phase boundaries and between
/// pages/batches. Cancellation is cooperative: an in-flight HTTP or
/// database call is allowed to finish before the flag is observed.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a new, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checkpoint: return [`SyncError::Cancelled`] if the flag is set.
    pub fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unset() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.check().unwrap();
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();

        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(SyncError::Cancelled)));
    }
}
