//! Single-slot connector memoization.
//!
//! Recreating connectors (token caches, pools) on every scheduled run
//! throws away warm state; one slot is enough because only one sync target
//! is active per engine instance.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use listmirror_core::error::SyncResult;

struct CacheEntry<T> {
    fingerprint: String,
    created_at: Instant,
    value: T,
}

/// Memoizes one live connector per configuration fingerprint, with a TTL.
///
/// A lookup with a different fingerprint, or past the TTL, drops the
/// cached value and creates a fresh one.
pub struct ConnectionCache<T> {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone> ConnectionCache<T> {
    /// Create a cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Return the cached value for `fingerprint`, creating it if the slot
    /// is empty, stale, or keyed by a different configuration.
    pub fn get_or_create<F>(&self, fingerprint: &str, create: F) -> SyncResult<T>
    where
        F: FnOnce() -> SyncResult<T>,
    {
        let mut slot = self.entry.lock().expect("connection cache poisoned");

        if let Some(entry) = slot.as_ref() {
            if entry.fingerprint == fingerprint && entry.created_at.elapsed() < self.ttl {
                debug!("reusing cached connector");
                return Ok(entry.value.clone());
            }
        }

        debug!("creating fresh connector");
        let value = create()?;
        *slot = Some(CacheEntry {
            fingerprint: fingerprint.to_string(),
            created_at: Instant::now(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// Drop the cached value, forcing re-creation on next use.
    pub fn reset(&self) {
        let mut slot = self.entry.lock().expect("connection cache poisoned");
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_same_fingerprint_reuses() {
        let cache = ConnectionCache::new(Duration::from_secs(60));
        let creations = AtomicUsize::new(0);

        let first: i32 = cache
            .get_or_create("fp-a", || {
                creations.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .unwrap();
        let second: i32 = cache
            .get_or_create("fp-a", || {
                creations.fetch_add(1, Ordering::SeqCst);
                Ok(8)
            })
            .unwrap();

        assert_eq!(first, 7);
        assert_eq!(second, 7);
        assert_eq!(creations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_fingerprint_recreates() {
        let cache = ConnectionCache::new(Duration::from_secs(60));

        let first: i32 = cache.get_or_create("fp-a", || Ok(1)).unwrap();
        let second: i32 = cache.get_or_create("fp-b", || Ok(2)).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_expired_entry_recreates() {
        let cache = ConnectionCache::new(Duration::from_millis(0));

        let first: i32 = cache.get_or_create("fp-a", || Ok(1)).unwrap();
        let second: i32 = cache.get_or_create("fp-a", || Ok(2)).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_reset_clears_slot() {
        let cache = ConnectionCache::new(Duration::from_secs(60));

        let _: i32 = cache.get_or_create("fp-a", || Ok(1)).unwrap();
        cache.reset();
        let second: i32 = cache.get_or_create("fp-a", || Ok(2)).unwrap();

        assert_eq!(second, 2);
    }

    #[test]
    fn test_create_failure_leaves_slot_empty() {
        let cache = ConnectionCache::new(Duration::from_secs(60));

        let err: SyncResult<i32> = cache.get_or_create("fp-a", || {
            Err(listmirror_core::SyncError::config("nope"))
        });
        assert!(err.is_err());

        let value: i32 = cache.get_or_create("fp-a", || Ok(3)).unwrap();
        assert_eq!(value, 3);
    }
}
