//! Per-key advisory locks.
//!
//! Colliding creates on one node queue here instead of racing to the store.
//! The store's unique constraint still decides the outcome; these locks
//! only cut down on wasted transactions.

use std::sync::Arc;

use dashmap::DashMap;
use kc_model::UniquenessKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by [`UniquenessKey`].
///
/// Entries are removed when the last holder or waiter lets go, so the table
/// only grows with the number of keys in flight.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<UniquenessKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &UniquenessKey) -> KeyGuard<'_> {
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Holds a key lock until dropped.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: UniquenessKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: nobody holds or waits.
        self.locks
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
