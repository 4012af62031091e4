//! Keyed mutual exclusion.
//!
//! The supervisor serializes start and crash handling per worker role.
//! Operations on the same key wait on each other; different keys never
//! contend. Acquisition only waits, it cannot fail.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of cooperative async mutexes, created lazily per key.
///
/// Guards release on drop. The lock entries themselves are kept for the
/// lifetime of the map: a handful of long-lived keys, never unbounded.
pub struct KeyedLock<K> {
    locks: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::new()
    }
}
