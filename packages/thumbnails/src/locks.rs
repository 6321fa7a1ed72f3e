use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

type Key = (String, String);

/// Per-`(source, size)` mutual exclusion for generation.
///
/// Entries live only while someone holds or waits for them.
#[derive(Debug, Clone, Default)]
pub struct GenerationLocks {
    locks: Arc<DashMap<Key, Arc<Mutex<()>>>>,
}

impl GenerationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a pair.
    pub async fn acquire(&self, source_id: &str, size: &str) -> GenerationGuard {
        let key = (source_id.to_string(), size.to_string());
        // Cloned under the shard lock so release cannot drop an entry someone waits on.
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        trace!(source_id, size, "Generation lock acquired");

        GenerationGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(guard),
        }
    }

    /// Number of pairs currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held lock for one pair. Releasing it drops the entry when nobody waits.
#[derive(Debug)]
pub struct GenerationGuard {
    locks: Arc<DashMap<Key, Arc<Mutex<()>>>>,
    key: Key,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
