//! Keyed per-entity async locks.
//!
//! Operations on the same model id (deploy vs undeploy vs delete) or
//! the same hostname must not interleave, while different entities
//! proceed independently. `KeyedLocks` maps an entity key to a shared
//! `tokio::sync::Mutex` and hands out owned guards, so release happens
//! on every exit path including panics and early returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A table of named async mutexes, one per entity key.
///
/// Lock entries are created lazily on first use and kept for the life
/// of the table; the population is bounded by the number of live
/// entities (model ids / hostnames).
#[derive(Default, Clone)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().expect("keyed lock table poisoned");
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Drop the entry for a destroyed entity.
    pub fn forget(&self, key: &str) {
        let mut locks = self.locks.lock().expect("keyed lock table poisoned");
        locks.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = KeyedLocks::new();
        let in_section = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("model-1").await;
                assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("model-a").await;
        // Would deadlock if keys shared a mutex.
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock("model-b"))
            .await
            .expect("independent key blocked");
    }
}
