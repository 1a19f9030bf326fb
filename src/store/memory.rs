//! In-memory counter store for tests and single-process deployments.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{CounterStore, LockedRead, StoreError};

/// In-memory counter store.
///
/// Implements the same batch semantics as the Redis adapter, lock key
/// included, so the limiter's full protocol runs against it unchanged. State
/// is process-local; use [`super::RedisStore`] when limits must be shared
/// across processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a live key, primarily for assertions in tests.
    pub fn value(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn read_and_lock(
        &self,
        key: &str,
        lock_key: &str,
        lock_ttl: Duration,
    ) -> Result<LockedRead, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        // Lazy expiry: drop dead keys before the reads see them.
        entries.retain(|_, entry| !entry.is_expired(now));

        let (value, ttl_ms) = match entries.get(key) {
            Some(entry) => {
                let ttl_ms = match entry.expires_at {
                    Some(at) => at.duration_since(now).as_millis() as i64,
                    None => -1,
                };
                (Some(entry.value), ttl_ms)
            }
            None => (None, -2),
        };

        let locked = match entries.entry(lock_key.to_string()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(slot) => {
                slot.insert(StoredEntry {
                    value: 1,
                    expires_at: None,
                });
                true
            }
        };

        // The lock expiry applies regardless of who holds it.
        if let Some(entry) = entries.get_mut(lock_key) {
            entry.expires_at = Some(now + lock_ttl);
        }

        Ok(LockedRead {
            value,
            ttl_ms,
            locked,
        })
    }

    async fn write_and_unlock(
        &self,
        key: &str,
        lock_key: &str,
        value: i64,
        expiry: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        entries.remove(lock_key);
        entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: Some(now + expiry),
            },
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    const LOCK_TTL: Duration = Duration::from_millis(300);

    #[tokio::test]
    async fn test_absent_key_reads_negative_ttl() {
        let store = MemoryStore::new();

        let read = assert_ok!(store.read_and_lock("counter", "counter:lock", LOCK_TTL).await);

        assert_eq!(read.value, None);
        assert!(read.ttl_ms < 0);
        assert!(read.locked);
    }

    #[tokio::test]
    async fn test_second_locker_is_excluded() {
        let store = MemoryStore::new();

        let first = store
            .read_and_lock("counter", "counter:lock", LOCK_TTL)
            .await
            .unwrap();
        let second = store
            .read_and_lock("counter", "counter:lock", LOCK_TTL)
            .await
            .unwrap();

        assert!(first.locked);
        assert!(!second.locked);
    }

    #[tokio::test]
    async fn test_lock_expires_after_ttl() {
        let store = MemoryStore::new();
        let lock_ttl = Duration::from_millis(40);

        let first = store
            .read_and_lock("counter", "counter:lock", lock_ttl)
            .await
            .unwrap();
        assert!(first.locked);

        tokio::time::sleep(Duration::from_millis(80)).await;

        // A crashed holder's lock self-expires, so a new caller gets in.
        let second = store
            .read_and_lock("counter", "counter:lock", lock_ttl)
            .await
            .unwrap();
        assert!(second.locked);
    }

    #[tokio::test]
    async fn test_write_releases_lock_and_persists() {
        let store = MemoryStore::new();

        store
            .read_and_lock("counter", "counter:lock", LOCK_TTL)
            .await
            .unwrap();
        assert_ok!(
            store
                .write_and_unlock("counter", "counter:lock", 5, Duration::from_secs(1))
                .await
        );

        let read = store
            .read_and_lock("counter", "counter:lock", LOCK_TTL)
            .await
            .unwrap();
        assert_eq!(read.value, Some(5));
        assert!(read.ttl_ms > 0 && read.ttl_ms <= 1_000);
        assert!(read.locked, "lock should have been released by the write");
    }

    #[tokio::test]
    async fn test_counter_expires() {
        let store = MemoryStore::new();

        store
            .write_and_unlock("counter", "counter:lock", 3, Duration::from_millis(40))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let read = store
            .read_and_lock("counter", "counter:lock", LOCK_TTL)
            .await
            .unwrap();
        assert_eq!(read.value, None);
        assert!(read.ttl_ms < 0);
        assert_eq!(store.value("counter"), None);
    }
}
