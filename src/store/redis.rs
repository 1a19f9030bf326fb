//! Redis-backed counter store for multi-process deployments.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

use super::{CounterStore, LockedRead, StoreError};

/// Redis-backed counter store.
///
/// Each protocol step runs as one MULTI/EXEC pipeline, so the operations in a
/// batch execute back to back with no other client's write interleaved and
/// their results come back in submitted order.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Wrap an existing multiplexed connection.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Connect to a Redis server by URL, e.g. `redis://127.0.0.1/`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn read_and_lock(
        &self,
        key: &str,
        lock_key: &str,
        lock_ttl: Duration,
    ) -> Result<LockedRead, StoreError> {
        let mut conn = self.conn.clone();

        let (value, ttl_ms, locked, _expiry_set): (Option<i64>, i64, bool, bool) = redis::pipe()
            .atomic()
            .get(key)
            .pttl(key)
            .set_nx(lock_key, 1)
            .cmd("PEXPIRE")
            .arg(lock_key)
            .arg(lock_ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

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
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .del(lock_key)
            .ignore()
            .cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(expiry.as_millis() as u64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance on the default port.
    // Run with: cargo test -- --ignored

    const LOCK_TTL: Duration = Duration::from_millis(300);

    async fn connect() -> RedisStore {
        RedisStore::connect("redis://127.0.0.1/")
            .await
            .expect("redis not reachable")
    }

    #[tokio::test]
    #[ignore]
    async fn test_lock_round_trip() {
        let store = connect().await;
        let key = "floodgate:test:lock-round-trip";
        let lock_key = "floodgate:test:lock-round-trip:lock";

        let first = store.read_and_lock(key, lock_key, LOCK_TTL).await.unwrap();
        assert!(first.locked);

        let second = store.read_and_lock(key, lock_key, LOCK_TTL).await.unwrap();
        assert!(!second.locked);

        store
            .write_and_unlock(key, lock_key, 9, Duration::from_secs(1))
            .await
            .unwrap();

        let third = store.read_and_lock(key, lock_key, LOCK_TTL).await.unwrap();
        assert!(third.locked);
        assert_eq!(third.value, Some(9));
        assert!(third.ttl_ms > 0 && third.ttl_ms <= 1_000);

        store
            .write_and_unlock(key, lock_key, 0, Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_counter_key_expires() {
        let store = connect().await;
        let key = "floodgate:test:counter-expiry";
        let lock_key = "floodgate:test:counter-expiry:lock";

        store
            .write_and_unlock(key, lock_key, 3, Duration::from_millis(50))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        let read = store.read_and_lock(key, lock_key, LOCK_TTL).await.unwrap();
        assert_eq!(read.value, None);
        assert!(read.ttl_ms < 0);
    }
}
