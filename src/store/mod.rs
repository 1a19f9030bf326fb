//! Counter store abstraction and adapters.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result of a [`CounterStore::read_and_lock`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedRead {
    /// Current counter value, if the key exists.
    pub value: Option<i64>,
    /// Remaining lifetime of the counter key in milliseconds. Negative when
    /// the key is absent or carries no expiry, matching Redis PTTL.
    pub ttl_ms: i64,
    /// Whether this caller acquired the lock key.
    pub locked: bool,
}

/// Errors raised by a counter store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A Redis command or transport failure
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The atomic operations the limiter needs from the shared store.
///
/// Each method must execute as a single atomic batch with respect to other
/// clients of the same store: no other client's write may land between the
/// operations inside one call. That atomicity is what keeps one holder's
/// read-decrement-write sequence from being corrupted by a concurrent writer.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// In one batch: read the counter value, read its remaining lifetime, and
    /// try to claim the lock key if nobody else holds it.
    ///
    /// The lock key's expiry is applied whether or not this caller won it, so
    /// a holder that crashes before releasing cannot block others for longer
    /// than `lock_ttl`.
    async fn read_and_lock(
        &self,
        key: &str,
        lock_key: &str,
        lock_ttl: Duration,
    ) -> Result<LockedRead, StoreError>;

    /// In one batch: release the lock key and persist the counter with a
    /// fresh expiry.
    async fn write_and_unlock(
        &self,
        key: &str,
        lock_key: &str,
        value: i64,
        expiry: Duration,
    ) -> Result<(), StoreError>;
}
