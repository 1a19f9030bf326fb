//! Floodgate - Distributed Fixed-Window Rate Limiting
//!
//! This crate implements a fixed-window rate limiter whose counters live in a
//! shared key-value store, so that independent processes enforce one logical
//! limit per identifier. Cross-process mutual exclusion is best-effort: a
//! TTL'd lock key claimed with a conditional set, bounded retry under
//! contention, and window rollover driven by the counter key's own expiry.
//! There is no consensus protocol and no true distributed lock manager.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use floodgate::{LimiterConfig, RateLimiter, RedisStore};
//!
//! # async fn demo() -> floodgate::Result<()> {
//! let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await?);
//! let limiter = RateLimiter::new(
//!     store,
//!     LimiterConfig::new("api-key-123", 100, Duration::from_secs(60)),
//! )?;
//!
//! let status = limiter.withdraw().await?;
//! if status.remaining < 0 {
//!     // limit exceeded until status.reset_at
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod limiter;
pub mod store;

pub use config::LimiterConfig;
pub use error::{RateLimitError, Result};
pub use limiter::{RateLimitStatus, RateLimiter};
pub use store::{CounterStore, MemoryStore, RedisStore, StoreError};
