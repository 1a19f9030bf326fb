//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::LimiterConfig;
use crate::error::{RateLimitError, Result};
use crate::store::{CounterStore, LockedRead};

/// Lifetime of the lock key; bounds how long a crashed holder blocks others.
const LOCK_TTL: Duration = Duration::from_millis(300);
/// Pause between contention retries.
const RETRY_DELAY: Duration = Duration::from_millis(20);
/// Maximum number of contention retries before a call fails.
const MAX_RETRIES: u32 = 4;

/// Outcome of a successful withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Maximum tokens per window.
    pub limit: u32,
    /// Tokens remaining after this call; negative once the limit is exceeded.
    pub remaining: i64,
    /// When the current window ends.
    pub reset_at: DateTime<Utc>,
}

/// Locally cached view of the window tracked in the store.
#[derive(Debug)]
struct WindowState {
    remaining: i64,
    reset_at: DateTime<Utc>,
}

impl WindowState {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.reset_at <= now
    }

    fn start_new_window(&mut self, now: DateTime<Utc>, window: chrono::Duration, limit: u32) {
        self.reset_at = now + window;
        self.remaining = i64::from(limit);
    }
}

/// A fixed-window rate limiter for one identifier, backed by a shared
/// counter store.
///
/// The store holds two keys per limiter: the counter itself, whose TTL is the
/// window's remaining lifetime, and a short-lived lock key claimed with a
/// conditional set while the counter is read, decremented, and written back.
/// Limiters in different processes may track the same identifier against the
/// same store; the lock key keeps their read-decrement-write sequences from
/// interleaving, and the counter key's own expiry signals window rollover.
///
/// The counter is persisted clamped at zero, but the reported remaining count
/// goes negative once the limit is exceeded. `-1` is how callers tell
/// "limit exceeded" apart from "limit exactly reached".
pub struct RateLimiter {
    config: LimiterConfig,
    store: Arc<dyn CounterStore>,
    storage_key: String,
    lock_key: String,
    /// Serializes local callers: at most one reconciliation in flight per
    /// instance. A caller that arrives mid-reconciliation waits, then
    /// re-evaluates against the updated cache.
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Create a limiter for one identifier.
    ///
    /// Fails with [`RateLimitError::Config`] on invalid input, before any
    /// store contact.
    pub fn new(store: Arc<dyn CounterStore>, config: LimiterConfig) -> Result<Self> {
        config.validate()?;

        let storage_key = config.storage_key();
        let lock_key = config.lock_key();

        Ok(Self {
            config,
            store,
            storage_key,
            lock_key,
            // Epoch reset_at: the first call always starts a new window.
            state: Mutex::new(WindowState {
                remaining: 0,
                reset_at: DateTime::<Utc>::UNIX_EPOCH,
            }),
        })
    }

    /// The limiter's configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Withdraw one token from the current window.
    ///
    /// Reconciles the local cache with the store on every call, except when
    /// the cache already shows the limit fully depleted within a live window;
    /// then the call answers locally without a store round trip.
    pub async fn withdraw(&self) -> Result<RateLimitStatus> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if state.is_expired(now) {
            trace!(key = %self.storage_key, "local window expired, starting a new one");
            state.start_new_window(now, self.window(), self.config.limit);
        } else if state.remaining == 0 {
            // Depleted within a live window: answer locally and spare the
            // store. The window cannot have reset early (reset_at only moves
            // forward), so the cached reset_at is still valid. Under clock
            // drift between processes this can report exhaustion slightly
            // past the true remote rollover.
            debug!(
                key = %self.storage_key,
                reset_at = %state.reset_at,
                "limit depleted, answering without store contact"
            );
            return Ok(RateLimitStatus {
                limit: self.config.limit,
                remaining: state.remaining - 1,
                reset_at: state.reset_at,
            });
        }

        self.reconcile(&mut state).await?;

        Ok(RateLimitStatus {
            limit: self.config.limit,
            remaining: state.remaining,
            reset_at: state.reset_at,
        })
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.config.window_ms as i64)
    }

    /// Read-decrement-persist against the store, retrying on lock contention.
    ///
    /// Retries cover only the lock conditional-set losing to another process;
    /// store failures surface immediately.
    async fn reconcile(&self, state: &mut WindowState) -> Result<()> {
        let mut retries = 0;

        let read = loop {
            let read = self
                .store
                .read_and_lock(&self.storage_key, &self.lock_key, LOCK_TTL)
                .await?;

            if read.locked {
                break read;
            }

            if retries >= MAX_RETRIES {
                debug!(key = %self.storage_key, retries, "lock contention, giving up");
                return Err(RateLimitError::Contention { retries });
            }
            retries += 1;
            trace!(
                key = %self.storage_key,
                retries,
                "counter locked by another process, retrying"
            );
            tokio::time::sleep(RETRY_DELAY).await;
        };

        let now = Utc::now();
        self.apply(state, read, now);

        // Release the lock and persist in one batch, so there is no
        // observable state with the counter updated but the lock still held.
        // The counter is stored clamped at zero with the window's remaining
        // lifetime as its expiry.
        let expiry = (state.reset_at - now).to_std().unwrap_or(Duration::ZERO);
        self.store
            .write_and_unlock(
                &self.storage_key,
                &self.lock_key,
                state.remaining.max(0),
                expiry,
            )
            .await?;

        Ok(())
    }

    /// Fold one locked read into the local cache.
    fn apply(&self, state: &mut WindowState, read: LockedRead, now: DateTime<Utc>) {
        if read.ttl_ms < 0 {
            // Counter absent or expired: the previous window has ended.
            debug!(key = %self.storage_key, "remote window rolled over");
            state.start_new_window(now, self.window(), self.config.limit);
            state.remaining -= 1;
        } else {
            state.remaining = read.value.unwrap_or(0) - 1;
            state.reset_at = now + chrono::Duration::milliseconds(read.ttl_ms);
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
