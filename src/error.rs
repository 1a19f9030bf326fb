//! Error types for floodgate operations.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for rate limiting operations.
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// Invalid limiter configuration, raised at construction
    #[error("configuration error: {0}")]
    Config(String),

    /// The counter lock could not be acquired within the retry budget
    #[error("lock contention: gave up after {retries} retries")]
    Contention {
        /// Number of retries performed before giving up.
        retries: u32,
    },

    /// The underlying store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RateLimitError {
    /// True when the error is lock contention rather than a configuration or
    /// store failure. Contention is transient; callers may try again later.
    pub fn is_contention(&self) -> bool {
        matches!(self, RateLimitError::Contention { .. })
    }
}

/// Result type alias for rate limiting operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;
