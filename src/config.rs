//! Limiter configuration and validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RateLimitError, Result};

/// Default namespace prepended to identifiers when deriving storage keys.
pub const DEFAULT_NAMESPACE: &str = "ratelimit:";

/// Configuration for a single limiter.
///
/// All fields are fixed after construction; a limiter tracking a different
/// identifier or limit is a new limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Unique identifier for the rate-limited subject (user, API key, IP).
    pub identifier: String,

    /// Maximum tokens per window.
    pub limit: u32,

    /// Window duration in milliseconds.
    pub window_ms: u64,

    /// Namespace prepended to the identifier to derive storage keys.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl LimiterConfig {
    /// Create a configuration with the default namespace.
    pub fn new(identifier: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            identifier: identifier.into(),
            limit,
            window_ms: window.as_millis() as u64,
            namespace: default_namespace(),
        }
    }

    /// Override the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// The window duration.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Key under which the counter is stored.
    pub fn storage_key(&self) -> String {
        format!("{}{}", self.namespace, self.identifier)
    }

    /// Key used as the mutual-exclusion marker while the counter is updated.
    pub fn lock_key(&self) -> String {
        format!("{}{}:lock", self.namespace, self.identifier)
    }

    /// Check the configuration, failing fast on invalid input.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            return Err(RateLimitError::Config(
                "identifier must not be empty".to_string(),
            ));
        }
        if self.limit == 0 {
            return Err(RateLimitError::Config(
                "limit must be greater than zero".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(RateLimitError::Config(
                "window duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
