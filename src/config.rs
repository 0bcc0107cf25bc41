//! Client configuration types
//!
//! Loading is the embedding application's concern; these types deserialize
//! from whatever format the application uses and every knob has a sensible
//! default. All values are overridable per call where that makes sense
//! (timeouts on requests, page size on paginate, batch size on bulk calls).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SolrError;

/// Solr client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolrConfig {
    /// Base URL of the Solr instance, e.g. `http://localhost:8983`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Default per-request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum concurrent in-flight requests through one client
    #[serde(rename = "pool-size")]
    pub pool_size: usize,

    /// Retry budget for transport-level failures
    pub retry: RetryConfig,

    /// Default page size for cursor pagination
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Default maximum documents per bulk-update request
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Default `commitWithin` for updates, in milliseconds
    #[serde(rename = "commit-within-ms")]
    pub commit_within_ms: Option<u64>,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8983".to_string(),
            timeout_ms: 30_000,
            pool_size: 16,
            retry: RetryConfig::default(),
            page_size: 100,
            batch_size: 100,
            commit_within_ms: None,
        }
    }
}

impl SolrConfig {
    /// Validate configuration before use
    ///
    /// Call this early to fail fast with a clear message instead of a
    /// confusing failure on the first request.
    pub fn validate(&self) -> Result<(), SolrError> {
        if self.base_url.trim().is_empty() {
            return Err(SolrError::Config("base-url must not be empty".to_string()));
        }
        if self.pool_size == 0 {
            return Err(SolrError::Config("pool-size must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SolrError::Config("retry.max-attempts must be at least 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(SolrError::Config("page-size must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SolrError::Config("batch-size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry budget configuration for transport failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per logical request, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles per attempt after that
    #[serde(rename = "base-backoff-ms")]
    pub base_backoff_ms: u64,

    /// Ceiling on the backoff delay (jitter is added on top)
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}
