//! Error taxonomy for solrkit
//!
//! Query-construction errors are never retried, application-level rejections
//! from Solr are surfaced as-is, and only transport faults are retried by the
//! request pipeline.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::query::QueryError;

/// Top-level error type for all client operations
#[derive(Debug, Error)]
pub enum SolrError {
    /// Query escaping/validation failed; the request was never sent
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Solr rejected the request at the application level (non-2xx)
    ///
    /// Never retried automatically: the request reached the server, so
    /// resubmitting the same payload would fail the same way.
    #[error("solr responded with HTTP {status}: {message}")]
    Request {
        status: u16,
        message: String,
        /// Decoded error body when Solr returned one
        body: Option<Value>,
    },

    /// Every attempt in the retry budget failed at the transport layer
    #[error("transport failed after {attempts} attempts: {source}")]
    TransportExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The caller cancelled the operation (including mid-backoff)
    #[error("operation cancelled by caller")]
    Cancelled,

    /// A bulk operation partially failed; per-batch outcomes preserved
    #[error(transparent)]
    Bulk(#[from] BulkError),

    /// A 2xx response body did not decode as a Solr JSON envelope
    #[error("could not decode solr response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request could not be issued as a cursor query
    #[error("invalid cursor query: {0}")]
    CursorQuery(String),

    /// Client construction or configuration problem
    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// A single failed attempt at the transport layer
///
/// These are the only errors the pipeline retries.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Aggregate outcome of a batched bulk operation
///
/// Batches are numbered from zero in submission order. A bulk call is never
/// atomic: batches that reached Solr before (or after) a failure stay
/// applied, and both lists are reported here.
#[derive(Debug, Error)]
#[error("bulk operation failed for {} of {total} batches", .failed.len())]
pub struct BulkError {
    /// Total number of batches submitted
    pub total: usize,
    /// Indices of batches Solr accepted
    pub succeeded: Vec<usize>,
    /// Failed batches with the error each one hit
    pub failed: Vec<BatchFailure>,
}

/// One failed batch within a bulk operation
#[derive(Debug)]
pub struct BatchFailure {
    /// Zero-based batch index in submission order
    pub batch: usize,
    pub error: SolrError,
}

impl SolrError {
    /// Check whether this error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, SolrError::TransportExhausted { .. })
    }

    /// HTTP status code for application-level rejections
    pub fn status(&self) -> Option<u16> {
        match self {
            SolrError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}
