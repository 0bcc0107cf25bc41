//! Request pipeline: pooled concurrency, retry with backoff, cancellation
//!
//! Every operation the client issues flows through [`Pipeline::execute`].
//! The pipeline acquires a concurrency slot, puts the request on the wire
//! through a [`Transport`], and decodes the Solr envelope. Transport
//! failures are retried with exponential backoff and jitter until the
//! [`RetryBudget`] runs out; application-level rejections (non-2xx) are
//! surfaced immediately and never retried.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, warn};

mod transport;

#[cfg(test)]
pub use transport::mock;
pub use transport::{HttpTransport, RawResponse, Transport};

pub use reqwest::Method;

use crate::config::{RetryConfig, SolrConfig};
use crate::error::{SolrError, TransportError};
use crate::response::SolrResponse;

/// Everything needed for one HTTP call; created per call, consumed by the
/// pipeline
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Per-call override of the pipeline's default timeout
    pub timeout: Option<Duration>,
    /// Per-call override of the configured retry budget
    pub retry: Option<RetryBudget>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            timeout: None,
            retry: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, budget: RetryBudget) -> Self {
        self.retry = Some(budget);
        self
    }
}

/// A successfully decoded 2xx response
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub body: SolrResponse,
}

/// Attempt count and backoff schedule for one logical request
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: u32,
    base: Duration,
    cap: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            cap,
        }
    }

    fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped, plus up to 25% jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let capped = self.base.saturating_mul(1u32 << exponent).min(self.cap);
        let jitter_ms = rand::rng().random_range(0..=capped.as_millis() as u64 / 4);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Shared request pipeline for one client instance
///
/// Concurrency is bounded by a semaphore sized from `pool-size`; the
/// underlying connection reuse lives in the transport. Safe to share across
/// tasks behind an `Arc`.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    base_url: String,
    slots: Arc<Semaphore>,
    default_timeout: Duration,
    retry: RetryConfig,
}

impl Pipeline {
    pub fn new(config: &SolrConfig) -> Result<Self, SolrError> {
        let transport = Arc::new(HttpTransport::new(config.pool_size)?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: &SolrConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            slots: Arc::new(Semaphore::new(config.pool_size)),
            default_timeout: config.timeout(),
            retry: config.retry.clone(),
        }
    }

    /// Execute a request without an external cancellation signal
    pub async fn execute(&self, descriptor: RequestDescriptor) -> Result<ResponseEnvelope, SolrError> {
        // sender kept alive for the duration of the call so the signal
        // never fires
        let (_keepalive, cancel) = watch::channel(false);
        self.execute_cancellable(descriptor, cancel).await
    }

    /// Execute a request, aborting with [`SolrError::Cancelled`] when the
    /// watched value flips to `true`
    ///
    /// Cancellation is honored at every suspension point: slot acquisition,
    /// the in-flight attempt, and backoff waits between attempts.
    pub async fn execute_cancellable(
        &self,
        descriptor: RequestDescriptor,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ResponseEnvelope, SolrError> {
        let timeout = descriptor.timeout.unwrap_or(self.default_timeout);
        let budget = match &descriptor.retry {
            Some(budget) => budget.clone(),
            None => RetryBudget::from_config(&self.retry),
        };
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=budget.max_attempts() {
            if attempt > 1 {
                let delay = budget.backoff(attempt - 1);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    path = %descriptor.path,
                    "retrying after transport failure"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancelled(&mut cancel) => {
                        debug!(path = %descriptor.path, "cancelled during backoff");
                        return Err(SolrError::Cancelled);
                    }
                }
            }

            // the permit drops on every exit path below, so a slot is never
            // leaked even on cancellation
            let permit = tokio::select! {
                permit = self.slots.clone().acquire_owned() => {
                    permit.map_err(|_| SolrError::Config("connection pool closed".to_string()))?
                }
                _ = cancelled(&mut cancel) => return Err(SolrError::Cancelled),
            };

            let outcome = tokio::select! {
                outcome = self.transport.send(&self.base_url, &descriptor, timeout) => outcome,
                _ = cancelled(&mut cancel) => {
                    // dropping the in-flight future aborts the attempt; the
                    // transport closes the indeterminate connection itself
                    debug!(path = %descriptor.path, "cancelled in flight");
                    return Err(SolrError::Cancelled);
                }
            };
            drop(permit);

            match outcome {
                Ok(raw) if (200..300).contains(&raw.status) => {
                    debug!(status = raw.status, attempt, path = %descriptor.path, "request succeeded");
                    let body: SolrResponse = serde_json::from_str(&raw.body)?;
                    return Ok(ResponseEnvelope {
                        status: raw.status,
                        body,
                    });
                }
                Ok(raw) => {
                    debug!(status = raw.status, path = %descriptor.path, "solr rejected request");
                    return Err(reject(raw));
                }
                Err(e) => {
                    debug!(attempt, error = %e, path = %descriptor.path, "transport failure");
                    last_error = Some(e);
                }
            }
        }

        Err(SolrError::TransportExhausted {
            attempts: budget.max_attempts(),
            source: last_error
                .unwrap_or_else(|| TransportError::Connect("no attempt recorded".to_string())),
        })
    }
}

/// Build the application-level error for a non-2xx response
fn reject(raw: RawResponse) -> SolrError {
    let parsed: Option<Value> = serde_json::from_str(&raw.body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("msg"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let trimmed = raw.body.trim();
            if trimmed.is_empty() {
                "no error body".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });
    SolrError::Request {
        status: raw.status,
        message,
        body: parsed,
    }
}

/// Resolve once the watched value becomes `true`; never resolves if the
/// sender is dropped without cancelling
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
