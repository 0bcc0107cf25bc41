//! Wire transport behind the request pipeline
//!
//! [`Transport`] is the seam between retry/pooling logic and the actual
//! HTTP stack: the pipeline never touches `reqwest` directly, which is what
//! lets the tests script transport behavior.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::RequestDescriptor;
use crate::error::{SolrError, TransportError};

/// Undecoded wire response: status plus body text
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// One attempt at putting a request on the wire
///
/// Implementations must honor `timeout` for the whole send/receive cycle
/// and classify failures as [`TransportError`]; the pipeline treats every
/// transport error as retryable.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        base_url: &str,
        descriptor: &RequestDescriptor,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// Production transport over a shared `reqwest` client
///
/// The client keeps a keep-alive connection pool internally; one
/// `HttpTransport` per [`crate::client::SolrClient`], no process-wide
/// session.
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(pool_size: usize) -> Result<Self, SolrError> {
        let http = Client::builder()
            .pool_max_idle_per_host(pool_size)
            .build()
            .map_err(|e| SolrError::Config(format!("could not build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        base_url: &str,
        descriptor: &RequestDescriptor,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            descriptor.path.trim_start_matches('/')
        );
        debug!(method = %descriptor.method, %url, "sending request");

        let mut request = self.http.request(descriptor.method.clone(), &url).timeout(timeout);
        if !descriptor.params.is_empty() {
            request = request.query(&descriptor.params);
        }
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(e, timeout))?;
        debug!(%url, status, body_len = body.len(), "received response");

        Ok(RawResponse { status, body })
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Http(error)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One scripted transport outcome, consumed in order
    pub enum ScriptedReply {
        Reply { status: u16, body: String },
        Slow {
            status: u16,
            body: String,
            delay: Duration,
        },
        Refused,
    }

    impl ScriptedReply {
        pub fn ok(body: &serde_json::Value) -> Self {
            Self::Reply {
                status: 200,
                body: body.to_string(),
            }
        }

        pub fn status(status: u16, body: &serde_json::Value) -> Self {
            Self::Reply {
                status,
                body: body.to_string(),
            }
        }
    }

    /// Scripted transport for unit tests
    ///
    /// Records every descriptor it receives and tracks peak concurrency so
    /// tests can assert on pool behavior. An exhausted script behaves like
    /// a refused connection.
    pub struct MockTransport {
        script: Mutex<VecDeque<ScriptedReply>>,
        requests: Mutex<Vec<RequestDescriptor>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockTransport {
        pub fn new(script: Vec<ScriptedReply>) -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<RequestDescriptor> {
            self.requests.lock().unwrap().clone()
        }

        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            _base_url: &str,
            descriptor: &RequestDescriptor,
            _timeout: Duration,
        ) -> Result<RawResponse, TransportError> {
            self.requests.lock().unwrap().push(descriptor.clone());
            let reply = self.script.lock().unwrap().pop_front();

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);

            let result = match reply {
                Some(ScriptedReply::Reply { status, body }) => Ok(RawResponse { status, body }),
                Some(ScriptedReply::Slow { status, body, delay }) => {
                    tokio::time::sleep(delay).await;
                    Ok(RawResponse { status, body })
                }
                Some(ScriptedReply::Refused) | None => {
                    Err(TransportError::Connect("connection refused".to_string()))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}
