//! solrkit - asynchronous JSON-first Solr client
//!
//! Talks to Solr exclusively through its JSON APIs: the JSON Request API
//! for searches and realtime gets, and JSON document payloads for updates.
//! Built on tokio and reqwest; no operation blocks the caller.
//!
//! # Core Pieces
//!
//! - **Escaping engine**: [`query::escape`] makes arbitrary text safe as a
//!   query literal; [`query::parse_and_validate`] checks deliberately
//!   structured query syntax and reports the position of anything malformed
//! - **Request pipeline**: bounded concurrency, exponential backoff with
//!   jitter for transport faults, cooperative cancellation
//! - **Cursor pagination**: deep paging via cursorMark with resumable state
//! - **Bulk updates**: batched submission with partial-success reporting
//!
//! # Modules
//!
//! - [`query`] - escaping and query-syntax validation
//! - [`pipeline`] - pooled request execution and retry policy
//! - [`cursor`] - cursorMark pagination
//! - [`client`] - the user-facing facade
//! - [`config`] - configuration types
//! - [`response`] - Solr's JSON response envelope
//! - [`error`] - the error taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use solrkit::{SearchQuery, SolrClient, SolrConfig, query};
//!
//! # async fn run() -> Result<(), solrkit::SolrError> {
//! let client = SolrClient::new(SolrConfig::default())?;
//!
//! let results = client
//!     .search("sources", SearchQuery::new(query::escape("dowland: lute")))
//!     .await?;
//! println!("{} hits", results.hits());
//!
//! let mut pages = client.paginate("sources", SearchQuery::match_all(), Some(500))?;
//! while let Some(page) = pages.next_page().await {
//!     for doc in page?.docs {
//!         println!("{:?}", doc.get("id"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod response;

// Re-export commonly used types
pub use client::{BulkReport, DeleteTarget, SearchQuery, SolrClient, UpdateOptions};
pub use config::{RetryConfig, SolrConfig};
pub use cursor::{CursorState, Paginator, ResultPage};
pub use error::{BatchFailure, BulkError, SolrError, TransportError};
pub use pipeline::{
    HttpTransport, Method, Pipeline, RequestDescriptor, ResponseEnvelope, RetryBudget, Transport,
};
pub use query::{QueryError, QueryFragment, escape, parse_and_validate, parse_with_fields, validate};
pub use response::{Document, SolrResponse};
