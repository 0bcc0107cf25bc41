//! User-facing Solr operations
//!
//! The facade composes escaped query fragments into request descriptors and
//! hands them to the shared pipeline. Bulk operations batch their documents
//! and preserve partial success: batches that reached Solr stay applied even
//! when a sibling batch fails.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::config::SolrConfig;
use crate::cursor::Paginator;
use crate::error::{BatchFailure, BulkError, SolrError};
use crate::pipeline::{Pipeline, RequestDescriptor, Transport};
use crate::query::QueryFragment;
use crate::response::{Document, SolrResponse};

/// A search request in Solr's JSON Request API shape
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    query: Option<QueryFragment>,
    filters: Vec<QueryFragment>,
    fields: Vec<String>,
    sort: Option<String>,
    rows: Option<u32>,
    start: Option<u32>,
    extra_params: Map<String, Value>,
    timeout: Option<Duration>,
}

impl SearchQuery {
    pub fn new(query: QueryFragment) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }

    /// Match every document (`*:*`)
    pub fn match_all() -> Self {
        Self::new(QueryFragment::match_all())
    }

    pub fn filter(mut self, filter: QueryFragment) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn rows(mut self, rows: u32) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn start(mut self, start: u32) -> Self {
        self.start = Some(start);
        self
    }

    /// Extra raw Solr parameter, passed through the `params` block
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }

    /// Per-call timeout override
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lower into a JSON Request API body; unescaped fragments are escaped
    /// here, which is the last point before the wire
    fn into_body(self) -> (Value, Option<Duration>) {
        let mut body = Map::new();
        let query = self
            .query
            .unwrap_or_else(QueryFragment::match_all)
            .ensure_escaped();
        body.insert("query".to_string(), json!(query.as_str()));

        if !self.filters.is_empty() {
            let filters: Vec<Value> = self
                .filters
                .into_iter()
                .map(|f| json!(f.ensure_escaped().as_str()))
                .collect();
            body.insert("filter".to_string(), Value::Array(filters));
        }
        if !self.fields.is_empty() {
            body.insert("fields".to_string(), json!(self.fields));
        }
        if let Some(sort) = self.sort {
            body.insert("sort".to_string(), json!(sort));
        }
        if let Some(rows) = self.rows {
            body.insert("limit".to_string(), json!(rows));
        }
        if let Some(start) = self.start {
            body.insert("offset".to_string(), json!(start));
        }
        if !self.extra_params.is_empty() {
            body.insert("params".to_string(), Value::Object(self.extra_params));
        }

        (Value::Object(body), self.timeout)
    }
}

/// What a delete operation targets
#[derive(Debug, Clone)]
pub enum DeleteTarget {
    /// Delete everything matching a query
    Query(QueryFragment),
    /// Delete specific documents by unique key
    Ids(Vec<String>),
}

/// Per-call knobs for bulk updates; `None` falls back to the configured
/// defaults
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Maximum documents per request
    pub batch_size: Option<usize>,
    /// Milliseconds before Solr force-commits the update
    pub commit_within: Option<u64>,
    pub timeout: Option<Duration>,
}

/// Summary of a fully successful bulk operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub batches: usize,
    pub documents: usize,
}

/// Asynchronous Solr client
///
/// Owns the request pipeline (and with it the connection pool); cheap to
/// share behind an `Arc`, with all operations usable concurrently up to the
/// configured pool size.
pub struct SolrClient {
    pipeline: Arc<Pipeline>,
    config: SolrConfig,
}

impl SolrClient {
    pub fn new(config: SolrConfig) -> Result<Self, SolrError> {
        config.validate()?;
        let pipeline = Arc::new(Pipeline::new(&config)?);
        Ok(Self { pipeline, config })
    }

    /// Build a client over a custom transport; the test seam
    pub fn with_transport(config: SolrConfig, transport: Arc<dyn Transport>) -> Result<Self, SolrError> {
        config.validate()?;
        let pipeline = Arc::new(Pipeline::with_transport(&config, transport));
        Ok(Self { pipeline, config })
    }

    pub fn config(&self) -> &SolrConfig {
        &self.config
    }

    /// Run a search against `/solr/{collection}/select`
    pub async fn search(&self, collection: &str, query: SearchQuery) -> Result<SolrResponse, SolrError> {
        let (body, timeout) = query.into_body();
        let mut descriptor =
            RequestDescriptor::post(format!("solr/{collection}/select")).json(body);
        if let Some(timeout) = timeout {
            descriptor = descriptor.timeout(timeout);
        }
        let envelope = self.pipeline.execute(descriptor).await?;
        debug!(collection, hits = envelope.body.hits(), "search completed");
        Ok(envelope.body)
    }

    /// Fetch one document by unique key through the realtime get handler
    ///
    /// Sees uncommitted updates, unlike `search`. Returns `None` when no
    /// document has that id.
    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, SolrError> {
        let body = json!({ "params": { "id": id } });
        let descriptor = RequestDescriptor::post(format!("solr/{collection}/get")).json(body);
        let envelope = self.pipeline.execute(descriptor).await?;
        match envelope.body.doc {
            Some(Value::Object(doc)) => Ok(Some(doc)),
            _ => Ok(None),
        }
    }

    /// Start a cursor-paginated fetch; `page_size` defaults from config
    pub fn paginate(
        &self,
        collection: &str,
        query: SearchQuery,
        page_size: Option<u32>,
    ) -> Result<Paginator, SolrError> {
        let page_size = page_size.unwrap_or(self.config.page_size);
        let (body, timeout) = query.into_body();
        Paginator::new(Arc::clone(&self.pipeline), collection, body, page_size, timeout)
    }

    /// Resume a cursor-paginated fetch from a stored mark
    pub fn paginate_from(
        &self,
        collection: &str,
        query: SearchQuery,
        page_size: Option<u32>,
        cursor_mark: &str,
    ) -> Result<Paginator, SolrError> {
        let page_size = page_size.unwrap_or(self.config.page_size);
        let (body, timeout) = query.into_body();
        Paginator::with_mark(
            Arc::clone(&self.pipeline),
            collection,
            body,
            page_size,
            timeout,
            cursor_mark,
        )
    }

    /// Index new documents, batched by `batch_size`
    pub async fn add(
        &self,
        collection: &str,
        docs: Vec<Document>,
        options: &UpdateOptions,
    ) -> Result<BulkReport, SolrError> {
        self.submit_batches(collection, docs, options, false).await
    }

    /// Reindex or atomically update existing documents
    ///
    /// Same wire operation as [`SolrClient::add`] with overwriting made
    /// explicit; documents may carry atomic-update modifier maps
    /// (`{"field": {"set": ...}}`).
    pub async fn update(
        &self,
        collection: &str,
        docs: Vec<Document>,
        options: &UpdateOptions,
    ) -> Result<BulkReport, SolrError> {
        self.submit_batches(collection, docs, options, true).await
    }

    /// Delete by query or by ids
    ///
    /// With `commit` set the delete is committed immediately so stale
    /// documents do not linger in search results.
    pub async fn delete(
        &self,
        collection: &str,
        target: DeleteTarget,
        commit: bool,
    ) -> Result<SolrResponse, SolrError> {
        let body = match target {
            DeleteTarget::Query(query) => {
                json!({ "delete": { "query": query.ensure_escaped().as_str() } })
            }
            DeleteTarget::Ids(ids) => json!({ "delete": ids }),
        };
        let mut descriptor =
            RequestDescriptor::post(format!("solr/{collection}/update")).json(body);
        if commit {
            descriptor = descriptor.param("commit", "true");
        }
        let envelope = self.pipeline.execute(descriptor).await?;
        Ok(envelope.body)
    }

    /// Commit pending updates; a soft commit makes them searchable without
    /// full durability
    pub async fn commit(&self, collection: &str, soft: bool) -> Result<SolrResponse, SolrError> {
        let param = if soft { "softCommit" } else { "commit" };
        let descriptor = RequestDescriptor::post(format!("solr/{collection}/update"))
            .json(json!({}))
            .param(param, "true");
        let envelope = self.pipeline.execute(descriptor).await?;
        debug!(collection, soft, "commit issued");
        Ok(envelope.body)
    }

    /// Submit documents in bounded batches, preserving partial success
    ///
    /// Batches go out one at a time in order. Each one gets its own retry
    /// budget inside the pipeline; a batch that still fails is recorded and
    /// the remaining batches are submitted anyway.
    async fn submit_batches(
        &self,
        collection: &str,
        docs: Vec<Document>,
        options: &UpdateOptions,
        overwrite: bool,
    ) -> Result<BulkReport, SolrError> {
        let batch_size = options.batch_size.unwrap_or(self.config.batch_size).max(1);
        let commit_within = options.commit_within.or(self.config.commit_within_ms);
        let documents = docs.len();
        let total = documents.div_ceil(batch_size);

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for (batch, chunk) in docs.chunks(batch_size).enumerate() {
            let payload: Vec<Value> = chunk.iter().cloned().map(Value::Object).collect();
            let mut descriptor = RequestDescriptor::post(format!("solr/{collection}/update"))
                .json(Value::Array(payload));
            if overwrite {
                descriptor = descriptor.param("overwrite", "true");
            }
            if let Some(ms) = commit_within {
                descriptor = descriptor.param("commitWithin", ms.to_string());
            }
            if let Some(timeout) = options.timeout {
                descriptor = descriptor.timeout(timeout);
            }

            match self.pipeline.execute(descriptor).await {
                Ok(_) => {
                    debug!(collection, batch, docs = chunk.len(), "batch accepted");
                    succeeded.push(batch);
                }
                Err(error) => {
                    warn!(collection, batch, error = %error, "batch failed");
                    failed.push(BatchFailure { batch, error });
                }
            }
        }

        if failed.is_empty() {
            Ok(BulkReport {
                batches: total,
                documents,
            })
        } else {
            Err(SolrError::Bulk(BulkError {
                total,
                succeeded,
                failed,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::pipeline::mock::{MockTransport, ScriptedReply};
    use crate::query::escape;

    fn test_config() -> SolrConfig {
        SolrConfig {
            retry: RetryConfig {
                max_attempts: 1,
                base_backoff_ms: 1,
                max_backoff_ms: 1,
            },
            ..Default::default()
        }
    }

    fn client(transport: Arc<MockTransport>) -> SolrClient {
        SolrClient::with_transport(test_config(), transport).expect("valid config")
    }

    fn ok_reply() -> ScriptedReply {
        ScriptedReply::ok(&json!({
            "responseHeader": { "status": 0, "QTime": 1 },
            "response": { "numFound": 0, "start": 0, "docs": [] }
        }))
    }

    fn doc(id: usize) -> Document {
        let mut map = Document::new();
        map.insert("id".to_string(), json!(id.to_string()));
        map
    }

    #[tokio::test]
    async fn test_search_builds_json_request_body() {
        let transport = MockTransport::new(vec![ok_reply()]);
        let solr = client(transport.clone());

        let query = SearchQuery::new(escape("what? yes"))
            .filter(QueryFragment::verbatim("type:record"))
            .fields(["id", "title"])
            .sort("title asc")
            .rows(50)
            .param("debugQuery", json!("true"));
        solr.search("hits", query).await.expect("search should succeed");

        let request = &transport.requests()[0];
        assert_eq!(request.path, "solr/hits/select");
        let body = request.body.as_ref().expect("body");
        assert_eq!(body["query"], json!(r"what\? yes"));
        assert_eq!(body["filter"], json!(["type:record"]));
        assert_eq!(body["fields"], json!(["id", "title"]));
        assert_eq!(body["sort"], json!("title asc"));
        assert_eq!(body["limit"], json!(50));
        assert_eq!(body["params"]["debugQuery"], json!("true"));
    }

    #[tokio::test]
    async fn test_search_escapes_raw_fragments_before_wire() {
        let transport = MockTransport::new(vec![ok_reply()]);
        let solr = client(transport.clone());

        let query = SearchQuery::new(QueryFragment::raw("a+b"));
        solr.search("hits", query).await.expect("search should succeed");

        let body = transport.requests()[0].body.clone().expect("body");
        assert_eq!(body["query"], json!(r"a\+b"));
    }

    #[tokio::test]
    async fn test_get_returns_document() {
        let transport = MockTransport::new(vec![ScriptedReply::ok(&json!({
            "responseHeader": { "status": 0 },
            "doc": { "id": "a", "title": "First" }
        }))]);
        let solr = client(transport.clone());

        let doc = solr.get("hits", "a").await.expect("get should succeed").expect("doc");
        assert_eq!(doc["title"], json!("First"));

        let body = transport.requests()[0].body.clone().expect("body");
        assert_eq!(body["params"]["id"], json!("a"));
    }

    #[tokio::test]
    async fn test_get_missing_document_is_none() {
        let transport = MockTransport::new(vec![ScriptedReply::ok(&json!({
            "responseHeader": { "status": 0 },
            "doc": null
        }))]);
        let solr = client(transport);

        let doc = solr.get("hits", "nope").await.expect("get should succeed");
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_bulk_add_batches_by_size() {
        let transport = MockTransport::new(vec![ok_reply(), ok_reply(), ok_reply()]);
        let solr = client(transport.clone());

        let docs: Vec<Document> = (0..250).map(doc).collect();
        let options = UpdateOptions {
            batch_size: Some(100),
            commit_within: Some(500),
            ..Default::default()
        };
        let report = solr.add("hits", docs, &options).await.expect("bulk should succeed");

        assert_eq!(report, BulkReport { batches: 3, documents: 250 });
        let requests = transport.requests();
        assert_eq!(requests.len(), 3, "250 docs at batch 100 is 3 requests");
        let sizes: Vec<usize> = requests
            .iter()
            .map(|r| r.body.as_ref().unwrap().as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert!(
            requests.iter().all(|r| r
                .params
                .contains(&("commitWithin".to_string(), "500".to_string())))
        );
    }

    #[tokio::test]
    async fn test_bulk_add_partial_failure() {
        let transport = MockTransport::new(vec![
            ok_reply(),
            ScriptedReply::status(
                400,
                &json!({ "error": { "code": 400, "msg": "missing required field" } }),
            ),
            ok_reply(),
        ]);
        let solr = client(transport.clone());

        let docs: Vec<Document> = (0..250).map(doc).collect();
        let options = UpdateOptions {
            batch_size: Some(100),
            ..Default::default()
        };
        let err = solr.add("hits", docs, &options).await.unwrap_err();

        match err {
            SolrError::Bulk(bulk) => {
                assert_eq!(bulk.total, 3);
                assert_eq!(bulk.succeeded, vec![0, 2], "first and third batches applied");
                assert_eq!(bulk.failed.len(), 1);
                assert_eq!(bulk.failed[0].batch, 1);
                assert_eq!(bulk.failed[0].error.status(), Some(400));
            }
            other => panic!("expected Bulk, got {other:?}"),
        }
        // the failure did not stop later batches
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_bulk_add_empty_input() {
        let transport = MockTransport::new(vec![]);
        let solr = client(transport.clone());

        let report = solr
            .add("hits", Vec::new(), &UpdateOptions::default())
            .await
            .expect("empty add is a no-op");
        assert_eq!(report, BulkReport { batches: 0, documents: 0 });
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_update_sets_overwrite() {
        let transport = MockTransport::new(vec![ok_reply()]);
        let solr = client(transport.clone());

        solr.update("hits", vec![doc(1)], &UpdateOptions::default())
            .await
            .expect("update should succeed");

        let request = &transport.requests()[0];
        assert!(request.params.contains(&("overwrite".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn test_delete_by_query_and_commit() {
        let transport = MockTransport::new(vec![ok_reply()]);
        let solr = client(transport.clone());

        solr.delete("hits", DeleteTarget::Query(QueryFragment::raw("old+stale")), true)
            .await
            .expect("delete should succeed");

        let request = &transport.requests()[0];
        assert_eq!(request.path, "solr/hits/update");
        let body = request.body.as_ref().expect("body");
        assert_eq!(body["delete"]["query"], json!(r"old\+stale"));
        assert!(request.params.contains(&("commit".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let transport = MockTransport::new(vec![ok_reply()]);
        let solr = client(transport.clone());

        solr.delete(
            "hits",
            DeleteTarget::Ids(vec!["a".to_string(), "b".to_string()]),
            false,
        )
        .await
        .expect("delete should succeed");

        let request = &transport.requests()[0];
        let body = request.body.as_ref().expect("body");
        assert_eq!(body["delete"], json!(["a", "b"]));
        assert!(request.params.is_empty());
    }

    #[tokio::test]
    async fn test_commit_soft_and_hard() {
        let transport = MockTransport::new(vec![ok_reply(), ok_reply()]);
        let solr = client(transport.clone());

        solr.commit("hits", true).await.expect("soft commit");
        solr.commit("hits", false).await.expect("hard commit");

        let requests = transport.requests();
        assert!(requests[0].params.contains(&("softCommit".to_string(), "true".to_string())));
        assert!(requests[1].params.contains(&("commit".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn test_paginate_threads_per_call_timeout() {
        let transport = MockTransport::new(vec![ok_reply()]);
        let solr = client(transport.clone());

        let query = SearchQuery::match_all().timeout(Duration::from_millis(1_234));
        let mut pages = solr
            .paginate("hits", query, Some(10))
            .expect("paginator should build");
        let _ = pages.next_page().await;

        let request = &transport.requests()[0];
        assert_eq!(request.timeout, Some(Duration::from_millis(1_234)));
    }

    #[tokio::test]
    async fn test_paginate_uses_configured_page_size() {
        let transport = MockTransport::new(vec![]);
        let solr = client(transport);

        let paginator = solr
            .paginate("hits", SearchQuery::match_all(), None)
            .expect("paginator should build");
        assert_eq!(paginator.collection(), "hits");
        assert_eq!(paginator.cursor_mark(), "*");
    }
}
