//! Cursor-based deep pagination
//!
//! Drives repeated `/select` fetches using Solr's cursorMark protocol. The
//! paginator owns its [`CursorState`]; retry of transport failures happens
//! one layer down in the pipeline, so a failed page fetch leaves the cursor
//! mark untouched and the caller can resume from it.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::SolrError;
use crate::pipeline::{Pipeline, RequestDescriptor};
use crate::response::Document;

/// Starting mark for a fresh cursor query
pub const CURSOR_START: &str = "*";

/// One page of results from a cursor query
#[derive(Debug, Clone)]
pub struct ResultPage {
    pub docs: Vec<Document>,
    /// Total matching documents reported by Solr
    pub num_found: u64,
    /// Mark to resume from after this page
    pub cursor_mark: String,
}

/// Position of one paginated fetch; owned exclusively by its paginator
#[derive(Debug, Clone)]
pub struct CursorState {
    collection: String,
    mark: String,
    page_size: u32,
    fetched: u64,
}

/// Lazily fetches pages until Solr reports an unchanged cursor mark
///
/// Pages arrive strictly in server order; nothing is reordered or
/// deduplicated across pages. If the index mutates while paginating,
/// deduplication is the caller's concern.
pub struct Paginator {
    pipeline: Arc<Pipeline>,
    state: CursorState,
    body: Value,
    timeout: Option<Duration>,
    finished: bool,
}

impl Paginator {
    pub(crate) fn new(
        pipeline: Arc<Pipeline>,
        collection: &str,
        body: Value,
        page_size: u32,
        timeout: Option<Duration>,
    ) -> Result<Self, SolrError> {
        Self::with_mark(pipeline, collection, body, page_size, timeout, CURSOR_START)
    }

    /// Resume a previous fetch from a stored cursor mark
    pub(crate) fn with_mark(
        pipeline: Arc<Pipeline>,
        collection: &str,
        body: Value,
        page_size: u32,
        timeout: Option<Duration>,
        mark: &str,
    ) -> Result<Self, SolrError> {
        let body = prepare_cursor_body(body)?;
        Ok(Self {
            pipeline,
            state: CursorState {
                collection: collection.to_string(),
                mark: mark.to_string(),
                page_size,
                fetched: 0,
            },
            body,
            timeout,
            finished: false,
        })
    }

    /// The mark the next fetch will use; stable across a failed fetch
    pub fn cursor_mark(&self) -> &str {
        &self.state.mark
    }

    /// Documents yielded so far
    pub fn fetched(&self) -> u64 {
        self.state.fetched
    }

    pub fn collection(&self) -> &str {
        &self.state.collection
    }

    /// Fetch the next page; `None` once the cursor is exhausted
    ///
    /// Errors are forwarded without consuming the cursor position, so the
    /// caller may simply call again to retry the same page.
    pub async fn next_page(&mut self) -> Option<Result<ResultPage, SolrError>> {
        if self.finished {
            return None;
        }

        let mut body = self.body.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("limit".to_string(), json!(self.state.page_size));
            let params = obj
                .entry("params".to_string())
                .or_insert_with(|| json!({}));
            if let Some(params) = params.as_object_mut() {
                params.insert("cursorMark".to_string(), json!(self.state.mark));
            }
        }

        let mut descriptor =
            RequestDescriptor::post(format!("solr/{}/select", self.state.collection)).json(body);
        if let Some(timeout) = self.timeout {
            descriptor = descriptor.timeout(timeout);
        }

        let envelope = match self.pipeline.execute(descriptor).await {
            Ok(envelope) => envelope,
            Err(e) => return Some(Err(e)),
        };

        let response = envelope.body;
        match response.next_cursor_mark {
            // unchanged mark: the previous page was the last one
            Some(next) if next == self.state.mark => {
                debug!(
                    collection = %self.state.collection,
                    fetched = self.state.fetched,
                    "cursor exhausted"
                );
                self.finished = true;
                None
            }
            next => {
                let page = ResultPage {
                    cursor_mark: next.clone().unwrap_or_else(|| self.state.mark.clone()),
                    num_found: response.response.num_found,
                    docs: response.response.docs,
                };
                self.state.fetched += page.docs.len() as u64;
                match next {
                    Some(mark) => self.state.mark = mark,
                    // server stopped returning marks: nothing left to resume
                    None => self.finished = true,
                }
                debug!(
                    collection = %self.state.collection,
                    page_docs = page.docs.len(),
                    fetched = self.state.fetched,
                    mark = %self.state.mark,
                    "fetched page"
                );
                Some(Ok(page))
            }
        }
    }

    /// Adapt the paginator into a lazy `Stream` of pages
    pub fn into_stream(self) -> impl Stream<Item = Result<ResultPage, SolrError>> {
        futures::stream::unfold(self, |mut paginator| async move {
            paginator.next_page().await.map(|item| (item, paginator))
        })
    }
}

/// Validate and normalize a JSON Request API body for cursor use
///
/// Cursor queries cannot use `start`/`offset`, and need a total sort order:
/// the unique `id` field is appended as a tiebreaker (or used as the default
/// sort) so the cursor walks the index deterministically.
fn prepare_cursor_body(mut body: Value) -> Result<Value, SolrError> {
    let Some(obj) = body.as_object_mut() else {
        return Err(SolrError::CursorQuery("request body must be a JSON object".to_string()));
    };

    if obj.contains_key("offset") {
        return Err(SolrError::CursorQuery(
            "offset is not supported when paginating with a cursor".to_string(),
        ));
    }
    if let Some(params) = obj.get("params").and_then(Value::as_object)
        && (params.contains_key("start") || params.contains_key("offset"))
    {
        return Err(SolrError::CursorQuery(
            "start/offset params are not supported when paginating with a cursor".to_string(),
        ));
    }

    match obj.get("sort").and_then(Value::as_str) {
        None => {
            if obj
                .get("params")
                .and_then(Value::as_object)
                .is_some_and(|params| params.contains_key("sort"))
            {
                return Err(SolrError::CursorQuery(
                    "set sort at the top level of the request for cursor queries".to_string(),
                ));
            }
            obj.insert("sort".to_string(), json!("id asc"));
        }
        Some(sort) => {
            // the leading space matters: `foo_id asc` must not match
            let has_tiebreaker =
                sort == "id asc" || sort.starts_with("id asc,") || sort.contains(" id asc");
            if !has_tiebreaker {
                let extended = format!("{sort}, id asc");
                obj.insert("sort".to_string(), json!(extended));
            }
        }
    }

    Ok(body)
}
