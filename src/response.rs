//! Typed decode of Solr's standard JSON response envelope

use serde::Deserialize;
use serde_json::Value;

/// A schema-agnostic Solr document: field name to discriminated JSON value
pub type Document = serde_json::Map<String, Value>;

/// Solr's standard JSON response envelope
///
/// Every handler returns `responseHeader`; search handlers add `response`
/// and (for cursor queries) `nextCursorMark`; the realtime get handler
/// returns `doc`. Optional metadata blocks are kept as raw JSON since their
/// shape depends entirely on the request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SolrResponse {
    #[serde(rename = "responseHeader")]
    pub header: ResponseHeader,

    pub response: ResponseBody,

    #[serde(rename = "nextCursorMark")]
    pub next_cursor_mark: Option<String>,

    /// Error block present on non-2xx responses
    pub error: Option<ErrorBody>,

    /// Single document from the realtime get handler
    pub doc: Option<Value>,

    #[serde(rename = "facet_counts")]
    pub facets: Option<Value>,
    pub highlighting: Option<Value>,
    pub spellcheck: Option<Value>,
    pub stats: Option<Value>,
    pub grouped: Option<Value>,
    pub debug: Option<Value>,
}

impl SolrResponse {
    /// Documents returned by this response
    pub fn docs(&self) -> &[Document] {
        &self.response.docs
    }

    /// Total number of matching documents reported by Solr
    pub fn hits(&self) -> u64 {
        self.response.num_found
    }

    /// Server-side query time in milliseconds
    pub fn qtime(&self) -> Option<u64> {
        self.header.qtime
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseHeader {
    pub status: i64,
    #[serde(rename = "QTime")]
    pub qtime: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseBody {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    pub start: u64,
    pub docs: Vec<Document>,
}

/// Error payload Solr attaches to rejected requests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    pub code: Option<i64>,
    pub msg: Option<String>,
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_search_envelope() {
        let raw = json!({
            "responseHeader": { "status": 0, "QTime": 7 },
            "response": {
                "numFound": 2,
                "start": 0,
                "docs": [ { "id": "a" }, { "id": "b" } ]
            },
            "nextCursorMark": "AoEjYQ=="
        });

        let decoded: SolrResponse = serde_json::from_value(raw).expect("should decode");
        assert_eq!(decoded.hits(), 2);
        assert_eq!(decoded.docs().len(), 2);
        assert_eq!(decoded.qtime(), Some(7));
        assert_eq!(decoded.next_cursor_mark.as_deref(), Some("AoEjYQ=="));
    }

    #[test]
    fn test_decode_error_envelope() {
        let raw = json!({
            "responseHeader": { "status": 400, "QTime": 1 },
            "error": { "code": 400, "msg": "undefined field foo" }
        });

        let decoded: SolrResponse = serde_json::from_value(raw).expect("should decode");
        let error = decoded.error.as_ref().expect("error block");
        assert_eq!(error.code, Some(400));
        assert_eq!(error.msg.as_deref(), Some("undefined field foo"));
        assert!(decoded.docs().is_empty());
    }

    #[test]
    fn test_decode_minimal_envelope() {
        let decoded: SolrResponse = serde_json::from_str("{}").expect("should decode");
        assert_eq!(decoded.hits(), 0);
        assert!(decoded.next_cursor_mark.is_none());
    }
}
