//! Query construction for Solr's query syntax
//!
//! Two entry points with different strictness:
//!
//! - [`escape`] is total: any text becomes a literal-safe query fragment with
//!   every reserved character backslash-escaped.
//! - [`parse_and_validate`] accepts deliberately structured query syntax
//!   (fielded clauses, ranges, phrases, boosts) and rejects malformed input
//!   with the offending position.

use std::fmt;

use thiserror::Error;

mod escape;
mod parser;

pub use escape::{RESERVED_CHARACTERS, escape, is_reserved};
pub use parser::{parse_and_validate, parse_with_fields, validate};

/// Errors raised while building or validating query syntax
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Structured query syntax did not parse; position is the character
    /// offset into the (trimmed) input where parsing stopped
    #[error("malformed query syntax at character {position}")]
    Malformed { position: usize },

    /// A fielded clause with nothing after the colon, e.g. `title:`
    #[error("empty query for field `{field}`: text must follow the colon")]
    EmptyField { field: String },

    /// Field-name mapping was requested and the field is not known
    #[error("`{field}` is not a valid search field")]
    UnknownField { field: String },
}

/// An immutable query string plus a flag recording whether it has been
/// escaped or validated.
///
/// The client facade only puts escaped fragments on the wire; calling
/// [`QueryFragment::ensure_escaped`] on an already-escaped fragment is a
/// no-op, which is what makes escaping idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFragment {
    text: String,
    escaped: bool,
}

impl QueryFragment {
    /// Wrap raw, untrusted text; it will be escaped before it is sent
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            escaped: false,
        }
    }

    /// Wrap text the caller vouches is already valid query syntax
    ///
    /// Use this for hand-written queries like `*:*` that must reach Solr
    /// verbatim. No escaping or validation is performed.
    pub fn verbatim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            escaped: true,
        }
    }

    /// The match-all query `*:*`
    pub fn match_all() -> Self {
        Self::verbatim("*:*")
    }

    pub(crate) fn escaped(text: String) -> Self {
        Self { text, escaped: true }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_escaped(&self) -> bool {
        self.escaped
    }

    /// Escape the fragment if it has not been escaped yet
    pub fn ensure_escaped(self) -> Self {
        if self.escaped { self } else { escape(&self.text) }
    }
}

impl fmt::Display for QueryFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
