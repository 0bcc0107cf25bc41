//! Recursive-descent validator for the supported query-syntax subset
//!
//! Grammar (PEG-style, ordered alternatives with backtracking):
//!
//! ```text
//! query        = clause (ws clause)*
//! clause       = [+-]? (empty_field / fielded / term_or_phrase / group / range)
//! empty_field  = field ":" EOF                      -- hard error
//! fielded      = field ":" (term / phrase / range / group)
//! field        = [a-zA-Z_][a-zA-Z0-9_]*
//! group        = "(" query ")"
//! range        = ("[" / "{") range_value ws "TO" ws range_value ("]" / "}")
//! range_value  = "*" / term
//! term         = literal ("*" / "?" / fuzz)? boost?
//! phrase       = '"' literal (ws literal)* '"' (boost / fuzz)?
//! literal      = (word char / [.,!:;@^-/|])+
//! fuzz         = "~" digit?
//! boost        = "^" number
//! ```
//!
//! Output is the validated query with runs of whitespace collapsed to a
//! single space. Boolean operators (`AND`, `OR`, `NOT`) need no special
//! handling: they parse as ordinary term literals and are reproduced as-is.

use std::collections::{HashMap, HashSet};

use super::{QueryError, QueryFragment};

/// Validate structured query syntax, returning it as an escaped fragment.
///
/// The input is trimmed first; whitespace between clauses is normalized to a
/// single space. Fails with [`QueryError::Malformed`] and the offending
/// character position for anything outside the supported subset.
pub fn parse_and_validate(raw: &str) -> Result<QueryFragment, QueryError> {
    let text = Parser::new(raw.trim(), None, None).run()?;
    Ok(QueryFragment::escaped(text))
}

/// Like [`parse_and_validate`], but rewrites public field names to their
/// backing Solr field names.
///
/// Fields found in `replacements` are renamed; fields in `raw_fields` pass
/// through unchanged; anything else fails with [`QueryError::UnknownField`].
/// An empty replacement map disables field checking entirely.
pub fn parse_with_fields(
    raw: &str,
    replacements: &HashMap<String, String>,
    raw_fields: &HashSet<String>,
) -> Result<QueryFragment, QueryError> {
    let text = Parser::new(raw.trim(), Some(replacements), Some(raw_fields)).run()?;
    Ok(QueryFragment::escaped(text))
}

/// Check whether `raw` is valid query syntax without building a fragment
pub fn validate(raw: &str) -> bool {
    parse_and_validate(raw).is_ok()
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    replacements: Option<&'a HashMap<String, String>>,
    raw_fields: Option<&'a HashSet<String>>,
}

impl<'a> Parser<'a> {
    fn new(
        input: &str,
        replacements: Option<&'a HashMap<String, String>>,
        raw_fields: Option<&'a HashSet<String>>,
    ) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            replacements,
            raw_fields,
        }
    }

    fn run(mut self) -> Result<String, QueryError> {
        let out = self.query()?;
        if !self.at_end() {
            return Err(QueryError::Malformed { position: self.pos });
        }
        Ok(out)
    }

    /// query = clause (ws clause)*
    fn query(&mut self) -> Result<String, QueryError> {
        let Some(first) = self.clause()? else {
            return Err(QueryError::Malformed { position: self.pos });
        };
        let mut out = first;
        loop {
            let save = self.pos;
            if !self.skip_ws() {
                break;
            }
            match self.clause()? {
                Some(next) => {
                    out.push(' ');
                    out.push_str(&next);
                }
                None => {
                    self.pos = save;
                    break;
                }
            }
        }
        Ok(out)
    }

    /// One clause, or `None` (position restored) when nothing matches.
    ///
    /// `EmptyField` and `UnknownField` are hard errors and do not backtrack.
    fn clause(&mut self) -> Result<Option<String>, QueryError> {
        let save = self.pos;
        let mut out = String::new();
        if let Some(op @ ('+' | '-')) = self.peek() {
            out.push(op);
            self.pos += 1;
        }

        // fielded clause, including the empty-field hard error
        let field_save = self.pos;
        if let Some(field) = self.field_name() {
            if self.eat(':') {
                if self.at_end() {
                    return Err(QueryError::EmptyField { field });
                }
                if let Some(value) = self.fielded_value() {
                    out.push_str(&self.map_field(field)?);
                    out.push(':');
                    out.push_str(&value);
                    return Ok(Some(out));
                }
            }
            self.pos = field_save;
        }

        if let Some(term) = self.term_or_phrase() {
            out.push_str(&term);
            return Ok(Some(out));
        }
        if let Some(group) = self.group()? {
            out.push_str(&group);
            return Ok(Some(out));
        }
        if let Some(range) = self.range() {
            out.push_str(&range);
            return Ok(Some(out));
        }

        self.pos = save;
        Ok(None)
    }

    /// fielded value = term / phrase / range / group
    fn fielded_value(&mut self) -> Option<String> {
        if let Some(term) = self.term_or_phrase() {
            return Some(term);
        }
        if let Some(range) = self.range() {
            return Some(range);
        }
        // a hard error inside a fielded group (e.g. `title:(author:)`) is
        // swallowed here on purpose: the PEG falls back to reading the whole
        // thing as a literal, and so do we
        if let Ok(Some(group)) = self.group() {
            return Some(group);
        }
        None
    }

    fn map_field(&self, field: String) -> Result<String, QueryError> {
        let Some(map) = self.replacements else {
            return Ok(field);
        };
        if map.is_empty() {
            return Ok(field);
        }
        if let Some(replacement) = map.get(&field) {
            return Ok(replacement.clone());
        }
        if self.raw_fields.is_some_and(|raw| raw.contains(&field)) {
            return Ok(field);
        }
        Err(QueryError::UnknownField { field })
    }

    /// field = [a-zA-Z_][a-zA-Z0-9_]*
    fn field_name(&mut self) -> Option<String> {
        let first = self.peek()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let start = self.pos;
        self.pos += 1;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn term_or_phrase(&mut self) -> Option<String> {
        self.term().or_else(|| self.phrase())
    }

    /// term = literal ("*" / "?" / fuzz)? boost?
    fn term(&mut self) -> Option<String> {
        let mut out = self.literal()?;
        match self.peek() {
            Some(w @ ('*' | '?')) => {
                out.push(w);
                self.pos += 1;
            }
            Some('~') => out.push_str(&self.fuzz()),
            _ => {}
        }
        if let Some(boost) = self.boost() {
            out.push_str(&boost);
        }
        Some(out)
    }

    /// phrase = '"' literal (ws literal)* '"' (boost / fuzz)?
    fn phrase(&mut self) -> Option<String> {
        let save = self.pos;
        if !self.eat('"') {
            return None;
        }
        let mut out = String::from('"');
        let Some(first) = self.literal() else {
            self.pos = save;
            return None;
        };
        out.push_str(&first);
        loop {
            let word_save = self.pos;
            if !self.skip_ws() {
                break;
            }
            match self.literal() {
                Some(word) => {
                    out.push(' ');
                    out.push_str(&word);
                }
                None => {
                    self.pos = word_save;
                    break;
                }
            }
        }
        if !self.eat('"') {
            self.pos = save;
            return None;
        }
        out.push('"');
        if let Some(boost) = self.boost() {
            out.push_str(&boost);
        } else if self.peek() == Some('~') {
            out.push_str(&self.fuzz());
        }
        Some(out)
    }

    /// group = "(" query ")"
    fn group(&mut self) -> Result<Option<String>, QueryError> {
        let save = self.pos;
        if !self.eat('(') {
            return Ok(None);
        }
        let Some(first) = self.clause()? else {
            self.pos = save;
            return Ok(None);
        };
        let mut inner = first;
        loop {
            let clause_save = self.pos;
            if !self.skip_ws() {
                break;
            }
            match self.clause()? {
                Some(next) => {
                    inner.push(' ');
                    inner.push_str(&next);
                }
                None => {
                    self.pos = clause_save;
                    break;
                }
            }
        }
        if !self.eat(')') {
            self.pos = save;
            return Ok(None);
        }
        Ok(Some(format!("({inner})")))
    }

    /// range = ("[" / "{") range_value ws "TO" ws range_value ("]" / "}")
    fn range(&mut self) -> Option<String> {
        let save = self.pos;
        let (open, close) = match self.peek()? {
            '[' => ('[', ']'),
            '{' => ('{', '}'),
            _ => return None,
        };
        self.pos += 1;
        let backtrack = |parser: &mut Self| {
            parser.pos = save;
            None
        };

        let Some(low) = self.range_value() else {
            return backtrack(self);
        };
        if !self.skip_ws() || !self.eat_keyword("TO") || !self.skip_ws() {
            return backtrack(self);
        }
        let Some(high) = self.range_value() else {
            return backtrack(self);
        };
        if !self.eat(close) {
            return backtrack(self);
        }
        Some(format!("{open}{low} TO {high}{close}"))
    }

    /// range_value = "*" / term
    fn range_value(&mut self) -> Option<String> {
        if self.peek() == Some('*') {
            self.pos += 1;
            return Some("*".to_string());
        }
        self.term()
    }

    /// literal = (word char / [.,!:;@^-/|])+
    fn literal(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_literal_char(c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            None
        } else {
            Some(self.chars[start..self.pos].iter().collect())
        }
    }

    /// fuzz = "~" digit?  (caller has already seen the tilde)
    fn fuzz(&mut self) -> String {
        let mut out = String::from('~');
        self.pos += 1;
        if let Some(d) = self.peek()
            && d.is_ascii_digit()
        {
            out.push(d);
            self.pos += 1;
        }
        out
    }

    /// boost = "^" number, number = digits ("." digits)?
    fn boost(&mut self) -> Option<String> {
        let save = self.pos;
        if !self.eat('^') {
            return None;
        }
        let mut out = String::from('^');
        let digits_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            self.pos = save;
            return None;
        }
        out.extend(&self.chars[digits_start..self.pos]);
        if self.peek() == Some('.') {
            let frac_save = self.pos;
            self.pos += 1;
            let frac_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == frac_start {
                self.pos = frac_save;
            } else {
                out.push('.');
                out.extend(&self.chars[frac_start..self.pos]);
            }
        }
        Some(out)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let save = self.pos;
        for expected in keyword.chars() {
            if !self.eat(expected) {
                self.pos = save;
                return false;
            }
        }
        true
    }

    /// Consume a run of whitespace; true if at least one character consumed
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }
}

fn is_literal_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '.' | ',' | '!' | ':' | ';' | '@' | '^' | '-' | '/' | '|'
        )
}
