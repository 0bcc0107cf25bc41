//! Reserved-character escaping
//!
//! Total over arbitrary text: every input produces an escaped fragment, no
//! failure modes. Structured syntax validation lives in [`super::parser`].

use super::QueryFragment;

/// Characters with syntactic meaning in Solr's query language
///
/// `&` and `|` only carry meaning when doubled (`&&`, `||`); a single
/// occurrence passes through unescaped.
pub const RESERVED_CHARACTERS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];

/// Check whether a character belongs to the reserved set
pub fn is_reserved(c: char) -> bool {
    RESERVED_CHARACTERS.contains(&c)
}

/// Reserved characters escaped one-for-one regardless of context
const SINGLE_RESERVED: &[char] = &[
    '+', '-', '!', '(', ')', '{', '}', '[', ']', '^', '~', '*', '?', ':', '\\', '/',
];

/// Escape every reserved character in `raw` so Solr treats it literally.
///
/// A properly balanced quoted phrase passes through verbatim: everything
/// between a pair of double quotes is legal phrase content and needs no
/// escaping. An unbalanced quote is escaped like any other reserved
/// character. Unicode text passes through untouched; the reserved set is
/// ASCII punctuation only.
pub fn escape(raw: &str) -> QueryFragment {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                // balanced phrase: emit quote-to-quote verbatim
                if let Some(offset) = chars[i + 1..].iter().position(|&n| n == '"') {
                    for &p in &chars[i..=i + 1 + offset] {
                        out.push(p);
                    }
                    i += offset + 2;
                } else {
                    out.push('\\');
                    out.push('"');
                    i += 1;
                }
            }
            '&' | '|' if chars.get(i + 1) == Some(&c) => {
                out.push('\\');
                out.push(c);
                out.push(c);
                i += 2;
            }
            c if SINGLE_RESERVED.contains(&c) => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    QueryFragment::escaped(out)
}
