//! Value escaping.
//!
//! Values travel inside space-separated cells, so every reserved character is
//! replaced by a two-character escape before sending and restored on receipt.
//! The table is fixed and shared by serialization and parsing.
//!
//! # Example
//!
//! ```
//! use serverquery_client::protocol::{escape, unescape};
//!
//! assert_eq!(escape("a b|c"), r"a\sb\pc");
//! assert_eq!(unescape(r"a\sb\pc"), "a b|c");
//! ```

/// Reserved characters and the letter following `\` in their escape.
pub const ESCAPE_TABLE: [(char, char); 12] = [
    ('\\', '\\'),
    ('/', '/'),
    (' ', 's'),
    ('|', 'p'),
    (';', ';'),
    ('\u{07}', 'a'),
    ('\u{08}', 'b'),
    ('\u{0C}', 'f'),
    ('\n', 'n'),
    ('\r', 'r'),
    ('\t', 't'),
    ('\u{0B}', 'v'),
];

#[inline]
fn escape_code(c: char) -> Option<char> {
    ESCAPE_TABLE
        .iter()
        .find(|(raw, _)| *raw == c)
        .map(|(_, code)| *code)
}

#[inline]
fn unescape_code(code: char) -> Option<char> {
    ESCAPE_TABLE
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(raw, _)| *raw)
}

/// Escape a value for transmission.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match escape_code(c) {
            Some(code) => {
                out.push('\\');
                out.push(code);
            }
            None => out.push(c),
        }
    }
    out
}

/// Restore a received value.
///
/// Unknown escapes and a trailing lone backslash are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(code) => match unescape_code(code) {
                Some(raw) => out.push(raw),
                None => {
                    out.push('\\');
                    out.push(code);
                }
            },
            None => out.push('\\'),
        }
    }

    out
}
