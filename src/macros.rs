//! `%{NAME.KEY}` macro strings.
//!
//! Action arguments and operator parameters are compiled once at load into a
//! [`MacroString`]; expansion against a transaction's collections is a plain
//! walk over the segments.

use crate::error::{Error, Result};
use crate::variables::{CollectionStore, VariableName};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Var {
        name: VariableName,
        key: Option<String>,
    },
}

/// A string that may reference collection values.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroString {
    raw: String,
    segments: Vec<Segment>,
}

impl MacroString {
    /// Compile `input`. Unknown variable names and unterminated `%{` fail.
    pub fn new(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = input;

        while let Some(start) = rest.find("%{") {
            text.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| Error::Macro {
                text: input.to_string(),
                message: "unterminated %{".to_string(),
            })?;
            let body = after[..end].trim();
            let (name, key) = match body.split_once('.') {
                Some((name, key)) => (name, Some(key.to_string())),
                None => (body, None),
            };
            let name = VariableName::from_name(name).ok_or_else(|| Error::Macro {
                text: input.to_string(),
                message: format!("unknown variable '{}'", name),
            })?;
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(Segment::Var { name, key });
            rest = &after[end + 1..];
        }
        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            raw: input.to_string(),
            segments,
        })
    }

    /// A macro string with no substitutions.
    pub fn literal(input: impl Into<String>) -> Self {
        let raw = input.into();
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Text(raw.clone())]
        };
        Self { raw, segments }
    }

    /// Text as written in the rule.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether expansion can never change the text.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Text(_)))
    }

    /// Substitute every reference with the first value it names, or the
    /// empty string when there is none.
    pub fn expand(&self, store: &CollectionStore) -> Cow<'_, str> {
        if self.is_literal() {
            return Cow::Borrowed(&self.raw);
        }
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Var { name, key } => {
                    if let Some(v) = store.first(*name, key.as_deref()) {
                        out.push_str(v);
                    }
                }
            }
        }
        Cow::Owned(out)
    }
}

impl fmt::Display for MacroString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_borrows() {
        let m = MacroString::new("plain text").unwrap();
        assert!(m.is_literal());
        let store = CollectionStore::new();
        assert!(matches!(m.expand(&store), Cow::Borrowed("plain text")));
    }

    #[test]
    fn test_expand_keyed_and_anonymous() {
        let mut store = CollectionStore::new();
        store.collection_mut(VariableName::Tx).set_one("anomaly_score", "25");
        store.set_value(VariableName::MatchedVar, "<script>");

        let m = MacroString::new("Score is %{TX.anomaly_score}, matched %{MATCHED_VAR}").unwrap();
        assert_eq!(m.expand(&store), "Score is 25, matched <script>");
    }

    #[test]
    fn test_names_case_insensitive_and_missing_is_empty() {
        let mut store = CollectionStore::new();
        store
            .collection_mut(VariableName::RequestHeaders)
            .add("Host", "example.com");
        let m = MacroString::new("[%{request_headers.host}][%{tx.nothing}]").unwrap();
        assert_eq!(m.expand(&store), "[example.com][]");
    }

    #[test]
    fn test_no_nested_expansion() {
        let mut store = CollectionStore::new();
        store.collection_mut(VariableName::Tx).set_one("a", "%{tx.b}");
        store.collection_mut(VariableName::Tx).set_one("b", "inner");
        let m = MacroString::new("%{tx.a}").unwrap();
        assert_eq!(m.expand(&store), "%{tx.b}");
    }

    #[test]
    fn test_compile_errors() {
        assert!(MacroString::new("%{NOT_A_VARIABLE}").is_err());
        assert!(MacroString::new("%{tx.open").is_err());
    }

    #[test]
    fn test_capture_registers() {
        let mut store = CollectionStore::new();
        store.capture_set(1, "4");
        store.capture_set(2, "5");
        let m = MacroString::new("%{tx.1}-%{TX.2}").unwrap();
        assert_eq!(m.expand(&store), "4-5");
        assert_eq!(m.to_string(), "%{tx.1}-%{TX.2}");
    }
}
