//! Variable list parsing for SecRule.
//!
//! A variable list is pipe separated; each entry is `[!&]NAME[:SELECTOR]`.
//! The selector is a literal key, a `/regex/`, or (for `XML` only) an XPath
//! expression that may itself contain `|` inside brackets or quotes.

use crate::error::{Error, Result};
use crate::variables::{KeySelector, VariableName};
use regex::RegexBuilder;
use std::fmt;

/// One selector of a rule's variable list.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSelector {
    /// Collection.
    pub name: VariableName,
    /// Keys selected.
    pub key: KeySelector,
    /// `&NAME`: the operator sees the number of selected values.
    pub count: bool,
    /// Keys excluded by `!NAME:key` siblings.
    pub exceptions: Vec<KeySelector>,
}

impl VariableSelector {
    /// Selector for a whole collection.
    pub fn collection(name: VariableName) -> Self {
        Self {
            name,
            key: KeySelector::None,
            count: false,
            exceptions: Vec::new(),
        }
    }
}

impl fmt::Display for VariableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count {
            f.write_str("&")?;
        }
        f.write_str(self.name.as_str())?;
        match &self.key {
            KeySelector::None => Ok(()),
            key => write!(f, ":{}", key.display()),
        }
    }
}

/// A variable list before `!` entries are folded into their siblings.
#[derive(Debug, Clone, Default)]
pub struct VariableList {
    /// Positive selectors in declared order.
    pub selectors: Vec<VariableSelector>,
    /// `!NAME[:key]` entries.
    pub exclusions: Vec<(VariableName, KeySelector)>,
}

impl VariableList {
    /// Fold the exclusions into every selector of the same collection.
    pub fn into_selectors(self) -> Vec<VariableSelector> {
        let mut selectors = self.selectors;
        apply_exclusions(&mut selectors, &self.exclusions);
        selectors
    }
}

/// Add each `(collection, key)` exclusion to the selectors of that
/// collection.
pub fn apply_exclusions(selectors: &mut [VariableSelector], exclusions: &[(VariableName, KeySelector)]) {
    for (name, key) in exclusions {
        for selector in selectors.iter_mut().filter(|s| s.name == *name) {
            if !selector.exceptions.contains(key) {
                selector.exceptions.push(key.clone());
            }
        }
    }
}

/// Parse a variable list, folding `!` entries into their siblings.
pub fn parse_variables(input: &str) -> Result<Vec<VariableSelector>> {
    Ok(parse_variable_list(input)?.into_selectors())
}

/// Parse a variable list, keeping `!` entries separate.
pub fn parse_variable_list(input: &str) -> Result<VariableList> {
    let mut list = VariableList::default();
    for part in split_entries(input)? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.strip_prefix('!') {
            Some(rest) => {
                let (name, key) = parse_target(rest)?;
                list.exclusions.push((name, key));
            }
            None => {
                let (count, rest) = match part.strip_prefix('&') {
                    Some(rest) => (true, rest),
                    None => (false, part),
                };
                let (name, key) = parse_target(rest)?;
                list.selectors.push(VariableSelector {
                    name,
                    key,
                    count,
                    exceptions: Vec::new(),
                });
            }
        }
    }
    if list.selectors.is_empty() && list.exclusions.is_empty() {
        return Err(Error::parse("empty variable list", ""));
    }
    Ok(list)
}

/// Parse `NAME[:SELECTOR]` into a collection and key selector.
pub fn parse_target(input: &str) -> Result<(VariableName, KeySelector)> {
    let input = input.trim();
    let (name, selector) = match input.split_once(':') {
        Some((name, selector)) => (name, Some(selector)),
        None => (input, None),
    };
    let name = VariableName::from_name(name).ok_or_else(|| Error::UnknownVariable {
        name: name.to_string(),
    })?;

    let key = match selector {
        None | Some("") => KeySelector::None,
        Some(sel) if name == VariableName::Xml => KeySelector::Literal(sel.to_string()),
        Some(sel) if sel.len() >= 2 && sel.starts_with('/') && sel.ends_with('/') => {
            let pattern = &sel[1..sel.len() - 1];
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(name.folds_keys())
                .build()
                .map_err(|e| Error::RegexCompile {
                    pattern: pattern.to_string(),
                    source: e,
                })?;
            KeySelector::Regex(regex)
        }
        Some(sel) => {
            let sel = sel
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .unwrap_or(sel);
            KeySelector::Literal(sel.to_string())
        }
    };
    Ok((name, key))
}

/// Split on `|`, skipping pipes inside a `/regex/` selector and inside
/// brackets or quotes of an XML selector.
fn split_entries(input: &str) -> Result<Vec<&str>> {
    let bytes = input.as_bytes();
    let mut entries = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'|' {
            entries.push(&input[start..i]);
            i += 1;
            start = i;
            continue;
        }
        if bytes[i] != b':' {
            i += 1;
            continue;
        }

        let head = input[start..i].trim_start_matches(['!', '&', ' ']);
        i += 1;
        if head.eq_ignore_ascii_case("XML") {
            i = skip_xpath(bytes, i);
        } else if bytes.get(i) == Some(&b'/') {
            i = skip_regex(bytes, i + 1).ok_or_else(|| {
                Error::parse(format!("unterminated regex selector in '{}'", input), "")
            })?;
        } else {
            while i < bytes.len() && bytes[i] != b'|' {
                i += 1;
            }
        }
    }
    entries.push(&input[start..]);
    Ok(entries)
}

/// Index just past the closing `/` of a regex selector body starting at
/// `from`. The closing slash is the first unescaped `/` followed by `|` or
/// the end of input.
fn skip_regex(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'/' if matches!(bytes.get(i + 1), None | Some(b'|')) => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn skip_xpath(bytes: &[u8], from: usize) -> usize {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'|' if depth == 0 => return i,
                _ => {}
            },
        }
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_list() {
        let vars = parse_variables("ARGS|REQUEST_HEADERS:User-Agent|&TX:score").unwrap();
        assert_eq!(vars.len(), 3);
        assert_eq!(vars[0].name, VariableName::Args);
        assert_eq!(vars[0].key, KeySelector::None);
        assert_eq!(vars[1].key, KeySelector::Literal("User-Agent".into()));
        assert!(vars[2].count);
        assert_eq!(vars[2].to_string(), "&TX:score");
    }

    #[test]
    fn test_regex_selector_with_pipe() {
        let vars = parse_variables("ARGS:/^(?:a|b)$/|ARGS_NAMES").unwrap();
        assert_eq!(vars.len(), 2);
        match &vars[0].key {
            KeySelector::Regex(re) => {
                assert!(re.is_match("a"));
                assert!(!re.is_match("c"));
            }
            other => panic!("unexpected selector {other:?}"),
        }
    }

    #[test]
    fn test_regex_on_folded_collection_ignores_case() {
        let vars = parse_variables("REQUEST_HEADERS:/^x-forwarded/").unwrap();
        assert!(vars[0].key.matches("X-Forwarded-For", true));
    }

    #[test]
    fn test_exclusions_apply_to_same_collection() {
        let vars = parse_variables("ARGS|ARGS_NAMES|!ARGS:password|!ARGS:/^tok/").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].exceptions.len(), 2);
        assert_eq!(vars[0].exceptions[0], KeySelector::Literal("password".into()));
        assert!(vars[1].exceptions.is_empty());
    }

    #[test]
    fn test_xml_selector_keeps_pipes() {
        let vars = parse_variables("XML://a[@b='x|y']|ARGS").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].key, KeySelector::Literal("//a[@b='x|y']".into()));
        assert_eq!(vars[1].name, VariableName::Args);

        let vars = parse_variables("XML:/*").unwrap();
        assert_eq!(vars[0].key, KeySelector::Literal("/*".into()));
    }

    #[test]
    fn test_case_insensitive_names() {
        let vars = parse_variables("args:q|request_method").unwrap();
        assert_eq!(vars[0].name, VariableName::Args);
        assert_eq!(vars[1].name, VariableName::RequestMethod);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_variables("NOT_A_VAR"),
            Err(Error::UnknownVariable { .. })
        ));
        assert!(parse_variables("ARGS:/(/").is_err());
        assert!(parse_variables("").is_err());
    }
}
