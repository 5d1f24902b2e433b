//! Pattern matching operators (@rx, @pm, @pmFromFile).

use super::traits::{Operator, OperatorContext};
use crate::error::{Error, Result};
use crate::variables::CAPTURE_REGISTERS;
use aho_corasick::AhoCorasick;
use regex::bytes::{Regex, RegexBuilder};
use std::path::Path;

/// Regex operator (@rx), compiled when the rule is loaded.
pub struct RxOperator {
    regex: Regex,
}

impl RxOperator {
    /// Compile `pattern`; `.` also matches newlines.
    ///
    /// Patterns match bytes: `.` and `\xNN` see single bytes and classes
    /// are ASCII. A pattern that only compiles with Unicode classes (e.g.
    /// `\p{L}`) is built in Unicode mode instead.
    pub fn new(pattern: &str) -> Result<Self> {
        let build = |unicode: bool| {
            RegexBuilder::new(pattern)
                .unicode(unicode)
                .dot_matches_new_line(true)
                .size_limit(64 * 1024 * 1024)
                .build()
        };
        let regex = build(false)
            .or_else(|_| build(true))
            .map_err(|e| Error::RegexCompile {
                pattern: pattern.to_string(),
                source: e,
            })?;
        Ok(Self { regex })
    }
}

impl Operator for RxOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        if !ctx.capturing() {
            return self.regex.is_match(value);
        }
        match self.regex.captures(value) {
            Some(caps) => {
                for (i, group) in caps.iter().take(CAPTURE_REGISTERS).enumerate() {
                    if let Some(m) = group {
                        ctx.capture(i, m.as_bytes());
                    }
                }
                true
            }
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "rx"
    }
}

/// Phrase match operator (@pm, @pmFromFile). Case-insensitive.
pub struct PmOperator {
    automaton: AhoCorasick,
    name: &'static str,
}

impl PmOperator {
    /// Build from space-separated phrases.
    pub fn new(phrases: &str) -> Result<Self> {
        Self::build(phrases.split_whitespace(), "pm")
    }

    /// Build from phrase files (space-separated paths) resolved against `root`.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_files(paths: &str, root: &Path) -> Result<Self> {
        let mut phrases = Vec::new();
        for path in paths.split_whitespace() {
            let content = read_data_file(path, root)?;
            phrases.extend(data_lines(&content).map(str::to_string));
        }
        Self::build(phrases.iter().map(String::as_str), "pmFromFile")
    }

    fn build<'p>(phrases: impl Iterator<Item = &'p str>, name: &'static str) -> Result<Self> {
        let phrases: Vec<&str> = phrases.collect();
        if phrases.is_empty() {
            return Err(Error::PatternSet {
                message: "empty pattern list".to_string(),
            });
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&phrases)
            .map_err(|e| Error::PatternSet {
                message: e.to_string(),
            })?;
        Ok(Self { automaton, name })
    }
}

impl Operator for PmOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        if !ctx.capturing() {
            return self.automaton.is_match(value);
        }
        let mut matched = false;
        for (i, m) in self
            .automaton
            .find_iter(value)
            .take(CAPTURE_REGISTERS)
            .enumerate()
        {
            matched = true;
            ctx.capture(i, &value[m.range()]);
        }
        matched
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Read a data file named by an operator parameter.
pub(crate) fn read_data_file(path: &str, root: &Path) -> Result<String> {
    let full = root.join(path);
    std::fs::read_to_string(&full).map_err(|e| Error::RuleFileLoad {
        path: full,
        source: e,
    })
}

/// Non-empty, non-comment lines of a data file, CR stripped.
pub(crate) fn data_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(|l| l.trim_end_matches('\r').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::tests::{eval, eval_capturing};
    use crate::variables::{CollectionStore, VariableName};

    #[test]
    fn test_rx_simple() {
        let op = RxOperator::new("^admin").unwrap();
        assert!(eval(&op, "admin"));
        assert!(!eval(&op, "user"));
    }

    #[test]
    fn test_rx_bad_pattern_is_error() {
        assert!(RxOperator::new("(unclosed").is_err());
    }

    #[test]
    fn test_rx_captures() {
        let op = RxOperator::new(r"^(\d+)-(\d+)$").unwrap();
        let mut store = CollectionStore::new();
        assert!(eval_capturing(&op, "4-5", &mut store));
        assert_eq!(store.first(VariableName::Tx, Some("0")), Some("4-5"));
        assert_eq!(store.first(VariableName::Tx, Some("1")), Some("4"));
        assert_eq!(store.first(VariableName::Tx, Some("2")), Some("5"));
    }

    #[test]
    fn test_rx_dot_matches_newline() {
        let op = RxOperator::new("a.b").unwrap();
        assert!(eval(&op, "a\nb"));
    }

    #[test]
    fn test_rx_matches_raw_bytes() {
        let op = RxOperator::new(r"\xff\xfe").unwrap();
        assert!(eval(&op, b"x\xff\xfey"));
        assert!(!eval(&op, "\u{ff}\u{fe}"));

        let op = RxOperator::new("^a.c$").unwrap();
        assert!(eval(&op, b"a\x80c"));

        let op = RxOperator::new(r"^\p{Greek}+$").unwrap();
        assert!(eval(&op, "αβγ"));
    }

    #[test]
    fn test_pm_case_insensitive_with_captures() {
        let op = PmOperator::new("admin root").unwrap();
        assert!(eval(&op, "the ADMIN user"));
        assert!(!eval(&op, "guest"));

        let mut store = CollectionStore::new();
        assert!(eval_capturing(&op, "Root and admin", &mut store));
        assert_eq!(store.first(VariableName::Tx, Some("0")), Some("Root"));
        assert_eq!(store.first(VariableName::Tx, Some("1")), Some("admin"));
    }

    #[test]
    fn test_pm_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("words.data"),
            "# comment\r\n\r\nsqlmap\r\nnikto\n",
        )
        .unwrap();
        let op = PmOperator::from_files("words.data", dir.path()).unwrap();
        assert!(eval(&op, "User-Agent: Nikto/2.1"));
        assert!(!eval(&op, "# comment"));
        assert!(PmOperator::from_files("missing.data", dir.path()).is_err());
    }
}
