//! String and numeric comparison operators.
//!
//! Parameters may contain macros; they are expanded on every evaluation.

use super::traits::{Operator, OperatorContext};
use crate::macros::MacroString;

/// Which string comparison a [`StringOperator`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMatch {
    /// `@beginsWith`
    BeginsWith,
    /// `@contains`
    Contains,
    /// `@containsWord`
    ContainsWord,
    /// `@endsWith`
    EndsWith,
    /// `@streq`
    StrEq,
    /// `@strmatch`
    StrMatch,
    /// `@within`: the value occurs in the parameter.
    Within,
}

/// Byte-literal string comparison; no case folding.
pub struct StringOperator {
    kind: StringMatch,
    param: MacroString,
}

impl StringOperator {
    /// Create the operator.
    pub fn new(kind: StringMatch, param: MacroString) -> Self {
        Self { kind, param }
    }
}

/// Start offsets of `needle` in `haystack`. An empty needle occurs at 0.
fn occurrences<'h>(haystack: &'h [u8], needle: &'h [u8]) -> impl Iterator<Item = usize> + 'h {
    let empty = needle.is_empty().then_some(0);
    let found = (!needle.is_empty())
        .then(|| haystack.windows(needle.len()).enumerate())
        .into_iter()
        .flatten()
        .filter(move |(_, w)| *w == needle)
        .map(|(i, _)| i);
    empty.into_iter().chain(found)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    occurrences(haystack, needle).next().is_some()
}

fn contains_word(haystack: &[u8], word: &[u8]) -> bool {
    if word.is_empty() {
        return false;
    }
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    occurrences(haystack, word).any(|start| {
        let end = start + word.len();
        let before_ok = start == 0 || !is_word(haystack[start - 1]);
        let after_ok = end == haystack.len() || !is_word(haystack[end]);
        before_ok && after_ok
    })
}

impl Operator for StringOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        let param = ctx.expand(&self.param);
        let param = param.as_bytes();
        let matched = match self.kind {
            StringMatch::BeginsWith => value.starts_with(param),
            StringMatch::Contains | StringMatch::StrMatch => contains(value, param),
            StringMatch::ContainsWord => contains_word(value, param),
            StringMatch::EndsWith => value.ends_with(param),
            StringMatch::StrEq => value == param,
            StringMatch::Within => contains(param, value),
        };
        if matched {
            let captured = if self.kind == StringMatch::Within {
                value.to_vec()
            } else {
                param.to_vec()
            };
            ctx.capture(0, &captured);
        }
        matched
    }

    fn name(&self) -> &'static str {
        match self.kind {
            StringMatch::BeginsWith => "beginsWith",
            StringMatch::Contains => "contains",
            StringMatch::ContainsWord => "containsWord",
            StringMatch::EndsWith => "endsWith",
            StringMatch::StrEq => "streq",
            StringMatch::StrMatch => "strmatch",
            StringMatch::Within => "within",
        }
    }
}

/// Numeric relation tested by a [`NumericOperator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `@eq`
    Eq,
    /// `@ne`
    Ne,
    /// `@gt`
    Gt,
    /// `@ge`
    Ge,
    /// `@lt`
    Lt,
    /// `@le`
    Le,
}

/// Signed decimal comparison of the value against the parameter.
pub struct NumericOperator {
    cmp: Comparison,
    param: MacroString,
}

impl NumericOperator {
    /// Create the operator.
    pub fn new(cmp: Comparison, param: MacroString) -> Self {
        Self { cmp, param }
    }
}

/// Parse a decimal integer; anything non-numeric counts as 0.
pub(crate) fn to_number(s: &str) -> i64 {
    s.trim().parse().unwrap_or(0)
}

impl Operator for NumericOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        let target = to_number(&ctx.expand(&self.param));
        let n = to_number(&String::from_utf8_lossy(value));
        match self.cmp {
            Comparison::Eq => n == target,
            Comparison::Ne => n != target,
            Comparison::Gt => n > target,
            Comparison::Ge => n >= target,
            Comparison::Lt => n < target,
            Comparison::Le => n <= target,
        }
    }

    fn name(&self) -> &'static str {
        match self.cmp {
            Comparison::Eq => "eq",
            Comparison::Ne => "ne",
            Comparison::Gt => "gt",
            Comparison::Ge => "ge",
            Comparison::Lt => "lt",
            Comparison::Le => "le",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::tests::{eval, eval_capturing, eval_with};
    use crate::variables::{CollectionStore, VariableName};

    fn string_op(kind: StringMatch, param: &str) -> StringOperator {
        StringOperator::new(kind, MacroString::new(param).unwrap())
    }

    fn numeric_op(cmp: Comparison, param: &str) -> NumericOperator {
        NumericOperator::new(cmp, MacroString::new(param).unwrap())
    }

    #[test]
    fn test_contains_begins_ends() {
        assert!(eval(&string_op(StringMatch::Contains, "admin"), "/admin/users"));
        assert!(!eval(&string_op(StringMatch::Contains, "admin"), "/ADMIN"));
        assert!(eval(&string_op(StringMatch::BeginsWith, "/admin"), "/admin/users"));
        assert!(!eval(&string_op(StringMatch::BeginsWith, "/admin"), "/users/admin"));
        assert!(eval(&string_op(StringMatch::EndsWith, ".php"), "index.php"));
        assert!(!eval(&string_op(StringMatch::EndsWith, ".php"), "index.html"));
    }

    #[test]
    fn test_streq_and_within() {
        assert!(eval(&string_op(StringMatch::StrEq, "admin"), "admin"));
        assert!(!eval(&string_op(StringMatch::StrEq, "admin"), "Admin"));

        let within = string_op(StringMatch::Within, "GET POST HEAD");
        assert!(eval(&within, "POST"));
        assert!(!eval(&within, "DELETE"));
    }

    #[test]
    fn test_contains_word() {
        let op = string_op(StringMatch::ContainsWord, "select");
        assert!(eval(&op, "union select 1"));
        assert!(eval(&op, "select"));
        assert!(!eval(&op, "selected"));
        assert!(!eval(&op, "preselect"));
    }

    #[test]
    fn test_binary_values() {
        assert!(eval(&string_op(StringMatch::Contains, "evil"), b"\xffevil\x00"));
        assert!(eval(&string_op(StringMatch::Contains, ""), b"\xfe"));
        assert!(eval(&string_op(StringMatch::Within, "abc"), b""));
        assert!(!eval(&string_op(StringMatch::StrEq, "\u{fffd}"), b"\xff"));
    }

    #[test]
    fn test_capture_of_literal() {
        let mut store = CollectionStore::new();
        let op = string_op(StringMatch::Contains, "evil");
        assert!(eval_capturing(&op, "very evil value", &mut store));
        assert_eq!(store.first(VariableName::Tx, Some("0")), Some("evil"));
    }

    #[test]
    fn test_numeric_operators() {
        assert!(eval(&numeric_op(Comparison::Eq, "10"), "10"));
        assert!(!eval(&numeric_op(Comparison::Eq, "10"), "11"));
        assert!(eval(&numeric_op(Comparison::Ne, "10"), "11"));
        assert!(eval(&numeric_op(Comparison::Gt, "10"), "11"));
        assert!(!eval(&numeric_op(Comparison::Gt, "10"), "10"));
        assert!(eval(&numeric_op(Comparison::Ge, "10"), "10"));
        assert!(eval(&numeric_op(Comparison::Lt, "10"), "-3"));
        assert!(eval(&numeric_op(Comparison::Le, "10"), "10"));
    }

    #[test]
    fn test_non_numeric_is_zero() {
        assert!(eval(&numeric_op(Comparison::Eq, "0"), "abc"));
        assert!(eval(&numeric_op(Comparison::Lt, "junk"), "-1"));
    }

    #[test]
    fn test_macro_parameter() {
        let mut store = CollectionStore::new();
        store
            .collection_mut(VariableName::Tx)
            .set_one("inbound_anomaly_score_threshold", "5");
        let op = numeric_op(Comparison::Ge, "%{tx.inbound_anomaly_score_threshold}");
        assert!(eval_with(&op, "7", &mut store));
        assert!(!eval_with(&op, "4", &mut store));
    }
}
