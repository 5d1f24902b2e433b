//! Injection detection operators (@detectSQLi, @detectXSS).

use super::traits::{Operator, OperatorContext};
use crate::libinjection;

/// SQL injection detection. The fingerprint is captured into `TX:0`.
pub struct DetectSqliOperator;

impl Operator for DetectSqliOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        match libinjection::detect_sqli(&String::from_utf8_lossy(value)) {
            Some(fingerprint) => {
                ctx.capture(0, fingerprint.as_bytes());
                true
            }
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "detectSQLi"
    }
}

/// XSS detection.
pub struct DetectXssOperator;

impl Operator for DetectXssOperator {
    fn evaluate(&self, _ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        libinjection::detect_xss(&String::from_utf8_lossy(value))
    }

    fn name(&self) -> &'static str {
        "detectXSS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::tests::{eval, eval_capturing};
    use crate::variables::{CollectionStore, VariableName};

    #[test]
    fn test_detect_sqli_captures_fingerprint() {
        let mut store = CollectionStore::new();
        assert!(eval_capturing(&DetectSqliOperator, "1' OR '1'='1", &mut store));
        let fp = store.first(VariableName::Tx, Some("0")).unwrap();
        assert!(!fp.is_empty());
        assert!(!eval(&DetectSqliOperator, "hello world"));
    }

    #[test]
    fn test_detect_xss() {
        assert!(eval(&DetectXssOperator, "<script>alert(1)</script>"));
        assert!(!eval(&DetectXssOperator, "<p>hello</p>"));
    }
}
