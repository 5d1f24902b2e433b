//! Pure Rust SQL injection and XSS detectors in the style of libinjection.
//!
//! The SQL detector tokenizes input into a short fingerprint of token
//! classes and checks it against attack shapes; the XSS detector scans for
//! executable HTML constructs.

mod sqli;
mod xss;

pub use sqli::{detect_sqli, fingerprint};
pub use xss::detect_xss;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqli_detection() {
        assert!(detect_sqli("1' OR '1'='1").is_some());
        assert!(detect_sqli("1; DROP TABLE users--").is_some());
        assert!(detect_sqli("admin'--").is_some());
        assert!(detect_sqli("1 UNION SELECT * FROM users").is_some());
        assert!(detect_sqli("hello world").is_none());
        assert!(detect_sqli("normal query string").is_none());
    }

    #[test]
    fn test_xss_detection() {
        assert!(detect_xss("<script>alert(1)</script>"));
        assert!(detect_xss("javascript:alert(1)"));
        assert!(detect_xss("<img src=x onerror=alert(1)>"));
        assert!(detect_xss("<svg onload=alert(1)>"));
        assert!(!detect_xss("hello world"));
        assert!(!detect_xss("<p>Normal paragraph</p>"));
    }
}
