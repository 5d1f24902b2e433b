//! XSS detection by scanning for executable HTML constructs.

use phf::phf_set;

static DANGEROUS_TAGS: phf::Set<&'static str> = phf_set! {
    "script", "iframe", "frame", "frameset", "object", "embed", "applet",
    "base", "link", "meta", "style", "svg", "xml", "xss", "vmlframe",
    "import", "isindex", "math",
};

static URL_ATTRIBUTES: phf::Set<&'static str> = phf_set! {
    "href", "src", "action", "formaction", "data", "background", "lowsrc",
    "dynsrc", "xlink:href", "poster", "codebase",
};

const DANGEROUS_SCHEMES: &[&str] = &["javascript:", "vbscript:", "livescript:", "data:"];

/// Lower-case `s` and drop characters browsers ignore inside a scheme.
fn squeeze(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect()
}

fn has_dangerous_scheme(value: &str) -> bool {
    let v = squeeze(value.trim_start_matches(|c: char| {
        c.is_whitespace() || c == '"' || c == '\'' || c == '`'
    }));
    DANGEROUS_SCHEMES.iter().any(|s| v.starts_with(s))
}

fn is_event_handler(attr: &str) -> bool {
    attr.len() > 2
        && attr.starts_with("on")
        && attr[2..].bytes().all(|b| b.is_ascii_alphabetic())
}

/// Scan attributes starting at `i`; returns true on the first dangerous one.
fn scan_attributes(s: &str, mut i: usize) -> bool {
    let bytes = s.as_bytes();
    while i < bytes.len() && bytes[i] != b'>' {
        if bytes[i].is_ascii_whitespace() || bytes[i] == b'/' {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !matches!(bytes[i], b'=' | b'>' | b'/') && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let attr = &s[start..i];
        if is_event_handler(attr) {
            return true;
        }
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = match bytes.get(i) {
            Some(&q) if q == b'"' || q == b'\'' || q == b'`' => {
                let end = s[i + 1..].find(q as char).map_or(s.len(), |p| i + 1 + p);
                let v = &s[i + 1..end];
                i = (end + 1).min(s.len());
                v
            }
            _ => {
                let start = i;
                while i < bytes.len() && bytes[i] != b'>' && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &s[start..i]
            }
        };
        if URL_ATTRIBUTES.contains(attr) && has_dangerous_scheme(value) {
            return true;
        }
        if attr == "style" {
            let v = squeeze(value);
            if v.contains("expression(") || v.contains("url(javascript") {
                return true;
            }
        }
    }
    false
}

/// Whether `input` contains script that a browser would execute.
pub fn detect_xss(input: &str) -> bool {
    let lower: String = input.replace('\0', "").to_ascii_lowercase();

    if has_dangerous_scheme(&lower) {
        return true;
    }

    // Attribute context: `" onmouseover=alert(1)`.
    let unquoted = lower.trim_start_matches(|c: char| c == '"' || c == '\'' || c == '`');
    if unquoted.len() < lower.len() && scan_attributes(unquoted, 0) {
        return true;
    }

    let bytes = lower.as_bytes();
    let mut search = 0;
    while let Some(pos) = lower[search..].find('<') {
        let mut i = search + pos + 1;
        search = i;
        if bytes.get(i) == Some(&b'/') {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b':' | b'-')) {
            i += 1;
        }
        if i == start || !bytes[start].is_ascii_alphabetic() {
            continue;
        }
        let tag = &lower[start..i];
        if DANGEROUS_TAGS.contains(tag) {
            return true;
        }
        if scan_attributes(&lower, i) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_tags() {
        assert!(detect_xss("<script>alert(1)</script>"));
        assert!(detect_xss("<ScRiPt src=//evil>"));
        assert!(detect_xss("<iframe src=x>"));
    }

    #[test]
    fn test_event_handlers() {
        assert!(detect_xss("<img src=x onerror=alert(1)>"));
        assert!(detect_xss("<body onload='x()'>"));
        assert!(detect_xss("\" onmouseover=alert(1) x=\""));
    }

    #[test]
    fn test_url_schemes() {
        assert!(detect_xss("javascript:alert(1)"));
        assert!(detect_xss("<a href=\"java\tscript:alert(1)\">x</a>"));
        assert!(detect_xss("<form action=vbscript:msgbox(1)>"));
    }

    #[test]
    fn test_style_expression() {
        assert!(detect_xss("<div style=\"width: expression(alert(1))\">"));
    }

    #[test]
    fn test_benign_markup() {
        assert!(!detect_xss("hello world"));
        assert!(!detect_xss("<p>Normal paragraph</p>"));
        assert!(!detect_xss("<a href=\"/home\">home</a>"));
        assert!(!detect_xss("a < b and c > d"));
        assert!(!detect_xss("only one online user"));
    }
}
