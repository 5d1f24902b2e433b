//! SQL injection detection by token fingerprint.
//!
//! Token classes: `s` string, `1` number, `n` bareword, `k` keyword,
//! `U` UNION, `f` function call, `v` variable, `o` operator, `&` logic,
//! `c` comment, and the punctuation `( ) ; ,` as themselves.
//!
//! Input is fingerprinted three times: as-is, and as if it continued a
//! single- or double-quoted SQL string.

use phf::phf_set;

const MAX_TOKENS: usize = 8;
const FINGERPRINT_LEN: usize = 5;

static KEYWORDS: phf::Set<&'static str> = phf_set! {
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER",
    "CREATE", "FROM", "WHERE", "INTO", "VALUES", "TABLE", "DATABASE",
    "EXEC", "EXECUTE", "HAVING", "GROUP", "ORDER", "BY", "LIMIT", "OFFSET",
    "JOIN", "WAITFOR", "DELAY", "DECLARE", "SHUTDOWN", "INFORMATION_SCHEMA",
    "CASE", "WHEN", "THEN", "ELSE", "END", "ALL", "DISTINCT", "PROCEDURE",
    "OUTFILE", "DUMPFILE", "GRANT", "REVOKE",
};

static FUNCTIONS: phf::Set<&'static str> = phf_set! {
    "SLEEP", "PG_SLEEP", "BENCHMARK", "CONCAT", "CONCAT_WS", "CHAR", "CHR",
    "ASCII", "SUBSTRING", "SUBSTR", "MID", "VERSION", "USER", "DATABASE",
    "LOAD_FILE", "EXTRACTVALUE", "UPDATEXML", "MD5", "SHA1", "HEX", "UNHEX",
    "CAST", "CONVERT", "COUNT", "IF", "IFNULL", "COALESCE", "GROUP_CONCAT",
    "LENGTH", "ORD", "XP_CMDSHELL",
};

/// Fingerprint prefixes that read as an injected condition or statement.
const ATTACK_PREFIXES: &[&str] = &[
    "s&s", "s&1", "s&f", "s&(", "s&v", "s&no", "so1", "sos", "s;k", "s;f",
    "1&1", "1&s", "1&f", "1&(", "1&v", "1;k", "1;f", ")&1", ")&s",
];

/// Fingerprints that are attacks only as the whole input.
const ATTACK_EXACT: &[&str] = &["sc", "1c", "s;c", "1;c", "s)c", "1)c"];

/// Fingerprint fragments that are attacks anywhere.
const ATTACK_FRAGMENTS: &[&str] = &["Uk", "U(k", ";k", "&f(", "of(", "kf(", ";f("];

fn scan_string(input: &[u8], mut i: usize, quote: u8) -> usize {
    while i < input.len() {
        match input[i] {
            b'\\' => i += 2,
            b if b == quote => {
                if input.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    input.len()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.') || b >= 0x80
}

fn is_operator_byte(b: u8) -> bool {
    matches!(
        b,
        b'=' | b'<' | b'>' | b'!' | b'+' | b'-' | b'*' | b'/' | b'%' | b'^' | b'|' | b'&' | b'~' | b':'
    )
}

fn classify_word(word: &str, next: Option<u8>) -> char {
    let upper = word.to_ascii_uppercase();
    match upper.as_str() {
        "UNION" => 'U',
        "AND" | "OR" | "XOR" | "NOT" => '&',
        "LIKE" | "RLIKE" | "REGEXP" | "IS" | "IN" | "DIV" | "MOD" | "BETWEEN" | "SOUNDS" => 'o',
        "NULL" | "TRUE" | "FALSE" => '1',
        w if KEYWORDS.contains(w) => 'k',
        w if FUNCTIONS.contains(w) && next == Some(b'(') => 'f',
        _ => 'n',
    }
}

fn tokenize(input: &[u8], quote: Option<u8>) -> String {
    let mut fp = String::new();
    let mut i = 0;

    if let Some(q) = quote {
        i = scan_string(input, 0, q);
        fp.push('s');
    }

    while i < input.len() && fp.len() < MAX_TOKENS {
        let c = input[i];
        let next = input.get(i + 1).copied();
        match c {
            b'\'' | b'"' => {
                i = scan_string(input, i + 1, c);
                fp.push('s');
            }
            b'#' => {
                fp.push('c');
                break;
            }
            b'-' if next == Some(b'-') => {
                fp.push('c');
                i = input[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(input.len(), |p| i + p + 1);
            }
            b'/' if next == Some(b'*') => {
                fp.push('c');
                i = input[i + 2..]
                    .windows(2)
                    .position(|w| w == b"*/")
                    .map_or(input.len(), |p| i + 2 + p + 2);
            }
            b'0'..=b'9' => {
                fp.push('1');
                while i < input.len() && (input[i].is_ascii_alphanumeric() || input[i] == b'.') {
                    i += 1;
                }
            }
            b'@' => {
                fp.push('v');
                i += 1;
                while i < input.len() && (input[i] == b'@' || is_word_byte(input[i])) {
                    i += 1;
                }
            }
            b'(' | b')' | b';' | b',' => {
                fp.push(c as char);
                i += 1;
            }
            b'&' if next == Some(b'&') => {
                fp.push('&');
                i += 2;
            }
            b'|' if next == Some(b'|') => {
                fp.push('&');
                i += 2;
            }
            b if is_operator_byte(b) => {
                fp.push('o');
                while i < input.len() && is_operator_byte(input[i]) {
                    i += 1;
                }
            }
            b if is_word_byte(b) || b == b'`' => {
                let start = i;
                while i < input.len() && (is_word_byte(input[i]) || input[i] == b'`') {
                    i += 1;
                }
                let word = String::from_utf8_lossy(&input[start..i]);
                let word = word.trim_matches('`');
                let after = input[i..].iter().copied().find(|b| !b.is_ascii_whitespace());
                fp.push(classify_word(word, after));
            }
            _ => i += 1,
        }
    }
    fp
}

fn is_attack(fp: &str) -> bool {
    if ATTACK_EXACT.contains(&fp) {
        return true;
    }
    if ATTACK_PREFIXES.iter().any(|p| fp.starts_with(p)) {
        return true;
    }
    if ATTACK_FRAGMENTS.iter().any(|f| fp.contains(f)) {
        return true;
    }
    fp.starts_with('k') && fp.matches('k').count() >= 2
}

/// Fingerprint of `input` read without a quote context.
pub fn fingerprint(input: &str) -> String {
    let mut fp = tokenize(input.as_bytes(), None);
    fp.truncate(FINGERPRINT_LEN);
    fp
}

/// Detect SQL injection; returns the fingerprint that matched.
pub fn detect_sqli(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    [None, Some(b'\''), Some(b'"')].into_iter().find_map(|quote| {
        let fp = tokenize(bytes, quote);
        is_attack(&fp).then(|| {
            let mut fp = fp;
            fp.truncate(FINGERPRINT_LEN);
            fp
        })
    })
}
