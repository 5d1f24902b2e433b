//! Normalization transformations.

use super::is_space;
use std::borrow::Cow;

/// Keep `out` only if it differs from `input`.
fn changed(input: &[u8], out: Vec<u8>) -> Cow<'_, [u8]> {
    if out == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(out)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// ASCII lower-case.
pub fn lowercase(input: &[u8]) -> Cow<'_, [u8]> {
    if input.iter().any(u8::is_ascii_uppercase) {
        Cow::Owned(input.to_ascii_lowercase())
    } else {
        Cow::Borrowed(input)
    }
}

/// ASCII upper-case.
pub fn uppercase(input: &[u8]) -> Cow<'_, [u8]> {
    if input.iter().any(u8::is_ascii_lowercase) {
        Cow::Owned(input.to_ascii_uppercase())
    } else {
        Cow::Borrowed(input)
    }
}

/// Collapse every run of whitespace (NBSP included) to one space.
pub fn compress_whitespace(input: &[u8]) -> Cow<'_, [u8]> {
    let mut out = Vec::with_capacity(input.len());
    let mut in_run = false;
    for &b in input {
        if is_space(b) {
            if !in_run {
                out.push(b' ');
            }
            in_run = true;
        } else {
            out.push(b);
            in_run = false;
        }
    }
    changed(input, out)
}

/// Drop all whitespace, NBSP included.
pub fn remove_whitespace(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.iter().any(|&b| is_space(b)) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.iter().copied().filter(|&b| !is_space(b)).collect())
}

/// Drop NUL bytes.
pub fn remove_nulls(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&0) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.iter().copied().filter(|&b| b != 0).collect())
}

/// Replace NUL bytes with spaces.
pub fn replace_nulls(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&0) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.iter().map(|&b| if b == 0 { b' ' } else { b }).collect())
}

/// Trim whitespace on both ends.
pub fn trim(input: &[u8]) -> Cow<'_, [u8]> {
    let start = input.iter().position(|&b| !is_space(b)).unwrap_or(input.len());
    let end = input.iter().rposition(|&b| !is_space(b)).map_or(start, |i| i + 1);
    Cow::Borrowed(&input[start..end])
}

/// Trim leading whitespace.
pub fn trim_left(input: &[u8]) -> Cow<'_, [u8]> {
    let start = input.iter().position(|&b| !is_space(b)).unwrap_or(input.len());
    Cow::Borrowed(&input[start..])
}

/// Trim trailing whitespace.
pub fn trim_right(input: &[u8]) -> Cow<'_, [u8]> {
    let end = input.iter().rposition(|&b| !is_space(b)).map_or(0, |i| i + 1);
    Cow::Borrowed(&input[..end])
}

/// Lexical path cleaning: `.` and empty segments vanish, `..` pops a
/// segment (or is kept at the start of a relative path).
fn clean_path(input: &[u8]) -> Vec<u8> {
    let rooted = input.first() == Some(&b'/');
    let mut stack: Vec<&[u8]> = Vec::new();
    for segment in input.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => {
                if stack.last().is_some_and(|s| *s != b"..") {
                    stack.pop();
                } else if !rooted {
                    stack.push(b"..");
                }
            }
            s => stack.push(s),
        }
    }
    let joined = stack.join(&b'/');
    match (rooted, joined.is_empty()) {
        (true, _) => {
            let mut rooted_path = Vec::with_capacity(joined.len() + 1);
            rooted_path.push(b'/');
            rooted_path.extend_from_slice(&joined);
            rooted_path
        }
        (false, true) => b".".to_vec(),
        (false, false) => joined,
    }
}

/// Remove `.`/`..` segments and repeated slashes, keeping a trailing `/`.
pub fn normalize_path(input: &[u8]) -> Cow<'_, [u8]> {
    if input.is_empty() {
        return Cow::Borrowed(input);
    }
    let mut out = clean_path(input);
    if input.last() == Some(&b'/') && out != b"/" {
        out.push(b'/');
    }
    changed(input, out)
}

/// [`normalize_path`] treating `\` as a separator.
pub fn normalize_path_win(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&b'\\') {
        return normalize_path(input);
    }
    let slashed: Vec<u8> = input.iter().map(|&b| if b == b'\\' { b'/' } else { b }).collect();
    Cow::Owned(normalize_path(&slashed).into_owned())
}

/// Remove `/* */` and `<!-- -->` comments; `--` and `#` end the value.
pub fn remove_comments(input: &[u8]) -> Cow<'_, [u8]> {
    let mut out = Vec::with_capacity(input.len());
    let mut in_comment = false;
    let mut i = 0;
    while i < input.len() {
        let rest = &input[i..];
        if in_comment {
            if rest.starts_with(b"*/") {
                in_comment = false;
                i += 2;
            } else if rest.starts_with(b"-->") {
                in_comment = false;
                i += 3;
            } else {
                i += 1;
            }
        } else if rest.starts_with(b"/*") {
            in_comment = true;
            i += 2;
        } else if rest.starts_with(b"<!--") {
            in_comment = true;
            i += 4;
        } else if rest.starts_with(b"--") || rest[0] == b'#' {
            break;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    if out.len() == input.len() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(out)
}

/// Remove the comment markers themselves (`/*`, `*/`, `<!--`, `-->`, `--`, `#`).
pub fn remove_comments_char(input: &[u8]) -> Cow<'_, [u8]> {
    let mut out = input.to_vec();
    for marker in [&b"/*"[..], b"*/", b"<!--", b"-->", b"--", b"#"] {
        while let Some(pos) = find(&out, marker) {
            out.drain(pos..pos + marker.len());
        }
    }
    changed(input, out)
}

/// Replace each `/* */` comment with one space; an unterminated comment
/// runs to the end of the value.
pub fn replace_comments(input: &[u8]) -> Cow<'_, [u8]> {
    if find(input, b"/*").is_none() {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = find(rest, b"/*") {
        out.extend_from_slice(&rest[..start]);
        out.push(b' ');
        match find(&rest[start + 2..], b"*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = b"";
                break;
            }
        }
    }
    out.extend_from_slice(rest);
    Cow::Owned(out)
}

/// Normalize a shell command line: drop `"`, `'`, `\` and `^`; treat `,`
/// and `;` as whitespace and squeeze whitespace runs; drop a space before
/// `/` or `(`; lower-case.
pub fn cmd_line(input: &[u8]) -> Cow<'_, [u8]> {
    let mut out = Vec::with_capacity(input.len());
    let mut last_space = false;
    for &b in input {
        match b {
            b'"' | b'\'' | b'\\' | b'^' => {}
            b if b.is_ascii_whitespace() || b == b',' || b == b';' => {
                if !last_space {
                    out.push(b' ');
                    last_space = true;
                }
            }
            b'/' | b'(' => {
                if last_space {
                    out.pop();
                }
                out.push(b);
                last_space = false;
            }
            b => {
                out.push(b.to_ascii_lowercase());
                last_space = false;
            }
        }
    }
    changed(input, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_ascii_only() {
        assert_eq!(&*lowercase(b"Hello World"), b"hello world");
        assert_eq!(&*lowercase("ÉCOLE".as_bytes()), "École".as_bytes());
        assert!(matches!(lowercase(b"already"), Cow::Borrowed(_)));
        assert_eq!(&*uppercase(b"abc"), b"ABC");
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(&*compress_whitespace(b"hello   world"), b"hello world");
        assert_eq!(&*compress_whitespace(b"a\t\n\xa0b"), b"a b");
        assert_eq!(&*remove_whitespace(b"a b\xa0c\td"), b"abcd");
    }

    #[test]
    fn test_nulls() {
        assert_eq!(&*remove_nulls(b"a\0b"), b"ab");
        assert_eq!(&*replace_nulls(b"a\0b"), b"a b");
    }

    #[test]
    fn test_trim() {
        assert_eq!(&*trim(b"  x  "), b"x");
        assert_eq!(&*trim(b" \xa0 "), b"");
        assert_eq!(&*trim_left(b"  x  "), b"x  ");
        assert_eq!(&*trim_right(b"  x  "), b"  x");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(&*normalize_path(b"/a/b/../c"), b"/a/c");
        assert_eq!(&*normalize_path(b"/a//b/./c/"), b"/a/b/c/");
        assert_eq!(&*normalize_path(b"/../../etc/passwd"), b"/etc/passwd");
        assert_eq!(&*normalize_path(b"a/../../b"), b"../b");
        assert_eq!(&*normalize_path(b"/"), b"/");
        assert_eq!(&*normalize_path(b""), b"");
    }

    #[test]
    fn test_normalize_path_win() {
        assert_eq!(&*normalize_path_win(br"C:\a\..\b\"), b"C:/b/");
        assert_eq!(&*normalize_path_win(br"\x\.\y"), b"/x/y");
    }

    #[test]
    fn test_remove_comments() {
        assert_eq!(&*remove_comments(b"sel/*x*/ect"), b"select");
        assert_eq!(&*remove_comments(b"a<!--b-->c"), b"ac");
        assert_eq!(&*remove_comments(b"1 OR 1=1-- rest"), b"1 OR 1=1");
        assert_eq!(&*remove_comments(b"1 # rest"), b"1 ");
        assert_eq!(&*remove_comments_char(b"/*a*/b--#"), b"ab");
    }

    #[test]
    fn test_replace_comments() {
        assert_eq!(&*replace_comments(b"union/**/select"), b"union select");
        assert_eq!(&*replace_comments(b"a/*b*/c/*unterminated"), b"a c ");
        assert_eq!(&*replace_comments(b"no comments"), b"no comments");
    }

    #[test]
    fn test_cmd_line() {
        assert_eq!(&*cmd_line(b"CMD;/C"), b"cmd/c");
        assert_eq!(&*cmd_line(b"echo^hello"), b"echohello");
        assert_eq!(&*cmd_line(b"c\"a't  ,, /etc/passwd"), b"cat/etc/passwd");
        assert_eq!(&*cmd_line(b"ping  (x)"), b"ping(x)");
    }
}
