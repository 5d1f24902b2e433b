//! Decoding transformations.

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode;
use std::borrow::Cow;

/// Base64 engine that accepts input with or without padding.
static LENIENT_BASE64: Lazy<GeneralPurpose> = Lazy::new(|| {
    GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new()
            .with_decode_padding_mode(DecodePaddingMode::Indifferent)
            .with_decode_allow_trailing_bits(true),
    )
});

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn hex_pair(bytes: &[u8], at: usize) -> Option<u8> {
    let hi = hex_val(*bytes.get(at)?)?;
    let lo = hex_val(*bytes.get(at + 1)?)?;
    Some((hi << 4) | lo)
}

fn hex_quad(bytes: &[u8], at: usize) -> Option<u32> {
    let hi = hex_pair(bytes, at)? as u32;
    let lo = hex_pair(bytes, at + 2)? as u32;
    Some((hi << 8) | lo)
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Fold full-width ASCII (U+FF01..U+FF5E) onto ASCII.
fn fold_full_width(code: u32) -> u32 {
    if (0xFF01..=0xFF5E).contains(&code) {
        code - 0xFEE0
    } else {
        code
    }
}

/// Decode `%XX` sequences and `+`. Malformed escapes are kept verbatim.
pub fn url_decode(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.iter().any(|&b| b == b'%' || b == b'+') {
        return Cow::Borrowed(input);
    }
    let spaced: Vec<u8> = input
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    Cow::Owned(percent_decode(&spaced).collect())
}

/// [`url_decode`] for text that is stored as text, such as query
/// arguments. Invalid UTF-8 in the result is replaced.
pub fn url_decode_str(input: &str) -> Cow<'_, str> {
    match url_decode(input.as_bytes()) {
        Cow::Borrowed(_) => Cow::Borrowed(input),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// `urlDecode` plus `%uXXXX`, folding full-width ASCII to its ASCII
/// counterpart.
pub fn url_decode_uni(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.iter().any(|&b| b == b'%' || b == b'+') {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len());
    let mut plain = 0;
    let mut i = 0;
    while i < input.len() {
        let decoded = match input[i..] {
            [b'%', b'u' | b'U', ..] => hex_quad(input, i + 2)
                .and_then(|code| char::from_u32(fold_full_width(code))),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.extend_from_slice(&url_decode(&input[plain..i]));
                push_char(&mut out, c);
                i += 6;
                plain = i;
            }
            None => i += 1,
        }
    }
    out.extend_from_slice(&url_decode(&input[plain..]));
    Cow::Owned(out)
}

/// Base64 decode, ignoring whitespace and line breaks. Invalid input is
/// returned unchanged.
pub fn base64_decode(input: &[u8]) -> Cow<'_, [u8]> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    match LENIENT_BASE64.decode(&compact) {
        Ok(bytes) => Cow::Owned(bytes),
        Err(_) => Cow::Borrowed(input),
    }
}

/// Forgiving base64 decode: accepts the URL-safe alphabet and skips any
/// byte outside the alphabet.
pub fn base64_decode_ext(input: &[u8]) -> Cow<'_, [u8]> {
    let mut compact: Vec<u8> = input
        .iter()
        .filter_map(|&b| match b {
            b'-' => Some(b'+'),
            b'_' => Some(b'/'),
            b if b.is_ascii_alphanumeric() || b == b'+' || b == b'/' => Some(b),
            _ => None,
        })
        .collect();
    // A single dangling sextet cannot encode a byte.
    if compact.len() % 4 == 1 {
        compact.pop();
    }
    match LENIENT_BASE64.decode(&compact) {
        Ok(bytes) => Cow::Owned(bytes),
        Err(_) => Cow::Borrowed(input),
    }
}

/// Decode pairs of hex digits. Odd-length or non-hex input is returned
/// unchanged.
pub fn hex_decode(input: &[u8]) -> Cow<'_, [u8]> {
    if input.len() % 2 != 0 {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len() / 2);
    for i in (0..input.len()).step_by(2) {
        match hex_pair(input, i) {
            Some(b) => out.push(b),
            None => return Cow::Borrowed(input),
        }
    }
    Cow::Owned(out)
}

/// Decode `0xHEX` literals as used in SQL.
pub fn sql_hex_decode(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.windows(2).any(|w| w[0] == b'0' && (w[1] == b'x' || w[1] == b'X')) {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'0' && matches!(input.get(i + 1), Some(b'x' | b'X')) && hex_pair(input, i + 2).is_some() {
            i += 2;
            while let Some(b) = hex_pair(input, i) {
                out.push(b);
                i += 2;
            }
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    Cow::Owned(out)
}

/// Decode one entity body (the part after `&`) into `out`, returning how
/// many input bytes were used.
fn decode_entity(b: &[u8], out: &mut Vec<u8>) -> Option<usize> {
    if b.first() == Some(&b'#') {
        let (radix, start) = if matches!(b.get(1), Some(b'x' | b'X')) {
            (16, 2)
        } else {
            (10, 1)
        };
        let digits = b[start.min(b.len())..]
            .iter()
            .take_while(|c| {
                if radix == 16 {
                    c.is_ascii_hexdigit()
                } else {
                    c.is_ascii_digit()
                }
            })
            .count();
        if digits == 0 {
            return None;
        }
        let text = std::str::from_utf8(&b[start..start + digits]).ok()?;
        let code = u32::from_str_radix(text, radix).ok()?;
        // Code points below 256 decode to the single byte.
        match u8::try_from(code) {
            Ok(byte) => out.push(byte),
            Err(_) => push_char(out, char::from_u32(code)?),
        }
        let mut used = start + digits;
        if b.get(used) == Some(&b';') {
            used += 1;
        }
        return Some(used);
    }

    let name_len = b.iter().take_while(|c| c.is_ascii_alphabetic()).count();
    let byte = match b[..name_len].to_ascii_lowercase().as_slice() {
        b"quot" => b'"',
        b"amp" => b'&',
        b"lt" => b'<',
        b"gt" => b'>',
        b"nbsp" => 0xa0,
        _ => return None,
    };
    out.push(byte);
    let mut used = name_len;
    if b.get(used) == Some(&b';') {
        used += 1;
    }
    Some(used)
}

/// Decode numeric (`&#65;`, `&#x41;`) and the named entities `quot`, `amp`,
/// `lt`, `gt` and `nbsp`. The trailing `;` is optional.
pub fn html_entity_decode(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&b'&') {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'&' {
            out.push(input[i]);
            i += 1;
            continue;
        }
        match decode_entity(&input[i + 1..], &mut out) {
            Some(used) => i += 1 + used,
            None => {
                out.push(b'&');
                i += 1;
            }
        }
    }
    Cow::Owned(out)
}

/// Decode JavaScript escapes (`\xHH`, `\uHHHH`, octal and single-character
/// escapes). An unknown escape drops the backslash.
pub fn js_decode(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&b'\\') {
        return Cow::Borrowed(input);
    }
    let bytes = input;
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes[i + 1] {
            b'u' | b'U' => match hex_quad(bytes, i + 2) {
                Some(code) => {
                    push_char(&mut out, char::from_u32(fold_full_width(code)).unwrap_or('\u{fffd}'));
                    i += 6;
                }
                None => {
                    out.push(b'u');
                    i += 2;
                }
            },
            b'x' | b'X' => match hex_pair(bytes, i + 2) {
                Some(b) => {
                    out.push(b);
                    i += 4;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            },
            b'0'..=b'7' => {
                let (value, used) = octal(bytes, i + 1);
                out.push(value);
                i += 1 + used;
            }
            other => {
                out.push(simple_escape(other).unwrap_or(other));
                i += 2;
            }
        }
    }
    Cow::Owned(out)
}

fn simple_escape(b: u8) -> Option<u8> {
    Some(match b {
        b'a' => 0x07,
        b'b' => 0x08,
        b'f' => 0x0c,
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'v' => 0x0b,
        b'\\' | b'?' | b'\'' | b'"' => b,
        _ => return None,
    })
}

/// Up to three octal digits starting at `at`; returns the byte and the
/// number of digits consumed.
fn octal(bytes: &[u8], at: usize) -> (u8, usize) {
    let mut value: u32 = 0;
    let mut used = 0;
    while used < 3 {
        match bytes.get(at + used) {
            Some(d @ b'0'..=b'7') => {
                value = value * 8 + u32::from(d - b'0');
                used += 1;
            }
            _ => break,
        }
    }
    ((value & 0xff) as u8, used)
}

/// Decode ANSI C escape sequences. Unknown escapes are kept verbatim.
pub fn escape_seq_decode(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&b'\\') {
        return Cow::Borrowed(input);
    }
    let bytes = input;
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        if let Some(b) = simple_escape(next) {
            out.push(b);
            i += 2;
        } else if next == b'x' || next == b'X' {
            match hex_pair(bytes, i + 2) {
                Some(b) => {
                    out.push(b);
                    i += 4;
                }
                None => {
                    out.extend_from_slice(&bytes[i..i + 2]);
                    i += 2;
                }
            }
        } else if (b'0'..=b'7').contains(&next) {
            let (value, used) = octal(bytes, i + 1);
            out.push(value);
            i += 1 + used;
        } else {
            out.extend_from_slice(&bytes[i..i + 2]);
            i += 2;
        }
    }
    Cow::Owned(out)
}

/// Decode CSS escapes: a backslash followed by 1-6 hex digits (one trailing
/// whitespace byte is consumed), or by any other byte which is then taken
/// literally. Escaped newlines are removed.
pub fn css_decode(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&b'\\') {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'\\' {
            out.push(input[i]);
            i += 1;
            continue;
        }
        i += 1;
        let digits = input[i..]
            .iter()
            .take(6)
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        if digits == 0 {
            match input.get(i) {
                Some(b'\n') | None => {}
                Some(&other) => out.push(other),
            }
            i += 1;
            continue;
        }

        let code = input[i..i + digits]
            .iter()
            .fold(0u32, |acc, &d| (acc << 4) | u32::from(hex_val(d).unwrap_or(0)));
        i += digits;
        let code = if digits >= 4 { fold_full_width(code) } else { code };
        match u8::try_from(code) {
            Ok(byte) => out.push(byte),
            // Out-of-range code points keep their low byte.
            Err(_) => match char::from_u32(code) {
                Some(c) => push_char(&mut out, c),
                None => out.push(code as u8),
            },
        }

        if matches!(input.get(i), Some(b' ' | b'\t' | b'\n' | b'\r' | 0x0c)) {
            i += 1;
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_decode() {
        assert_eq!(&*url_decode(b"hello%20world+again"), b"hello world again");
        assert_eq!(&*url_decode(b"test%2Fpath"), b"test/path");
        assert_eq!(&*url_decode(b"bad%zzescape%4"), b"bad%zzescape%4");
        assert_eq!(&*url_decode(b"%FF%00"), b"\xff\x00");
        assert!(matches!(url_decode(b"plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_url_decode_str_replaces_invalid_utf8() {
        assert_eq!(url_decode_str("a%3Cb"), "a<b");
        assert_eq!(url_decode_str("%FF"), "\u{fffd}");
        assert!(matches!(url_decode_str("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_url_decode_uni() {
        assert_eq!(&*url_decode_uni(b"%u003cscript%u003E"), b"<script>");
        // Full-width 's' (U+FF53) folds to 's'.
        assert_eq!(&*url_decode_uni(b"%uff53elect"), b"select");
        assert_eq!(&*url_decode_uni(b"%u00e9+%41"), "é A".as_bytes());
        assert_eq!(&*url_decode_uni(b"%uZZZZ"), b"%uZZZZ");
    }

    #[test]
    fn test_base64_decode_tolerates_whitespace() {
        assert_eq!(&*base64_decode(b"aGVsbG8="), b"hello");
        assert_eq!(&*base64_decode(b"aGVs\r\nbG8"), b"hello");
        assert_eq!(&*base64_decode(b"not base64!"), b"not base64!");
        assert_eq!(&*base64_decode(b"/w=="), b"\xff");
        assert_eq!(&*base64_decode_ext(b"aGVs.bG8"), b"hello");
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(&*hex_decode(b"414243"), b"ABC");
        assert_eq!(&*hex_decode(b"41424"), b"41424");
        assert_eq!(&*hex_decode(b"ff00"), b"\xff\x00");
        assert_eq!(&*sql_hex_decode(b"select 0x414243"), b"select ABC");
    }

    #[test]
    fn test_html_entity_decode() {
        assert_eq!(&*html_entity_decode(b"&lt;script&gt;"), b"<script>");
        assert_eq!(&*html_entity_decode(b"&#60;&#x3c;&#X3C"), b"<<<");
        assert_eq!(&*html_entity_decode(b"a&nbsp;b"), b"a\xa0b");
        assert_eq!(&*html_entity_decode(b"&QUOT;&amp"), b"\"&");
        assert_eq!(&*html_entity_decode(b"&#8364;"), "€".as_bytes());
        // Entities outside the supported set are left alone.
        assert_eq!(&*html_entity_decode(b"&copy; & &#;"), b"&copy; & &#;");
    }

    #[test]
    fn test_js_decode() {
        assert_eq!(&*js_decode(br"\x3cscript\x3e"), b"<script>");
        assert_eq!(&*js_decode(br"\u003c\uff41"), b"<a");
        assert_eq!(&*js_decode(br"\101\z"), b"Az");
        assert_eq!(&*js_decode(br"\xff"), b"\xff");
    }

    #[test]
    fn test_escape_seq_decode() {
        assert_eq!(&*escape_seq_decode(br"a\tb\n"), b"a\tb\n");
        assert_eq!(&*escape_seq_decode(br"\x41\102\?"), b"AB?");
        assert_eq!(&*escape_seq_decode(br"\q\x"), br"\q\x");
    }

    #[test]
    fn test_css_decode() {
        assert_eq!(&*css_decode(br"\3c script"), b"<script");
        assert_eq!(&*css_decode(br"\000041"), b"A");
        assert_eq!(&*css_decode(br"\ff41"), b"a");
        assert_eq!(&*css_decode(br"ja\vascript"), b"javascript");
        assert_eq!(&*css_decode(b"a\\\nb"), b"ab");
    }
}
