//! Encoding and hashing transformations.

use base64::Engine;
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use std::borrow::Cow;

/// Standard base64 with padding.
pub fn base64_encode(input: &[u8]) -> Cow<'_, [u8]> {
    Cow::Owned(base64::engine::general_purpose::STANDARD.encode(input).into_bytes())
}

/// Lower-case hex of the value's bytes.
pub fn hex_encode(input: &[u8]) -> Cow<'_, [u8]> {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = Vec::with_capacity(input.len() * 2);
    for &b in input {
        out.push(DIGITS[usize::from(b >> 4)]);
        out.push(DIGITS[usize::from(b & 0x0f)]);
    }
    Cow::Owned(out)
}

/// Percent-encode everything but ASCII alphanumerics.
pub fn url_encode(input: &[u8]) -> Cow<'_, [u8]> {
    match Cow::from(percent_encode(input, NON_ALPHANUMERIC)) {
        Cow::Borrowed(_) => Cow::Borrowed(input),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

/// Raw 16-byte MD5 digest.
pub fn md5(input: &[u8]) -> Cow<'_, [u8]> {
    use ::md5::{Digest, Md5};
    Cow::Owned(Md5::digest(input).to_vec())
}

/// Raw 20-byte SHA-1 digest.
pub fn sha1(input: &[u8]) -> Cow<'_, [u8]> {
    use ::sha1::{Digest, Sha1};
    Cow::Owned(Sha1::digest(input).to_vec())
}

/// Re-encode code points above U+007F as `%uXXXX`. Bytes that are not
/// part of a valid UTF-8 sequence pass through.
pub fn utf8_to_unicode(input: &[u8]) -> Cow<'_, [u8]> {
    if input.is_ascii() {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len() * 2);
    let mut rest = input;
    while !rest.is_empty() {
        let (valid, bad) = match std::str::from_utf8(rest) {
            Ok(s) => (s, 0),
            Err(e) => {
                let (head, _) = rest.split_at(e.valid_up_to());
                let head = std::str::from_utf8(head).unwrap_or_default();
                (head, e.error_len().unwrap_or(rest.len() - e.valid_up_to()))
            }
        };
        for c in valid.chars() {
            if c.is_ascii() {
                out.push(c as u8);
            } else {
                out.extend_from_slice(format!("%u{:04x}", c as u32).as_bytes());
            }
        }
        let consumed = valid.len();
        out.extend_from_slice(&rest[consumed..consumed + bad]);
        rest = &rest[consumed + bad..];
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode() {
        assert_eq!(&*base64_encode(b"hello"), b"aGVsbG8=");
        assert_eq!(&*base64_encode(b"\xff"), b"/w==");
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(&*hex_encode(b"AB"), b"4142");
        assert_eq!(&*hex_encode("é".as_bytes()), b"c3a9");
        assert_eq!(&*hex_encode(b"\x00\xff"), b"00ff");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(&*url_encode(b"a b+c"), b"a%20b%2Bc");
        assert_eq!(&*url_encode(b"\xff"), b"%FF");
        assert!(matches!(url_encode(b"abc123"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_digests_are_raw() {
        let d = md5(b"hello");
        assert_eq!(d.len(), 16);
        assert_eq!(&*hex_encode(&d), b"5d41402abc4b2a76b9719d911017c592");

        let d = sha1(b"hello");
        assert_eq!(d.len(), 20);
        assert_eq!(&*hex_encode(&d), b"aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn test_utf8_to_unicode() {
        assert_eq!(&*utf8_to_unicode("aé€".as_bytes()), b"a%u00e9%u20ac");
        assert_eq!(&*utf8_to_unicode(b"plain"), b"plain");
        assert_eq!(&*utf8_to_unicode(b"\xffx\xc3\xa9"), b"\xffx%u00e9");
    }
}
