//! Validation operators. Each matches when the value is *invalid*.

use super::traits::{Operator, OperatorContext};
use crate::error::{Error, Result};
use regex::bytes::Regex;

/// Byte range validation (@validateByteRange).
pub struct ValidateByteRangeOperator {
    allowed: [bool; 256],
}

impl ValidateByteRangeOperator {
    /// Parse a list such as `9,10,13,32-126`.
    pub fn new(spec: &str) -> Result<Self> {
        let invalid = |message: String| Error::invalid_directive("@validateByteRange", message);
        let parse_byte = |s: &str| -> Result<u8> {
            s.trim()
                .parse::<u8>()
                .map_err(|_| invalid(format!("'{}' is not a byte value", s.trim())))
        };

        let mut allowed = [false; 256];
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (lo, hi) = match part.split_once('-') {
                Some((lo, hi)) => (parse_byte(lo)?, parse_byte(hi)?),
                None => {
                    let b = parse_byte(part)?;
                    (b, b)
                }
            };
            if lo > hi {
                return Err(invalid(format!("empty range '{}'", part)));
            }
            for b in lo..=hi {
                allowed[b as usize] = true;
            }
        }
        Ok(Self { allowed })
    }
}

impl Operator for ValidateByteRangeOperator {
    fn evaluate(&self, _ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        value.iter().any(|&b| !self.allowed[usize::from(b)])
    }

    fn name(&self) -> &'static str {
        "validateByteRange"
    }
}

/// URL encoding validation (@validateUrlEncoding).
pub struct ValidateUrlEncodingOperator;

/// Whether every `%` is followed by two hex digits.
pub fn is_valid_url_encoding(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1..i + 3) {
                Some([h, l]) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

impl Operator for ValidateUrlEncodingOperator {
    fn evaluate(&self, _ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        !is_valid_url_encoding(value)
    }

    fn name(&self) -> &'static str {
        "validateUrlEncoding"
    }
}

/// UTF-8 validation (@validateUtf8Encoding): overlong forms, surrogates
/// and truncated sequences all match.
pub struct ValidateUtf8EncodingOperator;

impl Operator for ValidateUtf8EncodingOperator {
    fn evaluate(&self, _ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        std::str::from_utf8(value).is_err()
    }

    fn name(&self) -> &'static str {
        "validateUtf8Encoding"
    }
}

/// Credit card detection (@verifyCC): a regex candidate that passes the
/// Luhn check.
pub struct VerifyCcOperator {
    regex: Regex,
}

impl VerifyCcOperator {
    /// Compile the candidate pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| Error::RegexCompile {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self { regex })
    }
}

/// Luhn checksum over the ASCII digits of `s`; needs 13 to 19 digits.
pub fn luhn_valid(s: &[u8]) -> bool {
    let digits: Vec<u32> = s
        .iter()
        .filter(|b| b.is_ascii_digit())
        .map(|&b| u32::from(b - b'0'))
        .collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

impl Operator for VerifyCcOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        for m in self.regex.find_iter(value) {
            if luhn_valid(m.as_bytes()) {
                ctx.capture(0, m.as_bytes());
                return true;
            }
        }
        false
    }

    fn name(&self) -> &'static str {
        "verifyCC"
    }
}
