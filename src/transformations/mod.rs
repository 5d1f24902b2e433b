//! Transformation functions.
//!
//! Every transformation is a plain `fn(&[u8]) -> Cow<[u8]>` registered by
//! lower-case name in [`TRANSFORMATIONS`]. Values are raw bytes from here
//! until an operator needs text. A transformation that cannot decode its
//! input returns it unchanged.

mod decode;
mod encode;
mod normalize;
mod pipeline;

pub use decode::*;
pub use encode::*;
pub use normalize::*;
pub use pipeline::TransformationPipeline;

use crate::error::{Error, Result};
use std::borrow::Cow;

/// Signature shared by every transformation.
pub type TransformFn = for<'a> fn(&'a [u8]) -> Cow<'a, [u8]>;

/// A named entry of the transformation table.
#[derive(Clone, Copy)]
pub struct Transformation {
    /// Name as written after `t:`.
    pub name: &'static str,
    /// The function itself.
    pub func: TransformFn,
}

impl Transformation {
    /// Apply the transformation.
    pub fn apply<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        (self.func)(input)
    }
}

impl std::fmt::Debug for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Transformation table keyed by lower-case name.
pub static TRANSFORMATIONS: phf::Map<&'static str, Transformation> = phf::phf_map! {
    "base64decode" => Transformation { name: "base64Decode", func: base64_decode },
    "base64decodeext" => Transformation { name: "base64DecodeExt", func: base64_decode_ext },
    "base64encode" => Transformation { name: "base64Encode", func: base64_encode },
    "cmdline" => Transformation { name: "cmdLine", func: cmd_line },
    "compresswhitespace" => Transformation { name: "compressWhitespace", func: compress_whitespace },
    "cssdecode" => Transformation { name: "cssDecode", func: css_decode },
    "escapeseqdecode" => Transformation { name: "escapeSeqDecode", func: escape_seq_decode },
    "hexdecode" => Transformation { name: "hexDecode", func: hex_decode },
    "hexencode" => Transformation { name: "hexEncode", func: hex_encode },
    "htmlentitydecode" => Transformation { name: "htmlEntityDecode", func: html_entity_decode },
    "jsdecode" => Transformation { name: "jsDecode", func: js_decode },
    "length" => Transformation { name: "length", func: length },
    "lowercase" => Transformation { name: "lowercase", func: lowercase },
    "md5" => Transformation { name: "md5", func: md5 },
    "normalisepath" => Transformation { name: "normalizePath", func: normalize_path },
    "normalisepathwin" => Transformation { name: "normalizePathWin", func: normalize_path_win },
    "normalizepath" => Transformation { name: "normalizePath", func: normalize_path },
    "normalizepathwin" => Transformation { name: "normalizePathWin", func: normalize_path_win },
    "removecomments" => Transformation { name: "removeComments", func: remove_comments },
    "removecommentschar" => Transformation { name: "removeCommentsChar", func: remove_comments_char },
    "removenulls" => Transformation { name: "removeNulls", func: remove_nulls },
    "removewhitespace" => Transformation { name: "removeWhitespace", func: remove_whitespace },
    "replacecomments" => Transformation { name: "replaceComments", func: replace_comments },
    "replacenulls" => Transformation { name: "replaceNulls", func: replace_nulls },
    "sha1" => Transformation { name: "sha1", func: sha1 },
    "sqlhexdecode" => Transformation { name: "sqlHexDecode", func: sql_hex_decode },
    "trim" => Transformation { name: "trim", func: trim },
    "trimleft" => Transformation { name: "trimLeft", func: trim_left },
    "trimright" => Transformation { name: "trimRight", func: trim_right },
    "uppercase" => Transformation { name: "uppercase", func: uppercase },
    "urldecode" => Transformation { name: "urlDecode", func: url_decode },
    "urldecodeuni" => Transformation { name: "urlDecodeUni", func: url_decode_uni },
    "urlencode" => Transformation { name: "urlEncode", func: url_encode },
    "utf8tounicode" => Transformation { name: "utf8toUnicode", func: utf8_to_unicode },
};

/// Look up a transformation by name (case-insensitive).
///
/// `none` is not in the table; pipelines handle it by truncation.
pub fn lookup(name: &str) -> Result<Transformation> {
    TRANSFORMATIONS
        .get(name.to_ascii_lowercase().as_str())
        .copied()
        .ok_or_else(|| Error::UnknownTransformation {
            name: name.to_string(),
        })
}

/// Decimal byte length.
pub fn length(input: &[u8]) -> Cow<'_, [u8]> {
    Cow::Owned(input.len().to_string().into_bytes())
}

/// ASCII whitespace as C `isspace` sees it, plus NBSP (0xA0).
pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r' | 0xa0)
}
