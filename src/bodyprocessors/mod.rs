//! Request body processors.
//!
//! During phase 2 the buffered request body is handed to the processor
//! matching its `Content-Type` (or the one forced with
//! `ctl:requestBodyProcessor`). Processors populate `ARGS_POST`, the
//! `FILES*` collections and `XML`; a malformed body is not an error for the
//! transaction but sets `REQBODY_ERROR` for rules to act on.

mod json;
mod multipart;
mod xml;

use crate::variables::request::{parse_arguments, parse_content_type};
use crate::variables::{ArgumentSource, CollectionStore};

/// Available processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyProcessorKind {
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// `multipart/form-data`
    Multipart,
    /// `application/json`
    Json,
    /// `text/xml`, `application/xml`
    Xml,
}

impl BodyProcessorKind {
    /// Parse `URLENCODED`, `MULTIPART`, `JSON` or `XML`, ignoring case.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "URLENCODED" => Some(Self::UrlEncoded),
            "MULTIPART" => Some(Self::Multipart),
            "JSON" => Some(Self::Json),
            "XML" => Some(Self::Xml),
            _ => None,
        }
    }

    /// Name stored in `REQBODY_PROCESSOR`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UrlEncoded => "URLENCODED",
            Self::Multipart => "MULTIPART",
            Self::Json => "JSON",
            Self::Xml => "XML",
        }
    }

    /// Processor for a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = parse_content_type(content_type)?;
        match (mime.type_(), mime.subtype(), mime.suffix()) {
            (mime::APPLICATION, mime::WWW_FORM_URLENCODED, None) => Some(Self::UrlEncoded),
            (mime::MULTIPART, mime::FORM_DATA, None) => Some(Self::Multipart),
            (mime::APPLICATION, mime::JSON, None) => Some(Self::Json),
            (mime::TEXT | mime::APPLICATION, mime::XML, None) => Some(Self::Xml),
            (_, _, Some(mime::JSON)) => Some(Self::Json),
            (_, _, Some(mime::XML)) => Some(Self::Xml),
            _ => None,
        }
    }
}

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name.
    pub field: String,
    /// Client-supplied file name.
    pub filename: String,
    /// Part `Content-Type`, empty when absent.
    pub content_type: String,
    /// Content size in bytes.
    pub size: usize,
}

/// What a processor produced besides the collections it filled.
#[derive(Debug, Clone, Default)]
pub struct ProcessedBody {
    /// Uploaded files.
    pub files: Vec<UploadedFile>,
    /// Form fields re-encoded without file contents (audit part I).
    pub no_files_body: Option<String>,
    /// Parse failure, reported through `REQBODY_ERROR_MSG`.
    pub error: Option<String>,
}

/// Run a processor over a request body.
pub fn process(
    kind: BodyProcessorKind,
    body: &[u8],
    content_type: &str,
    store: &mut CollectionStore,
    separator: char,
) -> ProcessedBody {
    match kind {
        BodyProcessorKind::UrlEncoded => {
            let text = String::from_utf8_lossy(body);
            parse_arguments(store, &text, separator, ArgumentSource::Post);
            ProcessedBody::default()
        }
        BodyProcessorKind::Multipart => multipart::process(body, content_type, store),
        BodyProcessorKind::Json => ProcessedBody {
            error: json::process(body, store).err(),
            ..ProcessedBody::default()
        },
        BodyProcessorKind::Xml => ProcessedBody {
            error: xml::process(body, store).err(),
            ..ProcessedBody::default()
        },
    }
}
