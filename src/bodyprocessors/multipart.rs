//! `multipart/form-data` bodies.

use super::{ProcessedBody, UploadedFile};
use crate::variables::request::parse_content_type;
use crate::variables::{ArgumentSource, CollectionStore, VariableName};
use multipart::server::Multipart;
use std::io::Read;

/// Boundary parameter of a multipart content type.
fn boundary(content_type: &str) -> Option<String> {
    let mime = parse_content_type(content_type)?;
    let boundary = mime.get_param("boundary")?;
    (!boundary.as_str().is_empty()).then(|| boundary.as_str().to_string())
}

/// Populate `ARGS_POST` and `FILES*` from a multipart body.
pub(super) fn process(body: &[u8], content_type: &str, store: &mut CollectionStore) -> ProcessedBody {
    let mut out = ProcessedBody::default();
    let Some(boundary) = boundary(content_type) else {
        out.error = Some("multipart: boundary missing".to_string());
        return out;
    };

    let mut multipart = Multipart::with_body(body, boundary.as_str());
    let mut fields: Vec<String> = Vec::new();
    let mut combined = 0usize;

    loop {
        let mut entry = match multipart.read_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                out.error.get_or_insert_with(|| format!("multipart: {}", e));
                break;
            }
        };
        let name = entry.headers.name.to_string();
        let mut content = Vec::new();
        if let Err(e) = entry.data.read_to_end(&mut content) {
            out.error.get_or_insert_with(|| format!("multipart: field {}: {}", name, e));
            break;
        }

        match entry.headers.filename.take() {
            Some(filename) => {
                let size = content.len();
                combined += size;
                store.collection_mut(VariableName::Files).add(&name, filename.as_str());
                store.collection_mut(VariableName::FilesNames).add(&name, name.as_str());
                store
                    .collection_mut(VariableName::FilesSizes)
                    .add(&name, size.to_string());
                out.files.push(UploadedFile {
                    content_type: entry
                        .headers
                        .content_type
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    field: name,
                    filename,
                    size,
                });
            }
            None => {
                let value = String::from_utf8_lossy(&content);
                store.add_argument(ArgumentSource::Post, &name, &value);
                fields.push(format!("{}={}", name, value));
            }
        }
    }

    let closing = format!("--{}--", boundary);
    if !body.windows(closing.len()).any(|w| w == closing.as_bytes()) {
        out.error.get_or_insert_with(|| "multipart: final boundary missing".to_string());
    }
    if !out.files.is_empty() {
        store.set_value(VariableName::FilesCombinedSize, combined.to_string());
    }
    out.no_files_body = Some(fields.join("&"));
    out
}
