//! Seeding response variables from host events.

use super::name::VariableName;
use super::request::media_type;
use super::store::CollectionStore;

/// Record one response header and the variables derived from it.
pub fn add_response_header(store: &mut CollectionStore, name: &str, value: &str) {
    store
        .collection_mut(VariableName::ResponseHeaders)
        .add(name, value);
    store
        .collection_mut(VariableName::ResponseHeadersNames)
        .add(name, name);

    if name.eq_ignore_ascii_case("content-type") {
        store.set_value(VariableName::ResponseContentType, value);
    } else if name.eq_ignore_ascii_case("content-length") {
        store.set_value(VariableName::ResponseContentLength, value.trim());
    }
}

/// Record the response status line.
pub fn set_status(store: &mut CollectionStore, status: u16, protocol: &str) {
    store.set_value(VariableName::ResponseStatus, status.to_string());
    store.set_value(VariableName::ResponseProtocol, protocol);
    store.set_value(VariableName::StatusLine, format!("{} {}", protocol, status));
}

/// Whether the response body should be buffered for inspection.
///
/// A response without a Content-Type is inspected only when the MIME list
/// is empty.
pub fn mime_allowed(store: &CollectionStore, mime_types: &[String]) -> bool {
    match store.value(VariableName::ResponseContentType) {
        Some(ct) => {
            let mt = media_type(ct);
            mime_types.iter().any(|m| m.eq_ignore_ascii_case(&mt))
        }
        None => mime_types.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_headers() {
        let mut store = CollectionStore::new();
        add_response_header(&mut store, "Content-Type", "text/html; charset=utf-8");
        add_response_header(&mut store, "Content-Length", "42");
        set_status(&mut store, 404, "HTTP/1.1");

        assert_eq!(store.value(VariableName::ResponseContentLength), Some("42"));
        assert_eq!(store.value(VariableName::ResponseStatus), Some("404"));
        assert_eq!(store.value(VariableName::StatusLine), Some("HTTP/1.1 404"));
        assert!(mime_allowed(&store, &["text/html".to_string()]));
        assert!(!mime_allowed(&store, &["application/json".to_string()]));
    }
}
