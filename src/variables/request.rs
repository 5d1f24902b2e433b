//! Seeding request variables from host events.

use super::name::VariableName;
use super::store::{ArgumentSource, CollectionStore};
use crate::transformations::url_decode_str;
use base64::Engine;
use mime::Mime;

/// Populate the URI-derived variables and `ARGS_GET`.
pub fn populate_uri(
    store: &mut CollectionStore,
    method: &str,
    uri: &str,
    protocol: &str,
    separator: char,
) {
    store.set_value(VariableName::RequestMethod, method);
    store.set_value(VariableName::RequestProtocol, protocol);
    store.set_value(VariableName::RequestUri, uri);
    store.set_value(VariableName::RequestUriRaw, uri);
    store.set_value(
        VariableName::RequestLine,
        format!("{} {} {}", method, uri, protocol),
    );

    let (path, query) = split_uri(uri);
    let filename = url_decode_str(path).into_owned();
    let basename = filename
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    store.set_value(VariableName::RequestFilename, filename);
    store.set_value(VariableName::RequestBasename, basename);
    store.set_value(VariableName::QueryString, query);

    parse_arguments(store, query, separator, ArgumentSource::Get);
}

/// Split a request target into path and query, dropping any fragment and
/// the scheme/authority of an absolute-form target.
fn split_uri(uri: &str) -> (&str, &str) {
    let uri = uri.split('#').next().unwrap_or_default();
    let uri = match uri.find("://") {
        Some(scheme_end) if !uri[..scheme_end].contains('/') => {
            let rest = &uri[scheme_end + 3..];
            match rest.find(['/', '?']) {
                Some(i) => &rest[i..],
                None => "/",
            }
        }
        _ => uri,
    };
    match uri.find('?') {
        Some(pos) => (&uri[..pos], &uri[pos + 1..]),
        None => (uri, ""),
    }
}

/// Parse `key=value` pairs separated by `separator` into the argument
/// collections of `source`.
pub fn parse_arguments(
    store: &mut CollectionStore,
    input: &str,
    separator: char,
    source: ArgumentSource,
) {
    for pair in input.split(separator) {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.find('=') {
            Some(pos) => (&pair[..pos], &pair[pos + 1..]),
            None => (pair, ""),
        };
        store.add_argument(source, &url_decode_str(key), &url_decode_str(value));
    }
}

/// Record one request header and the variables derived from it.
pub fn add_request_header(store: &mut CollectionStore, name: &str, value: &str) {
    store
        .collection_mut(VariableName::RequestHeaders)
        .add(name, value);
    store
        .collection_mut(VariableName::RequestHeadersNames)
        .add(name, name);

    match name.to_ascii_lowercase().as_str() {
        "cookie" => parse_cookies(store, value),
        "content-type" => store.set_value(VariableName::RequestContentType, value),
        "content-length" => store.set_value(VariableName::RequestContentLength, value.trim()),
        "host" => store.set_value(VariableName::ServerName, host_without_port(value.trim())),
        "authorization" => parse_authorization(store, value),
        _ => {}
    }
}

fn host_without_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

fn parse_cookies(store: &mut CollectionStore, header: &str) {
    for part in header.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, value) = part.split_once('=').unwrap_or((part, ""));
        let name = name.trim();
        store
            .collection_mut(VariableName::RequestCookies)
            .add(name, value.trim());
        store
            .collection_mut(VariableName::RequestCookiesNames)
            .add(name, name);
    }
}

fn parse_authorization(store: &mut CollectionStore, header: &str) {
    let (scheme, credentials) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    store.set_value(VariableName::AuthType, scheme);
    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(credentials.trim())
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        if let Some(user) = decoded.as_deref().and_then(|d| d.split(':').next()) {
            store.set_value(VariableName::RemoteUser, user);
        }
    }
}

/// Parsed `Content-Type`, or `None` when the header is not a valid media type.
pub fn parse_content_type(content_type: &str) -> Option<Mime> {
    content_type.trim().parse::<Mime>().ok()
}

/// Content type without parameters, lower-cased. Unparseable values are
/// returned lower-cased as they are, so they match no known type.
pub fn media_type(content_type: &str) -> String {
    match parse_content_type(content_type) {
        Some(mime) => mime.essence_str().to_ascii_lowercase(),
        None => content_type.trim().to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::KeySelector;

    #[test]
    fn test_populate_uri() {
        let mut store = CollectionStore::new();
        populate_uri(&mut store, "GET", "/a/b%20c.php?x=1&y=%3Cscript%3E&flag", "HTTP/1.1", '&');

        assert_eq!(store.value(VariableName::RequestFilename), Some("/a/b c.php"));
        assert_eq!(store.value(VariableName::RequestBasename), Some("b c.php"));
        assert_eq!(store.value(VariableName::QueryString), Some("x=1&y=%3Cscript%3E&flag"));
        assert_eq!(
            store.value(VariableName::RequestLine),
            Some("GET /a/b%20c.php?x=1&y=%3Cscript%3E&flag HTTP/1.1")
        );
        assert_eq!(store.first(VariableName::ArgsGet, Some("y")), Some("<script>"));
        assert_eq!(store.first(VariableName::Args, Some("flag")), Some(""));
    }

    #[test]
    fn test_query_plus_and_percent() {
        let mut store = CollectionStore::new();
        populate_uri(&mut store, "GET", "/?q=a+b%2Bc&bad=%zz&hi=%FF", "HTTP/1.1", '&');
        assert_eq!(store.first(VariableName::ArgsGet, Some("q")), Some("a b+c"));
        assert_eq!(store.first(VariableName::ArgsGet, Some("bad")), Some("%zz"));
        assert_eq!(store.first(VariableName::ArgsGet, Some("hi")), Some("\u{fffd}"));
    }

    #[test]
    fn test_absolute_form_target() {
        let mut store = CollectionStore::new();
        populate_uri(&mut store, "GET", "http://example.com/p?q=1", "HTTP/1.1", '&');
        assert_eq!(store.value(VariableName::RequestFilename), Some("/p"));
        assert_eq!(store.first(VariableName::Args, Some("q")), Some("1"));
    }

    #[test]
    fn test_custom_separator() {
        let mut store = CollectionStore::new();
        populate_uri(&mut store, "GET", "/?a=1;b=2", "HTTP/1.1", ';');
        assert_eq!(store.get(VariableName::Args, &KeySelector::None, &[]).len(), 2);
    }

    #[test]
    fn test_headers_and_cookies() {
        let mut store = CollectionStore::new();
        add_request_header(&mut store, "Host", "example.com:8080");
        add_request_header(&mut store, "Cookie", "sid=abc; theme=dark");
        add_request_header(&mut store, "Content-Type", "application/json; charset=utf-8");

        assert_eq!(store.value(VariableName::ServerName), Some("example.com"));
        assert_eq!(store.first(VariableName::RequestHeaders, Some("HOST")), Some("example.com:8080"));
        assert_eq!(store.first(VariableName::RequestCookies, Some("sid")), Some("abc"));
        assert_eq!(store.first(VariableName::RequestCookiesNames, Some("theme")), Some("theme"));
        assert_eq!(media_type(store.value(VariableName::RequestContentType).unwrap()), "application/json");
        assert_eq!(media_type("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(media_type("not a type"), "not a type");
    }

    #[test]
    fn test_basic_auth() {
        let mut store = CollectionStore::new();
        add_request_header(&mut store, "Authorization", "Basic YWxpY2U6c2VjcmV0");
        assert_eq!(store.value(VariableName::AuthType), Some("Basic"));
        assert_eq!(store.value(VariableName::RemoteUser), Some("alice"));
    }
}
