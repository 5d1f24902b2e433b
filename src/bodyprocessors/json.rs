//! JSON bodies, flattened into `ARGS_POST`.
//!
//! Object members become `json.<path>` arguments joined with dots; array
//! elements use their index as the path segment.

use crate::variables::{ArgumentSource, CollectionStore};
use serde_json::Value;

/// Deepest nesting accepted before the body is rejected.
const MAX_DEPTH: usize = 256;

pub(super) fn process(body: &[u8], store: &mut CollectionStore) -> Result<(), String> {
    let value: Value = serde_json::from_slice(body).map_err(|e| format!("json: {}", e))?;
    let mut args = Vec::new();
    flatten("json", &value, 0, &mut args)?;
    for (key, value) in args {
        store.add_argument(ArgumentSource::Post, &key, &value);
    }
    Ok(())
}

fn flatten(prefix: &str, value: &Value, depth: usize, out: &mut Vec<(String, String)>) -> Result<(), String> {
    if depth > MAX_DEPTH {
        return Err(format!("json: nesting deeper than {}", MAX_DEPTH));
    }
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&format!("{}.{}", prefix, k), v, depth + 1, out)?;
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&format!("{}.{}", prefix, i), v, depth + 1, out)?;
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Null => out.push((prefix.to_string(), String::new())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableName;

    #[test]
    fn test_flatten_nested() {
        let mut store = CollectionStore::new();
        process(
            br#"{"user":{"name":"admin","roles":["a","b"]},"active":true,"n":3,"x":null}"#,
            &mut store,
        )
        .unwrap();
        assert_eq!(store.first(VariableName::ArgsPost, Some("json.user.name")), Some("admin"));
        assert_eq!(store.first(VariableName::ArgsPost, Some("json.user.roles.1")), Some("b"));
        assert_eq!(store.first(VariableName::Args, Some("json.active")), Some("true"));
        assert_eq!(store.first(VariableName::Args, Some("json.n")), Some("3"));
        assert_eq!(store.first(VariableName::Args, Some("json.x")), Some(""));
    }

    #[test]
    fn test_invalid_json() {
        let mut store = CollectionStore::new();
        let err = process(b"{\"a\":", &mut store).unwrap_err();
        assert!(err.starts_with("json:"));
    }

    #[test]
    fn test_depth_limit() {
        let body = format!("{}1{}", "[".repeat(MAX_DEPTH + 2), "]".repeat(MAX_DEPTH + 2));
        let mut store = CollectionStore::new();
        // serde_json stops at 128 levels on its own; either way it fails.
        assert!(process(body.as_bytes(), &mut store).is_err());
        assert!(store.collection(VariableName::ArgsPost).is_none());
    }
}
