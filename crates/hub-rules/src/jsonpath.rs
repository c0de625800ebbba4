//! JSON path lookups into payloads

use std::ops::Range;

use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

/// Marker that starts an inline JSON path
pub const JSON_PATH_MARKER: &str = "$[";

/// Byte range of the first inline JSON path in `text`
///
/// The path starts at `$[` and runs over every directly following bracket
/// group (`$['a']['b']`) and dotted member (`$['a'].b`).
pub fn json_path_span(text: &str) -> Option<Range<usize>> {
    let start = text.find(JSON_PATH_MARKER)?;
    let bytes = text.as_bytes();
    let mut pos = start + 1;

    loop {
        match bytes.get(pos) {
            Some(b'[') => {
                let close = text[pos..].find(']')?;
                pos += close + 1;
            }
            Some(b'.') if matches!(bytes.get(pos + 1), Some(b) if b.is_ascii_alphabetic() || *b == b'_') => {
                pos += 1;
                while matches!(bytes.get(pos), Some(b) if b.is_ascii_alphanumeric() || *b == b'_') {
                    pos += 1;
                }
            }
            _ => break,
        }
    }
    Some(start..pos)
}

/// First node matched by `path` in the JSON document `json`
///
/// Invalid paths and non-JSON documents yield `None`.
pub fn first_match(path: &str, json: &str) -> Option<Value> {
    let document: Value = serde_json::from_str(json).ok()?;
    let path = match JsonPath::parse(path) {
        Ok(path) => path,
        Err(e) => {
            debug!(path, error = %e, "Invalid JSON path");
            return None;
        }
    };
    path.query(&document).first().cloned()
}

/// Path used for `Read('topic')['key']` indexers
///
/// Matches `key` on any child, so both `{"green": ..}` documents and
/// `[{"green": ..}, {"red": ..}]` arrays resolve.
pub fn index_path(key: &str) -> String {
    let escaped = key.replace('\\', "\\\\").replace('\'', "\\'");
    format!("$.*['{}']", escaped)
}

/// Look up `key` below the top level of `json`
///
/// A document that is itself an object holding `key` is checked first.
pub fn index(json: &str, key: &str) -> Option<Value> {
    let document: Value = serde_json::from_str(json).ok()?;
    if let Some(value) = document.as_object().and_then(|map| map.get(key)) {
        return Some(value.clone());
    }
    first_match(&index_path(key), json)
}

/// Text form of a matched node
///
/// Strings are returned raw, objects and arrays pretty-printed.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_path_span() {
        let text = "$['t'] > 55";
        assert_eq!(&text[json_path_span(text).unwrap()], "$['t']");

        let nested = "value: $['a']['b'].c end";
        assert_eq!(&nested[json_path_span(nested).unwrap()], "$['a']['b'].c");

        assert!(json_path_span("no path").is_none());
        assert!(json_path_span("$['open").is_none());
    }

    #[test]
    fn test_first_match() {
        let payload = r#"{"t": 18.7, "name": "boiler"}"#;
        assert_eq!(first_match("$['t']", payload), Some(json!(18.7)));
        assert_eq!(first_match("$['name']", payload), Some(json!("boiler")));
        assert_eq!(first_match("$['missing']", payload), None);
        assert_eq!(first_match("$['t']", "not json"), None);
        assert_eq!(first_match("$[[", payload), None);
    }

    #[test]
    fn test_index_array_of_objects() {
        let payload = r##"[{"red": "#FF0000"}, {"green": "#27F25E"}]"##;
        assert_eq!(index(payload, "green"), Some(json!("#27F25E")));
        assert_eq!(index(payload, "blue"), None);
    }

    #[test]
    fn test_index_object() {
        let payload = r#"{"green": {"r": 39, "g": 242, "b": 94}}"#;
        let value = index(payload, "green").unwrap();
        assert_eq!(value["g"], json!(242));
        assert!(value_to_text(&value).contains('\n'));
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("raw")), "raw");
        assert_eq!(value_to_text(&json!(18.7)), "18.7");
        assert_eq!(value_to_text(&json!(true)), "true");
        assert_eq!(value_to_text(&json!(null)), "null");
    }
}
