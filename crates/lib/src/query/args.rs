//! Deterministic argument serialization.
//!
//! Field arguments become part of a field's storage key, so logically equal arguments must
//! serialize identically however they were constructed. Object keys are sorted explicitly
//! rather than relying on the map type behind `serde_json::Value`.

use serde_json::Value;

/// Serialize `value` as compact JSON with object keys in sorted order, at every depth.
///
/// ```
/// use normcache::query::args::canonical_json;
/// use serde_json::json;
///
/// let a = json!({"filter": {"code": {"regex": "U"}, "continent": "NA"}});
/// let b = json!({"filter": {"continent": "NA", "code": {"regex": "U"}}});
/// assert_eq!(canonical_json(&a), canonical_json(&b));
/// assert_eq!(canonical_json(&a), r#"{"filter":{"code":{"regex":"U"},"continent":"NA"}}"#);
/// ```
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Check whether `filter` is contained in `stored`: every filter key must be present with a
/// matching value, recursing into objects. Non-object values must be equal.
pub fn args_match(stored: &Value, filter: &Value) -> bool {
    match (stored, filter) {
        (Value::Object(stored), Value::Object(filter)) => filter.iter().all(|(key, expected)| {
            stored
                .get(key)
                .is_some_and(|actual| args_match(actual, expected))
        }),
        _ => stored == filter,
    }
}
