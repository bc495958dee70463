//! Canonical request fingerprints
//!
//! Two argument objects that differ only in key order, integral float
//! spelling (`1.0` vs `1`) or `null` members hash to the same key.
//! Array order is significant.

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

/// Largest integer an f64 represents exactly
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Canonical JSON text for `value`
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Hex SHA-256 of the canonical JSON text
pub fn canonical_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => write_string(s, out),
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
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            members.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(name, out);
                out.push(':');
                write_canonical(member, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

fn canonical_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT => {
            (f as i64).to_string()
        }
        _ => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_ignored() {
        let a = json!({"query": "rust", "limit": 10, "opts": {"x": 1, "y": 2}});
        let b = json!({"opts": {"y": 2, "x": 1}, "limit": 10, "query": "rust"});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn test_integral_floats_normalized() {
        assert_eq!(
            canonical_string(&json!({"limit": 10.0})),
            canonical_string(&json!({"limit": 10}))
        );
        assert_eq!(canonical_string(&json!(-0.0)), "0");
        assert_eq!(canonical_string(&json!(2.5)), "2.5");
    }

    #[test]
    fn test_null_members_dropped() {
        assert_eq!(
            canonical_hash(&json!({"q": "rust", "cursor": null})),
            canonical_hash(&json!({"q": "rust"}))
        );
        assert_eq!(canonical_string(&json!([null, 1])), "[null,1]");
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            canonical_hash(&json!({"ids": [1, 2]})),
            canonical_hash(&json!({"ids": [2, 1]}))
        );
    }

    #[test]
    fn test_canonical_text() {
        let value = json!({"b": "x\"y", "a": [true, {"d": 1, "c": null}]});
        assert_eq!(canonical_string(&value), r#"{"a":[true,{"d":1}],"b":"x\"y"}"#);
        assert_eq!(canonical_hash(&value).len(), 64);
    }
}
