//! Deterministic key derivation: canonical JSON serialization of a selector
//! subtree, hashed with the configured digest algorithm.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Digest algorithm used to derive idempotency and validation hashes.
///
/// SHA-256's 256-bit output strictly exceeds the 128-bit collision-resistance
/// floor the false-match probability requires; it is the default and, for
/// now, the only supported option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashFunction {
    /// SHA-256, full 64-character hex digest.
    #[default]
    Sha256,
}

impl HashFunction {
    fn digest(self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(bytes);
                hex::encode(hasher.finalize())
            }
        }
    }
}

/// Serialize `value` into a canonical form: object keys sorted, no
/// whitespace, stable number formatting. Two JSON values that are
/// structurally equal (regardless of key order) always canonicalize to the
/// same bytes.
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), sort_keys(v));
            }
            let ordered: serde_json::Map<String, Value> = sorted.into_iter().collect();
            Value::Object(ordered)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Derive a hash of `value` using `hash_function`. Used both for the
/// idempotency key subtree and for the payload-validation subtree.
#[must_use]
pub fn hash_value(value: &Value, hash_function: HashFunction) -> String {
    hash_function.digest(canonicalize(value).as_bytes())
}

/// Derive the final stored idempotency key: `"{prefix#}{function_name}#{hex_digest}"`.
#[must_use]
pub fn derive_key(
    function_name: &str,
    key_prefix: Option<&str>,
    selector_value: &Value,
    hash_function: HashFunction,
) -> String {
    let digest = hash_value(selector_value, hash_function);
    match key_prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}#{function_name}#{digest}"),
        _ => format!("{function_name}#{digest}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_is_stable_under_key_reordering() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn canonicalize_sorts_nested_objects() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        let b = json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn hash_value_is_deterministic() {
        let value = json!({"address": "https://x"});
        assert_eq!(
            hash_value(&value, HashFunction::Sha256),
            hash_value(&value, HashFunction::Sha256)
        );
    }

    #[test]
    fn hash_value_differs_for_different_values() {
        let a = json!({"address": "https://x"});
        let b = json!({"address": "https://y"});
        assert_ne!(hash_value(&a, HashFunction::Sha256), hash_value(&b, HashFunction::Sha256));
    }

    #[test]
    fn derive_key_has_expected_shape_without_prefix() {
        let value = json!("https://x");
        let key = derive_key("send_email", None, &value, HashFunction::Sha256);
        let (name, digest) = key.split_once('#').unwrap();
        assert_eq!(name, "send_email");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn derive_key_includes_prefix_when_set() {
        let value = json!("https://x");
        let key = derive_key("send_email", Some("tenant-a"), &value, HashFunction::Sha256);
        assert!(key.starts_with("tenant-a#send_email#"));
    }

    #[test]
    fn derive_key_is_order_independent_for_object_subtrees() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        let ka = derive_key("f", None, &a, HashFunction::Sha256);
        let kb = derive_key("f", None, &b, HashFunction::Sha256);
        assert_eq!(ka, kb);
    }
}
