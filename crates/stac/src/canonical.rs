use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical content hash of a JSON document: SHA-256 over a serialization
/// with recursively sorted object keys. Array order is preserved (asset and
/// link ordering is meaningful). Two documents that differ only in object
/// key order hash identically, so benign reordering never reads as a
/// conflict.
pub fn canonical_hash(value: &Value) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(&canonicalize(value))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
