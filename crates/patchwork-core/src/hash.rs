use serde_json::Value;
use sha2::{Digest, Sha256};

/// Rebuild a JSON value with every object's keys in lexicographic order.
/// Arrays keep their order.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Canonical byte encoding: sorted keys, no whitespace.
pub fn canonical_json_bytes(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&sorted(value))
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of a JSON value's canonical encoding.
pub fn content_hash(value: &Value) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(&canonical_json_bytes(value)?))
}
