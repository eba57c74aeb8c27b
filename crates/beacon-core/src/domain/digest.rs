//! Canonical JSON and SHA256 digests for plan topology.
//!
//! The resolver stamps every execution plan with a digest of its canonical
//! form, so two runs can be checked for plan equality from their reports
//! alone. Canonicalization sorts object keys by UTF-16 code units and
//! collapses integer-valued floats, so semantically identical plans hash
//! identically regardless of construction order.

use sha2::{Digest, Sha256};

/// Recursively canonicalize: normalize numbers, then sort object keys by
/// UTF-16 code unit order.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| {
                a.encode_utf16()
                    .collect::<Vec<u16>>()
                    .cmp(&b.encode_utf16().collect::<Vec<u16>>())
            });

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        serde_json::Value::Number(n) => {
            // Integer-valued floats hash the same as their integer form.
            match n.as_f64() {
                Some(f)
                    if !n.is_i64()
                        && !n.is_u64()
                        && f.fract() == 0.0
                        && f >= i64::MIN as f64
                        && f <= i64::MAX as f64 =>
                {
                    serde_json::Value::Number(serde_json::Number::from(f as i64))
                }
                _ => serde_json::Value::Number(n.clone()),
            }
        }
        other => other.clone(),
    }
}

/// Serialize to canonical compact JSON.
pub fn canonical_json(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize(value))
}

/// SHA256 hex digest of the canonical JSON form.
pub fn compute_digest(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
