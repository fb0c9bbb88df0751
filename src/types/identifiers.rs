use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of every cache key: hex-encoded SHA-256.
pub const CACHE_KEY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum CacheKeyError {
    #[error("Cache parameters are not serializable: {0}")]
    Params(#[from] serde_json::Error),
    #[error("Invalid cache path segment: {0:?}")]
    InvalidSegment(String),
}

/// Content-derived address of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for (namespace, operation, params).
    ///
    /// Params are canonicalized first, so two mappings holding the same pairs
    /// in a different insertion order hash identically.
    pub fn derive<P: Serialize + ?Sized>(
        namespace: &str,
        operation: &str,
        params: &P,
    ) -> Result<Self, CacheKeyError> {
        validate_segment(namespace)?;
        validate_segment(operation)?;

        let params = serde_json::to_value(params)?;
        let mut canonical = String::new();
        write_canonical(&params, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());

        Ok(CacheKey(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Namespaces and operations become directory names.
pub fn validate_segment(segment: &str) -> Result<(), CacheKeyError> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CacheKeyError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

/// JSON text with object keys sorted at every depth.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
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
