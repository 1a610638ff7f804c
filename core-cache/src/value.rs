//! Payload serialization
//!
//! The cache stores every payload as a string. The strategy is selected by
//! the generic parameter at the call site rather than by inspecting values
//! at runtime: strings are stored raw, everything else as its JSON form.
//! `chrono` datetimes inside caller structs serialize through serde as
//! ISO-8601 strings, so no backend-specific timestamp types ever reach the
//! store.

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A payload serialized for storage.
#[derive(Debug, Clone)]
pub struct EncodedValue {
    /// The string written to the backend.
    pub payload: String,
    /// Byte length of `payload`.
    pub size_bytes: u64,
    /// SHA-256 hex digest of `payload`.
    pub content_hash: Option<String>,
}

/// Serialize a value for storage.
///
/// String values are stored raw (no JSON quoting) so that entries written
/// by earlier app versions, which stored plain text, stay readable.
pub fn encode<T: Serialize>(value: &T) -> Result<EncodedValue> {
    let json = serde_json::to_value(value)?;
    let payload = match json {
        Value::String(s) => s,
        other => serde_json::to_string(&other)?,
    };

    let size_bytes = payload.len() as u64;
    let content_hash = Some(hash_payload(&payload));

    Ok(EncodedValue {
        payload,
        size_bytes,
        content_hash,
    })
}

/// SHA-256 hex digest of a serialized payload.
pub fn hash_payload(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deserialize a stored payload.
///
/// Tries, in order:
/// 1. JSON parse and direct decode into `T`.
/// 2. When the payload is a single-field `{"data": ...}` object and the
///    direct decode failed, decode the inner value (wrapped-object write
///    path used for values that do not serialize standalone).
/// 3. The raw string, when `T` accepts one (plain-text entries written
///    before payloads carried metadata).
///
/// Returns `None` when nothing fits; the caller treats that as a miss.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        match serde_json::from_value::<T>(value.clone()) {
            Ok(decoded) => return Some(decoded),
            Err(_) => {
                if let Value::Object(map) = &value {
                    if map.len() == 1 {
                        if let Some(inner) = map.get("data") {
                            if let Ok(decoded) = serde_json::from_value::<T>(inner.clone()) {
                                return Some(decoded);
                            }
                        }
                    }
                }
            }
        }
    }

    serde_json::from_value::<T>(Value::String(raw.to_string())).ok()
}
