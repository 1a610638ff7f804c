//! Cache metadata records
//!
//! One [`CacheMetadata`] record accompanies every cached payload. The record
//! and the payload are stored separately: payloads live under their own key
//! in the owning namespace, metadata lives under the composite
//! `namespace:key` in the shared metadata namespace. Every specialized
//! manager reuses this one schema.

use serde::{Deserialize, Serialize};

/// Default time-to-live for cached entries: 7 days.
pub const DEFAULT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Namespace that holds all metadata records.
pub const METADATA_NAMESPACE: &str = "cache_metadata";

/// Languages written right-to-left.
const RTL_LANGUAGES: [&str; 8] = ["ur", "ar", "he", "fa", "ku", "ps", "sd", "yi"];

/// Text direction hint for cached content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
}

impl TextDirection {
    /// Derive the direction for an ISO 639-1 language code.
    pub fn for_language(language: &str) -> Self {
        let code = language.to_ascii_lowercase();
        let base = code.split(['-', '_']).next().unwrap_or(&code);
        if RTL_LANGUAGES.contains(&base) {
            TextDirection::Rtl
        } else {
            TextDirection::Ltr
        }
    }
}

/// Metadata describing one cached entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Key the payload is stored under in its namespace.
    pub original_key: String,

    /// Namespace holding the payload.
    pub namespace: String,

    /// Creation timestamp, Unix milliseconds.
    pub created_at_ms: i64,

    /// Time-to-live in milliseconds. Non-positive disables expiry.
    pub ttl_ms: i64,

    /// Serialized payload size in bytes.
    pub size_bytes: u64,

    /// Content language (ISO 639-1), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Text direction derived from the language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<TextDirection>,

    /// Provenance tag ("network", "local", ...).
    pub source: String,

    /// SHA-256 hex digest of the serialized payload, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Number of read hits recorded for this entry.
    pub access_count: u64,

    /// Timestamp of the most recent access, Unix milliseconds.
    pub last_access_ms: i64,

    /// Opaque extension bag for callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CacheMetadata {
    /// Create a fresh record for a payload cached now.
    pub fn new(key: impl Into<String>, namespace: impl Into<String>, now_ms: i64, ttl_ms: i64) -> Self {
        Self {
            original_key: key.into(),
            namespace: namespace.into(),
            created_at_ms: now_ms,
            ttl_ms,
            size_bytes: 0,
            language: None,
            direction: None,
            source: "network".to_string(),
            content_hash: None,
            access_count: 0,
            last_access_ms: now_ms,
            properties: None,
        }
    }

    /// Set the content language; the text direction is derived from it.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.direction = Some(TextDirection::for_language(&language));
        self.language = Some(language);
        self
    }

    /// Set the provenance tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the serialized payload size.
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Set the content hash.
    pub fn with_hash(mut self, content_hash: Option<String>) -> Self {
        self.content_hash = content_hash;
        self
    }

    /// Attach caller-defined properties.
    pub fn with_properties(
        mut self,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Composite key this record is stored under in the metadata namespace.
    pub fn metadata_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    /// Whether the entry has outlived its TTL at the given instant.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.ttl_ms > 0 && now_ms > self.created_at_ms + self.ttl_ms
    }

    /// Instant the entry expires, or `None` when it never expires.
    pub fn expires_at_ms(&self) -> Option<i64> {
        (self.ttl_ms > 0).then(|| self.created_at_ms + self.ttl_ms)
    }

    /// Record a read hit. Access stats never move backwards.
    pub fn record_access(&mut self, now_ms: i64) {
        self.access_count += 1;
        self.last_access_ms = self.last_access_ms.max(now_ms);
    }
}

/// A cached payload paired with its metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub metadata: CacheMetadata,
}
