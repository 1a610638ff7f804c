//! # Generic Cache Manager
//!
//! Namespace-scoped key-value cache with TTL expiry and metadata tracking,
//! backed by a persistent [`KeyValueStore`] with an optional in-process L1
//! tier in front of it.
//!
//! ## Storage layout
//!
//! Payloads and metadata are separate records:
//! - payload: `namespace` / `key`
//! - metadata: `cache_metadata` / `namespace:key`
//!
//! The two are written and deleted together. A payload whose metadata record
//! is missing is still served (entries written before metadata tracking
//! existed) but logged as an anomaly and treated as having no TTL.
//!
//! ## Tiering
//!
//! When a memory capacity is configured, reads and writes pass through one
//! `lru`-backed L1 keyed by the composite metadata key. Expiry and eviction
//! decisions are made by the same code for both tiers; the L1 simply drops
//! entries whenever the persistent record is deleted or found expired.
//!
//! ## Failure semantics
//!
//! Write paths (`put`, `remove`, `clear_namespace`) propagate errors so the
//! caller can fall back to fetching fresh. Read paths and maintenance sweeps
//! degrade: they log, skip the offending entry, and keep going.

use crate::error::{CacheError, Result};
use crate::metadata::{CacheEntry, CacheMetadata, DEFAULT_TTL_MS, METADATA_NAMESPACE};
use crate::priority::PinRegistry;
use crate::stats::SweepOutcome;
use crate::value;
use bridge_traits::kv::KeyValueStore;
use bridge_traits::time::Clock;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Optional attributes recorded with a `put`.
#[derive(Debug, Default, Clone)]
pub struct PutOptions {
    /// Content language (ISO 639-1); the text direction is derived from it.
    pub language: Option<String>,
    /// Provenance tag; defaults to "network".
    pub source: Option<String>,
    /// Opaque extension bag stored on the metadata record.
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_properties(
        mut self,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// One L1 slot: the stored payload plus its metadata record, if any.
#[derive(Clone)]
struct L1Entry {
    payload: String,
    metadata: Option<CacheMetadata>,
}

/// Generic namespace-scoped cache engine.
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    memory: Option<Mutex<LruCache<String, L1Entry>>>,
    default_ttl_ms: i64,
}

impl CacheManager {
    /// Create a manager over the given backend with no L1 tier.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            memory: None,
            default_ttl_ms: DEFAULT_TTL_MS,
        }
    }

    /// Enable the in-process L1 tier. A capacity of 0 leaves it disabled.
    pub fn with_memory_cache(mut self, capacity: usize) -> Self {
        self.memory = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        self
    }

    /// Override the TTL used when a `put` does not pass one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = ttl.as_millis() as i64;
        self
    }

    /// Store a value and its metadata record.
    ///
    /// The payload is written first. A metadata write failure after a
    /// durable payload write is logged and swallowed: the next read falls
    /// back to the no-metadata path instead of the entry being lost.
    #[instrument(skip(self, value, options))]
    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        namespace: &str,
        ttl: Option<Duration>,
        options: PutOptions,
    ) -> Result<()> {
        let encoded = value::encode(value)?;
        let now = self.clock.unix_timestamp_millis();
        let ttl_ms = ttl
            .map(|t| t.as_millis() as i64)
            .unwrap_or(self.default_ttl_ms);

        self.store
            .put(namespace, key, &encoded.payload)
            .await
            .map_err(CacheError::from)?;

        let mut metadata = CacheMetadata::new(key, namespace, now, ttl_ms)
            .with_size(encoded.size_bytes)
            .with_hash(encoded.content_hash);
        if let Some(language) = options.language {
            metadata = metadata.with_language(language);
        }
        if let Some(source) = options.source {
            metadata = metadata.with_source(source);
        }
        if let Some(properties) = options.properties {
            metadata = metadata.with_properties(properties);
        }

        let composite = CacheMetadata::metadata_key(namespace, key);
        match serde_json::to_string(&metadata) {
            Ok(raw) => {
                if let Err(e) = self.store.put(METADATA_NAMESPACE, &composite, &raw).await {
                    warn!(
                        namespace = namespace,
                        key = key,
                        error = %e,
                        "Failed to write cache metadata"
                    );
                }
            }
            Err(e) => {
                warn!(
                    namespace = namespace,
                    key = key,
                    error = %e,
                    "Failed to serialize cache metadata"
                );
            }
        }

        self.l1_insert(
            &composite,
            L1Entry {
                payload: encoded.payload,
                metadata: Some(metadata),
            },
        );

        Ok(())
    }

    /// Retrieve a value. Returns `None` on miss, expiry, or decode mismatch.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: &str,
        update_access_stats: bool,
    ) -> Option<T> {
        let (payload, _) = self.fetch(key, namespace, update_access_stats).await?;
        value::decode(&payload)
    }

    /// Retrieve a value together with its metadata record.
    ///
    /// When the payload has no metadata record a synthesized one is returned,
    /// tagged `source = "unknown"` with expiry disabled.
    #[instrument(skip(self))]
    pub async fn get_with_metadata<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: &str,
        update_access_stats: bool,
    ) -> Option<CacheEntry<T>> {
        let (payload, metadata) = self.fetch(key, namespace, update_access_stats).await?;
        let data = value::decode(&payload)?;
        let metadata = metadata.unwrap_or_else(|| {
            let now = self.clock.unix_timestamp_millis();
            CacheMetadata::new(key, namespace, now, 0)
                .with_size(payload.len() as u64)
                .with_source("unknown")
        });

        Some(CacheEntry { data, metadata })
    }

    /// Delete a payload and its metadata record.
    ///
    /// Succeeds whether or not either record exists.
    #[instrument(skip(self))]
    pub async fn remove(&self, key: &str, namespace: &str) -> Result<()> {
        let composite = CacheMetadata::metadata_key(namespace, key);
        self.store.delete(namespace, key).await?;
        self.store.delete(METADATA_NAMESPACE, &composite).await?;
        self.l1_remove(&composite);
        Ok(())
    }

    /// Delete every payload in a namespace and every matching metadata record.
    #[instrument(skip(self))]
    pub async fn clear_namespace(&self, namespace: &str) -> Result<()> {
        self.store.clear_namespace(namespace).await?;

        let prefix = format!("{}:", namespace);
        for key in self.store.list_keys(METADATA_NAMESPACE).await? {
            if key.starts_with(&prefix) {
                self.store.delete(METADATA_NAMESPACE, &key).await?;
            }
        }

        self.l1_remove_prefix(&prefix);
        debug!(namespace = namespace, "Cleared namespace");
        Ok(())
    }

    /// Remove every expired entry in a namespace.
    ///
    /// Per-entry failures (unreadable or unparseable records, failed deletes)
    /// are skipped and counted; the sweep always runs to the end.
    #[instrument(skip(self))]
    pub async fn clear_expired_entries(&self, namespace: &str) -> SweepOutcome {
        let now = self.clock.unix_timestamp_millis();
        let prefix = format!("{}:", namespace);
        let mut outcome = SweepOutcome::default();

        let keys = match self.store.list_keys(METADATA_NAMESPACE).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(namespace = namespace, error = %e, "Failed to list metadata for expiry sweep");
                return outcome;
            }
        };

        for composite in keys.into_iter().filter(|k| k.starts_with(&prefix)) {
            let raw = match self.store.get(METADATA_NAMESPACE, &composite).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %composite, error = %e, "Failed to read metadata record");
                    outcome.failed += 1;
                    continue;
                }
            };

            let metadata = match serde_json::from_str::<CacheMetadata>(&raw) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(key = %composite, error = %e, "Skipping unparseable metadata record");
                    outcome.failed += 1;
                    continue;
                }
            };

            if !metadata.is_expired(now) {
                continue;
            }

            match self
                .delete_entry(namespace, &metadata.original_key, &composite)
                .await
            {
                Ok(()) => outcome.removed += 1,
                Err(e) => {
                    warn!(key = %composite, error = %e, "Failed to delete expired entry");
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            namespace = namespace,
            removed = outcome.removed,
            failed = outcome.failed,
            "Expiry sweep finished"
        );
        outcome
    }

    /// Evict least-recently-accessed entries until the namespace fits the
    /// budget. Pinned entries are never evicted, even when oldest.
    #[instrument(skip(self, pins))]
    pub async fn enforce_size_limit(
        &self,
        namespace: &str,
        max_bytes: u64,
        pins: Option<&PinRegistry>,
    ) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let (mut entries, parse_failures) = self.namespace_metadata(namespace).await;
        outcome.failed += parse_failures;

        let mut total: u64 = entries.iter().map(|m| m.size_bytes).sum();
        if total <= max_bytes {
            return outcome;
        }

        // Least recently accessed first
        entries.sort_by_key(|m| m.last_access_ms);

        for metadata in entries {
            if total <= max_bytes {
                break;
            }

            if pins.map_or(false, |p| p.protects(&metadata)) {
                debug!(key = %metadata.original_key, "Skipping pinned entry during eviction");
                continue;
            }

            let composite = CacheMetadata::metadata_key(namespace, &metadata.original_key);
            match self
                .delete_entry(namespace, &metadata.original_key, &composite)
                .await
            {
                Ok(()) => {
                    total = total.saturating_sub(metadata.size_bytes);
                    outcome.removed += 1;
                }
                Err(e) => {
                    warn!(key = %composite, error = %e, "Failed to evict entry");
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            namespace = namespace,
            evicted = outcome.removed,
            failed = outcome.failed,
            remaining_bytes = total,
            "Size enforcement finished"
        );
        outcome
    }

    /// Whether a live (present and unexpired) payload exists for the key.
    pub async fn exists(&self, key: &str, namespace: &str) -> bool {
        let present = match self.store.contains(namespace, key).await {
            Ok(present) => present,
            Err(_) => return false,
        };
        if !present {
            return false;
        }

        let composite = CacheMetadata::metadata_key(namespace, key);
        match self.store.get(METADATA_NAMESPACE, &composite).await {
            Ok(Some(raw)) => match serde_json::from_str::<CacheMetadata>(&raw) {
                Ok(metadata) => !metadata.is_expired(self.clock.unix_timestamp_millis()),
                Err(_) => true,
            },
            // No metadata record: the payload alone counts
            Ok(None) => true,
            Err(_) => true,
        }
    }

    /// All payload keys in a namespace.
    pub async fn all_keys(&self, namespace: &str) -> Vec<String> {
        match self.store.list_keys(namespace).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(namespace = namespace, error = %e, "Failed to list keys");
                Vec::new()
            }
        }
    }

    /// Total bytes tracked by metadata for a namespace.
    pub async fn namespace_size(&self, namespace: &str) -> u64 {
        let (entries, _) = self.namespace_metadata(namespace).await;
        entries.iter().map(|m| m.size_bytes).sum()
    }

    /// The metadata record for a key, if present and parseable.
    pub async fn metadata_for(&self, key: &str, namespace: &str) -> Option<CacheMetadata> {
        let composite = CacheMetadata::metadata_key(namespace, key);
        let raw = self.store.get(METADATA_NAMESPACE, &composite).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Shared read path for `get` and `get_with_metadata`.
    async fn fetch(
        &self,
        key: &str,
        namespace: &str,
        update_access_stats: bool,
    ) -> Option<(String, Option<CacheMetadata>)> {
        let now = self.clock.unix_timestamp_millis();
        let composite = CacheMetadata::metadata_key(namespace, key);

        if let Some(entry) = self.l1_get(&composite) {
            if let Some(metadata) = &entry.metadata {
                if metadata.is_expired(now) {
                    self.l1_remove(&composite);
                    return None;
                }
            }

            let metadata = if update_access_stats {
                self.bump_access_stats(&composite, entry.metadata, now).await
            } else {
                entry.metadata
            };

            self.l1_insert(
                &composite,
                L1Entry {
                    payload: entry.payload.clone(),
                    metadata: metadata.clone(),
                },
            );
            return Some((entry.payload, metadata));
        }

        let payload = match self.store.get(namespace, key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!(namespace = namespace, key = key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let metadata = match self.store.get(METADATA_NAMESPACE, &composite).await {
            Ok(Some(raw)) => match serde_json::from_str::<CacheMetadata>(&raw) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!(key = %composite, error = %e, "Unparseable metadata record, serving payload without it");
                    None
                }
            },
            Ok(None) => {
                warn!(
                    namespace = namespace,
                    key = key,
                    "Payload present without metadata record"
                );
                None
            }
            Err(e) => {
                warn!(key = %composite, error = %e, "Metadata read failed, serving payload without it");
                None
            }
        };

        if let Some(metadata) = &metadata {
            if metadata.is_expired(now) {
                // The stale records stay put for the expiry sweep to reap.
                self.l1_remove(&composite);
                return None;
            }
        }

        let metadata = if update_access_stats {
            self.bump_access_stats(&composite, metadata, now).await
        } else {
            metadata
        };

        self.l1_insert(
            &composite,
            L1Entry {
                payload: payload.clone(),
                metadata: metadata.clone(),
            },
        );
        Some((payload, metadata))
    }

    /// Increment access stats and write the record back. Failures are logged,
    /// never propagated: stats must not break a read hit.
    async fn bump_access_stats(
        &self,
        composite: &str,
        metadata: Option<CacheMetadata>,
        now: i64,
    ) -> Option<CacheMetadata> {
        let mut metadata = metadata?;
        metadata.record_access(now);

        match serde_json::to_string(&metadata) {
            Ok(raw) => {
                if let Err(e) = self.store.put(METADATA_NAMESPACE, composite, &raw).await {
                    warn!(key = %composite, error = %e, "Failed to persist access stats");
                }
            }
            Err(e) => {
                warn!(key = %composite, error = %e, "Failed to serialize access stats");
            }
        }

        Some(metadata)
    }

    /// Delete a payload/metadata pair and drop its L1 slot.
    async fn delete_entry(&self, namespace: &str, key: &str, composite: &str) -> Result<()> {
        self.store.delete(namespace, key).await?;
        self.store.delete(METADATA_NAMESPACE, composite).await?;
        self.l1_remove(composite);
        Ok(())
    }

    /// Parse every metadata record for a namespace. Returns the records and
    /// the number that failed to load.
    async fn namespace_metadata(&self, namespace: &str) -> (Vec<CacheMetadata>, u64) {
        let prefix = format!("{}:", namespace);
        let mut entries = Vec::new();
        let mut failed = 0u64;

        let keys = match self.store.list_keys(METADATA_NAMESPACE).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(namespace = namespace, error = %e, "Failed to list metadata records");
                return (entries, failed);
            }
        };

        for key in keys.into_iter().filter(|k| k.starts_with(&prefix)) {
            match self.store.get(METADATA_NAMESPACE, &key).await {
                Ok(Some(raw)) => match serde_json::from_str::<CacheMetadata>(&raw) {
                    Ok(metadata) => entries.push(metadata),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Skipping unparseable metadata record");
                        failed += 1;
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read metadata record");
                    failed += 1;
                }
            }
        }

        (entries, failed)
    }

    fn l1_get(&self, composite: &str) -> Option<L1Entry> {
        self.memory
            .as_ref()
            .and_then(|m| m.lock().get(composite).cloned())
    }

    fn l1_insert(&self, composite: &str, entry: L1Entry) {
        if let Some(memory) = &self.memory {
            memory.lock().put(composite.to_string(), entry);
        }
    }

    fn l1_remove(&self, composite: &str) {
        if let Some(memory) = &self.memory {
            memory.lock().pop(composite);
        }
    }

    fn l1_remove_prefix(&self, prefix: &str) {
        if let Some(memory) = &self.memory {
            let mut cache = memory.lock();
            let keys: Vec<String> = cache
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                cache.pop(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::kv::MemoryKeyValueStore;
    use bridge_traits::time::ManualClock;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Book {
        title: String,
    }

    fn manager_with_clock(clock: Arc<ManualClock>) -> CacheManager {
        CacheManager::new(Arc::new(MemoryKeyValueStore::new()), clock).with_memory_cache(16)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = manager_with_clock(clock);

        let book = Book {
            title: "Foo".to_string(),
        };
        cache
            .put("book1", &book, "books", None, PutOptions::new())
            .await
            .unwrap();

        let back: Book = cache.get("book1", "books", true).await.unwrap();
        assert_eq!(back, book);
    }

    #[tokio::test]
    async fn test_metadata_recorded_on_put() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = manager_with_clock(clock);

        cache
            .put(
                "book1",
                &Book {
                    title: "Foo".to_string(),
                },
                "books",
                Some(Duration::from_secs(60)),
                PutOptions::new().with_language("ar").with_source("import"),
            )
            .await
            .unwrap();

        let metadata = cache.metadata_for("book1", "books").await.unwrap();
        assert_eq!(metadata.namespace, "books");
        assert_eq!(metadata.ttl_ms, 60_000);
        assert_eq!(metadata.language.as_deref(), Some("ar"));
        assert_eq!(
            metadata.direction,
            Some(crate::metadata::TextDirection::Rtl)
        );
        assert_eq!(metadata.source, "import");
        assert!(metadata.size_bytes > 0);
        assert_eq!(metadata.content_hash.as_deref().map(str::len), Some(64));
    }

    #[tokio::test]
    async fn test_l1_serves_after_backend_clear() {
        // The L1 keeps serving until the engine itself deletes the entry.
        let store = Arc::new(MemoryKeyValueStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let cache =
            CacheManager::new(store.clone(), clock).with_memory_cache(4);

        cache
            .put("k", &"v".to_string(), "ns", None, PutOptions::new())
            .await
            .unwrap();

        // Wipe the backend behind the engine's back
        store.clear_namespace("ns").await.unwrap();

        let hit: Option<String> = cache.get("k", "ns", false).await;
        assert_eq!(hit, Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_memoryless_manager_misses_after_backend_clear() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = CacheManager::new(store.clone(), clock);

        cache
            .put("k", &"v".to_string(), "ns", None, PutOptions::new())
            .await
            .unwrap();
        store.clear_namespace("ns").await.unwrap();

        let miss: Option<String> = cache.get("k", "ns", false).await;
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_put_options_builder() {
        let options = PutOptions::new()
            .with_language("en")
            .with_source("prefetch");
        assert_eq!(options.language.as_deref(), Some("en"));
        assert_eq!(options.source.as_deref(), Some("prefetch"));
        assert!(options.properties.is_none());
    }
}
