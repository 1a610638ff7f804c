//! # Preferences Cache Manager
//!
//! Small typed values (reader preferences, bookmarks, reading progress) over
//! a [`SettingsStore`], with bookkeeping metadata kept as a `meta:`-prefixed
//! twin of every entry. The twins reuse the one [`CacheMetadata`] schema with
//! expiry disabled: preferences never expire, the records exist for size and
//! access-count reporting only.

use crate::error::Result;
use crate::metadata::CacheMetadata;
use crate::value;
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Namespace recorded on preference metadata twins.
pub const PREFERENCES_NAMESPACE: &str = "preferences";

/// Prefix for metadata twin keys.
const METADATA_KEY_PREFIX: &str = "meta:";

/// Prefix for bookmark entries.
const BOOKMARK_KEY_PREFIX: &str = "bookmark:";

/// Prefix for reading progress entries.
const PROGRESS_KEY_PREFIX: &str = "progress:";

/// Typed preferences storage with size/access bookkeeping.
pub struct PreferencesCacheManager {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl PreferencesCacheManager {
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    // ========================================================================
    // Typed scalar accessors
    // ========================================================================

    pub async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.settings.set_string(key, value).await?;
        self.record_metadata(key, value.len() as u64, Some(value::hash_payload(value)))
            .await;
        Ok(())
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        let value = self.settings.get_string(key).await.ok()??;
        self.touch_metadata(key).await;
        Some(value)
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.settings.set_bool(key, value).await?;
        self.record_metadata(key, value.to_string().len() as u64, None)
            .await;
        Ok(())
    }

    pub async fn get_bool(&self, key: &str) -> Option<bool> {
        let value = self.settings.get_bool(key).await.ok()??;
        self.touch_metadata(key).await;
        Some(value)
    }

    pub async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.settings.set_i64(key, value).await?;
        self.record_metadata(key, value.to_string().len() as u64, None)
            .await;
        Ok(())
    }

    pub async fn get_i64(&self, key: &str) -> Option<i64> {
        let value = self.settings.get_i64(key).await.ok()??;
        self.touch_metadata(key).await;
        Some(value)
    }

    pub async fn set_f64(&self, key: &str, value: f64) -> Result<()> {
        self.settings.set_f64(key, value).await?;
        self.record_metadata(key, value.to_string().len() as u64, None)
            .await;
        Ok(())
    }

    pub async fn get_f64(&self, key: &str) -> Option<f64> {
        let value = self.settings.get_f64(key).await.ok()??;
        self.touch_metadata(key).await;
        Some(value)
    }

    // ========================================================================
    // Structured values
    // ========================================================================

    /// Store a structured value through the shared serialization path.
    pub async fn set_value<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = value::encode(value)?;
        self.settings.set_string(key, &encoded.payload).await?;
        self.record_metadata(key, encoded.size_bytes, encoded.content_hash)
            .await;
        Ok(())
    }

    /// Retrieve a structured value.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.settings.get_string(key).await.ok()??;
        let decoded = value::decode(&raw)?;
        self.touch_metadata(key).await;
        Some(decoded)
    }

    /// Delete an entry and its metadata twin.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.settings.delete(key).await?;
        self.settings.delete(&meta_key(key)).await?;
        Ok(())
    }

    // ========================================================================
    // Bookmarks and reading progress
    // ========================================================================

    pub async fn save_bookmark<T: Serialize>(&self, book_id: &str, bookmark: &T) -> Result<()> {
        self.set_value(&format!("{}{}", BOOKMARK_KEY_PREFIX, book_id), bookmark)
            .await
    }

    pub async fn get_bookmark<T: DeserializeOwned>(&self, book_id: &str) -> Option<T> {
        self.get_value(&format!("{}{}", BOOKMARK_KEY_PREFIX, book_id))
            .await
    }

    /// Remove every bookmark and its metadata twin. Returns the count removed.
    #[instrument(skip(self))]
    pub async fn clear_all_bookmarks(&self) -> u64 {
        self.clear_by_prefix(BOOKMARK_KEY_PREFIX).await
    }

    pub async fn save_reading_progress<T: Serialize>(
        &self,
        book_id: &str,
        progress: &T,
    ) -> Result<()> {
        self.set_value(&format!("{}{}", PROGRESS_KEY_PREFIX, book_id), progress)
            .await
    }

    pub async fn get_reading_progress<T: DeserializeOwned>(&self, book_id: &str) -> Option<T> {
        self.get_value(&format!("{}{}", PROGRESS_KEY_PREFIX, book_id))
            .await
    }

    /// Remove every reading-progress entry and its metadata twin.
    #[instrument(skip(self))]
    pub async fn clear_all_reading_progress(&self) -> u64 {
        self.clear_by_prefix(PROGRESS_KEY_PREFIX).await
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Total bytes recorded by the metadata twins.
    pub async fn preferences_size(&self) -> u64 {
        let keys = match self.settings.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list preference keys");
                return 0;
            }
        };

        let mut total = 0u64;
        for key in keys.iter().filter(|k| k.starts_with(METADATA_KEY_PREFIX)) {
            if let Ok(Some(raw)) = self.settings.get_string(key).await {
                if let Ok(metadata) = serde_json::from_str::<CacheMetadata>(&raw) {
                    total += metadata.size_bytes;
                }
            }
        }
        total
    }

    /// The bookkeeping record for an entry, if present.
    pub async fn metadata_for(&self, key: &str) -> Option<CacheMetadata> {
        let raw = self.settings.get_string(&meta_key(key)).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Remove every entry matching a prefix, plus its metadata twin.
    async fn clear_by_prefix(&self, prefix: &str) -> u64 {
        let keys = match self.settings.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = prefix, error = %e, "Failed to list preference keys");
                return 0;
            }
        };

        let mut removed = 0u64;
        for key in keys {
            if !key.starts_with(prefix) || key.starts_with(METADATA_KEY_PREFIX) {
                continue;
            }

            match self.settings.delete(&key).await {
                Ok(()) => {
                    if let Err(e) = self.settings.delete(&meta_key(&key)).await {
                        warn!(key = %key, error = %e, "Failed to delete metadata twin");
                    }
                    removed += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete preference entry");
                }
            }
        }

        debug!(prefix = prefix, removed = removed, "Cleared entries by prefix");
        removed
    }

    /// Create or refresh the metadata twin after a write.
    ///
    /// Bookkeeping failures are logged, never propagated: the entry write
    /// already succeeded.
    async fn record_metadata(&self, key: &str, size_bytes: u64, content_hash: Option<String>) {
        let now = self.clock.unix_timestamp_millis();
        let metadata = match self.metadata_for(key).await {
            Some(mut existing) => {
                existing.size_bytes = size_bytes;
                existing.content_hash = content_hash;
                existing
            }
            None => CacheMetadata::new(key, PREFERENCES_NAMESPACE, now, 0)
                .with_size(size_bytes)
                .with_hash(content_hash)
                .with_source("local"),
        };

        self.write_metadata(key, &metadata).await;
    }

    /// Bump access stats on the metadata twin after a read hit.
    async fn touch_metadata(&self, key: &str) {
        if let Some(mut metadata) = self.metadata_for(key).await {
            metadata.record_access(self.clock.unix_timestamp_millis());
            self.write_metadata(key, &metadata).await;
        }
    }

    async fn write_metadata(&self, key: &str, metadata: &CacheMetadata) {
        match serde_json::to_string(metadata) {
            Ok(raw) => {
                if let Err(e) = self.settings.set_string(&meta_key(key), &raw).await {
                    warn!(key = %key, error = %e, "Failed to write preference metadata");
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize preference metadata");
            }
        }
    }
}

fn meta_key(key: &str) -> String {
    format!("{}{}", METADATA_KEY_PREFIX, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::storage::MemorySettingsStore;
    use bridge_traits::time::ManualClock;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Bookmark {
        chapter: u32,
        offset: u64,
    }

    fn manager() -> PreferencesCacheManager {
        PreferencesCacheManager::new(
            Arc::new(MemorySettingsStore::new()),
            Arc::new(ManualClock::new(1_000)),
        )
    }

    #[tokio::test]
    async fn test_typed_roundtrips() {
        let prefs = manager();

        prefs.set_string("theme", "sepia").await.unwrap();
        prefs.set_bool("wifi_only", true).await.unwrap();
        prefs.set_i64("font_size", 16).await.unwrap();
        prefs.set_f64("brightness", 0.8).await.unwrap();

        assert_eq!(prefs.get_string("theme").await, Some("sepia".to_string()));
        assert_eq!(prefs.get_bool("wifi_only").await, Some(true));
        assert_eq!(prefs.get_i64("font_size").await, Some(16));
        assert_eq!(prefs.get_f64("brightness").await, Some(0.8));
        assert_eq!(prefs.get_string("missing").await, None);
    }

    #[tokio::test]
    async fn test_bookmark_roundtrip() {
        let prefs = manager();
        let bookmark = Bookmark {
            chapter: 3,
            offset: 1200,
        };

        prefs.save_bookmark("book-1", &bookmark).await.unwrap();
        assert_eq!(prefs.get_bookmark::<Bookmark>("book-1").await, Some(bookmark));
        assert_eq!(prefs.get_bookmark::<Bookmark>("book-2").await, None);
    }

    #[tokio::test]
    async fn test_metadata_twin_tracks_access() {
        let prefs = manager();

        prefs.set_string("theme", "dark").await.unwrap();
        let before = prefs.metadata_for("theme").await.unwrap();
        assert_eq!(before.access_count, 0);
        assert_eq!(before.size_bytes, 4);
        assert_eq!(before.ttl_ms, 0);

        prefs.get_string("theme").await.unwrap();
        prefs.get_string("theme").await.unwrap();

        let after = prefs.metadata_for("theme").await.unwrap();
        assert_eq!(after.access_count, 2);
    }

    #[tokio::test]
    async fn test_clear_all_bookmarks_removes_twins() {
        let prefs = manager();

        prefs
            .save_bookmark("b1", &Bookmark { chapter: 1, offset: 0 })
            .await
            .unwrap();
        prefs
            .save_bookmark("b2", &Bookmark { chapter: 2, offset: 5 })
            .await
            .unwrap();
        prefs
            .save_reading_progress("b1", &0.5f64)
            .await
            .unwrap();

        assert_eq!(prefs.clear_all_bookmarks().await, 2);
        assert_eq!(prefs.get_bookmark::<Bookmark>("b1").await, None);
        assert!(prefs.metadata_for("bookmark:b1").await.is_none());

        // Reading progress untouched by the bookmark clear
        assert_eq!(prefs.get_reading_progress::<f64>("b1").await, Some(0.5));
        assert_eq!(prefs.clear_all_reading_progress().await, 1);
        assert_eq!(prefs.get_reading_progress::<f64>("b1").await, None);
    }

    #[tokio::test]
    async fn test_preferences_size_sums_twins() {
        let prefs = manager();

        prefs.set_string("a", "1234").await.unwrap();
        prefs.set_string("b", "12").await.unwrap();

        assert_eq!(prefs.preferences_size().await, 6);
    }

    #[tokio::test]
    async fn test_delete_removes_twin() {
        let prefs = manager();

        prefs.set_string("theme", "dark").await.unwrap();
        prefs.delete("theme").await.unwrap();

        assert_eq!(prefs.get_string("theme").await, None);
        assert!(prefs.metadata_for("theme").await.is_none());
    }
}
