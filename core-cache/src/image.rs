//! # Image Cache Manager
//!
//! Three-tier image retrieval: metadata lookup → disk blob probe → network
//! fetch. Once a file is on disk it is the source of truth; the metadata
//! record only points at it, and a record whose file has vanished is deleted
//! on sight and the lookup falls through to the next tier.

use crate::error::Result;
use crate::manager::{CacheManager, PutOptions};
use crate::value;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::events::{CacheEvent, EventBus, PrefetchEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Namespace holding image records.
pub const IMAGE_METADATA_NAMESPACE: &str = "image_metadata";

/// Extensions probed when only the cache key is known.
pub(crate) const KNOWN_EXTENSIONS: [&str; 5] = ["jpg", "png", "gif", "webp", "bmp"];

/// Progress events from batch preloads are reported under this content id.
const PRELOAD_CONTENT_ID: &str = "image_preload";

/// Metadata record for one cached image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// URL the image was fetched from.
    pub url: String,
    /// Absolute path of the cached file.
    pub file_path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Download timestamp, Unix milliseconds.
    pub downloaded_at_ms: i64,
}

/// Disk-backed image cache.
pub struct ImageCacheManager {
    cache: Arc<CacheManager>,
    fs: Arc<dyn FileSystemAccess>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus>>,
    image_dir: PathBuf,
}

impl ImageCacheManager {
    pub fn new(
        cache: Arc<CacheManager>,
        fs: Arc<dyn FileSystemAccess>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        image_dir: PathBuf,
    ) -> Self {
        Self {
            cache,
            fs,
            http,
            clock,
            events: None,
            image_dir,
        }
    }

    /// Set event bus for preload progress events.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Directory holding the cached image files.
    pub fn image_dir(&self) -> &PathBuf {
        &self.image_dir
    }

    /// Derive the cache key for a URL: `scheme://host/path`.
    ///
    /// The query string is dropped on purpose so cache-busting parameters
    /// (`?v=1`, `?v=2`, ...) collapse to one cached entry. Unparseable URLs
    /// are used verbatim.
    pub fn cache_key(url: &str) -> String {
        match Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => format!("{}://{}{}", parsed.scheme(), host, parsed.path()),
                None => url.to_string(),
            },
            Err(_) => url.to_string(),
        }
    }

    /// Retrieve an image, fetching and caching it on first access.
    ///
    /// Returns `None` only when the image is not cached and the network
    /// fetch failed; cache-layer problems never surface to the caller.
    #[instrument(skip(self))]
    pub async fn get_image(&self, url: &str, ttl: Option<Duration>) -> Option<PathBuf> {
        let key = Self::cache_key(url);

        // Tier 1: metadata lookup
        if let Some(record) = self
            .cache
            .get::<ImageRecord>(&key, IMAGE_METADATA_NAMESPACE, true)
            .await
        {
            let path = PathBuf::from(&record.file_path);
            if self.fs.exists(&path).await.unwrap_or(false) {
                debug!(url = url, "Image cache hit");
                return Some(path);
            }

            debug!(url = url, "Cached image file missing, healing stale metadata");
            if let Err(e) = self.cache.remove(&key, IMAGE_METADATA_NAMESPACE).await {
                warn!(url = url, error = %e, "Failed to remove stale image record");
            }
        }

        // Tier 2: direct disk probe
        if let Some(path) = self.probe_disk(&key).await {
            debug!(url = url, "Image found on disk without record, backfilling");
            self.backfill_record(&key, url, &path, ttl).await;
            return Some(path);
        }

        // Tier 3: network
        self.download_and_cache_image(url, ttl).await
    }

    /// Fetch an image from the network into the disk cache.
    ///
    /// Returns `None` on any fetch or write failure; never an error.
    #[instrument(skip(self))]
    pub async fn download_and_cache_image(
        &self,
        url: &str,
        ttl: Option<Duration>,
    ) -> Option<PathBuf> {
        let key = Self::cache_key(url);

        let response = match self.http.execute(HttpRequest::get(url)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = url, error = %e, "Image download failed");
                return None;
            }
        };

        if !response.is_success() {
            warn!(url = url, status = response.status, "Image download rejected");
            return None;
        }

        let extension = sniff_extension(&response.body);
        let path = self
            .image_dir
            .join(format!("{}.{}", file_stem(&key), extension));

        if let Err(e) = self.fs.write_file(&path, response.body.clone()).await {
            warn!(url = url, error = %e, "Failed to write cached image");
            return None;
        }

        let record = ImageRecord {
            url: url.to_string(),
            file_path: path.to_string_lossy().into_owned(),
            size_bytes: response.body.len() as u64,
            downloaded_at_ms: self.clock.unix_timestamp_millis(),
        };

        if let Err(e) = self
            .cache
            .put(&key, &record, IMAGE_METADATA_NAMESPACE, ttl, PutOptions::new())
            .await
        {
            // The file is on disk; the next lookup backfills the record.
            warn!(url = url, error = %e, "Failed to record image metadata");
        }

        debug!(url = url, size = record.size_bytes, "Image cached");
        Some(path)
    }

    /// Warm the cache for one URL. Returns whether the image is now cached.
    pub async fn preload_image(&self, url: &str, ttl: Option<Duration>) -> bool {
        self.get_image(url, ttl).await.is_some()
    }

    /// Warm the cache for a batch of URLs, continuing past failures.
    ///
    /// Emits a progress event after every item; returns the success count.
    #[instrument(skip(self, urls))]
    pub async fn preload_images(&self, urls: &[String], ttl: Option<Duration>) -> usize {
        let total = urls.len() as u64;
        let mut completed = 0u64;
        let mut succeeded = 0usize;

        for url in urls {
            if self.preload_image(url, ttl).await {
                succeeded += 1;
            }
            completed += 1;
            self.emit_progress(completed, total);
        }

        debug!(
            total = total,
            succeeded = succeeded,
            "Image preload batch finished"
        );
        succeeded
    }

    /// Empty the disk blob cache and the image record namespace.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<()> {
        match self.fs.list_directory(&self.image_dir).await {
            Ok(entries) => {
                for entry in entries {
                    if let Err(e) = self.fs.delete_file(&entry).await {
                        warn!(path = ?entry, error = %e, "Failed to delete cached image");
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "Image directory missing or unreadable");
            }
        }

        self.cache.clear_namespace(IMAGE_METADATA_NAMESPACE).await
    }

    /// Look for the file behind a cache key without a metadata record.
    async fn probe_disk(&self, key: &str) -> Option<PathBuf> {
        let stem = file_stem(key);
        for extension in KNOWN_EXTENSIONS {
            let candidate = self.image_dir.join(format!("{}.{}", stem, extension));
            if self.fs.exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }

    /// Re-create the metadata record for a file found on disk.
    async fn backfill_record(&self, key: &str, url: &str, path: &PathBuf, ttl: Option<Duration>) {
        let size_bytes = self
            .fs
            .metadata(path)
            .await
            .map(|m| m.size)
            .unwrap_or_default();

        let record = ImageRecord {
            url: url.to_string(),
            file_path: path.to_string_lossy().into_owned(),
            size_bytes,
            downloaded_at_ms: self.clock.unix_timestamp_millis(),
        };

        if let Err(e) = self
            .cache
            .put(
                key,
                &record,
                IMAGE_METADATA_NAMESPACE,
                ttl,
                PutOptions::new().with_source("disk"),
            )
            .await
        {
            warn!(url = url, error = %e, "Failed to backfill image record");
        }
    }

    fn emit_progress(&self, completed: u64, total: u64) {
        if let Some(events) = &self.events {
            let percent = if total == 0 {
                0
            } else {
                ((completed as f64 / total as f64) * 100.0).round() as u8
            };
            events
                .emit(CacheEvent::Prefetch(PrefetchEvent::Progress {
                    content_id: PRELOAD_CONTENT_ID.to_string(),
                    completed_items: completed,
                    total_items: total,
                    percent,
                }))
                .ok();
        }
    }
}

/// File stem for a cache key: SHA-256 of the normalized key.
fn file_stem(key: &str) -> String {
    value::hash_payload(key)
}

/// Detect the file extension from image magic bytes. Defaults to jpg.
pub(crate) fn sniff_extension(data: &[u8]) -> &'static str {
    if data.len() < 12 {
        return "jpg";
    }

    match &data[0..4] {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, _] => "jpg",
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47] => "png",
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38] => "gif",
        // WEBP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46] if &data[8..12] == b"WEBP" => "webp",
        // BMP: 42 4D
        [0x42, 0x4D, _, _] => "bmp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_strips_query() {
        assert_eq!(
            ImageCacheManager::cache_key("https://cdn.example.com/covers/a.png?v=1"),
            "https://cdn.example.com/covers/a.png"
        );
        assert_eq!(
            ImageCacheManager::cache_key("https://cdn.example.com/covers/a.png?v=2"),
            "https://cdn.example.com/covers/a.png"
        );
        assert_eq!(
            ImageCacheManager::cache_key("https://cdn.example.com/covers/a.png#frag"),
            "https://cdn.example.com/covers/a.png"
        );
    }

    #[test]
    fn test_cache_key_passes_through_unparseable() {
        assert_eq!(ImageCacheManager::cache_key("not a url"), "not a url");
    }

    #[test]
    fn test_query_variants_share_one_stem() {
        let a = file_stem(&ImageCacheManager::cache_key("https://x/a.png?v=1"));
        let b = file_stem(&ImageCacheManager::cache_key("https://x/a.png?v=2"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_sniff_extension() {
        let mut png = vec![0x89, 0x50, 0x4E, 0x47];
        png.resize(16, 0);
        assert_eq!(sniff_extension(&png), "png");

        let mut jpg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpg.resize(16, 0);
        assert_eq!(sniff_extension(&jpg), "jpg");

        let mut webp = b"RIFF\x00\x00\x00\x00WEBP".to_vec();
        webp.resize(16, 0);
        assert_eq!(sniff_extension(&webp), "webp");

        assert_eq!(sniff_extension(b"??"), "jpg");
        assert_eq!(sniff_extension(&[0u8; 16]), "jpg");
    }
}
