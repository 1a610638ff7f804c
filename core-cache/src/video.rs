//! # Video/Playlist Cache Manager
//!
//! Structured video and playlist records flow through the generic engine in
//! dedicated namespaces; thumbnail blobs live on disk with their pointer
//! records keyed `thumbnail:<video_id>`.
//!
//! Expiry runs three independent sweeps that must all happen: the video
//! record namespace, the playlist namespace, and the thumbnail directory
//! itself (by file modification time). The size budget applies to the
//! directory only, oldest-modified files first.

use crate::image::{sniff_extension, KNOWN_EXTENSIONS};
use crate::manager::{CacheManager, PutOptions};
use crate::metadata::DEFAULT_TTL_MS;
use crate::stats::SweepOutcome;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Namespace holding video records and thumbnail pointer records.
pub const VIDEO_METADATA_NAMESPACE: &str = "video_metadata";

/// Namespace holding playlist records.
pub const PLAYLIST_NAMESPACE: &str = "playlists";

/// Key prefix for thumbnail pointer records.
const THUMBNAIL_KEY_PREFIX: &str = "thumbnail:";

/// Pointer record for one cached thumbnail file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    /// Video the thumbnail belongs to.
    pub video_id: String,
    /// URL the thumbnail was fetched from.
    pub original_url: String,
    /// Absolute path of the cached file.
    pub local_path: String,
    /// File extension the payload was stored with.
    pub extension: String,
    /// Download timestamp, Unix milliseconds.
    pub cached_at_ms: i64,
}

/// Cache for video records, playlists, and thumbnail files.
pub struct VideoCacheManager {
    cache: Arc<CacheManager>,
    fs: Arc<dyn FileSystemAccess>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    thumbnail_dir: PathBuf,
    ttl: Duration,
    max_thumbnail_bytes: u64,
}

impl VideoCacheManager {
    pub fn new(
        cache: Arc<CacheManager>,
        fs: Arc<dyn FileSystemAccess>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        thumbnail_dir: PathBuf,
    ) -> Self {
        Self {
            cache,
            fs,
            http,
            clock,
            thumbnail_dir,
            ttl: Duration::from_millis(DEFAULT_TTL_MS as u64),
            max_thumbnail_bytes: 500 * 1024 * 1024,
        }
    }

    /// Override the fixed TTL applied to video and playlist records.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the thumbnail directory size budget.
    pub fn with_max_thumbnail_bytes(mut self, bytes: u64) -> Self {
        self.max_thumbnail_bytes = bytes;
        self
    }

    /// Directory holding the cached thumbnail files.
    pub fn thumbnail_dir(&self) -> &PathBuf {
        &self.thumbnail_dir
    }

    /// Store a video record.
    pub async fn cache_video_metadata<T: Serialize>(
        &self,
        video_id: &str,
        metadata: &T,
    ) -> crate::error::Result<()> {
        self.cache
            .put(
                video_id,
                metadata,
                VIDEO_METADATA_NAMESPACE,
                Some(self.ttl),
                PutOptions::new(),
            )
            .await
    }

    /// Retrieve a video record.
    pub async fn get_video_metadata<T: DeserializeOwned>(&self, video_id: &str) -> Option<T> {
        self.cache
            .get(video_id, VIDEO_METADATA_NAMESPACE, true)
            .await
    }

    /// Store a playlist record.
    pub async fn cache_playlist<T: Serialize>(
        &self,
        playlist_id: &str,
        playlist: &T,
    ) -> crate::error::Result<()> {
        self.cache
            .put(
                playlist_id,
                playlist,
                PLAYLIST_NAMESPACE,
                Some(self.ttl),
                PutOptions::new(),
            )
            .await
    }

    /// Retrieve a playlist record.
    pub async fn get_playlist<T: DeserializeOwned>(&self, playlist_id: &str) -> Option<T> {
        self.cache.get(playlist_id, PLAYLIST_NAMESPACE, true).await
    }

    /// Download a video thumbnail, once per video id.
    ///
    /// When a pointer record exists and its file is still on disk, the call
    /// returns that file without touching the network. Returns `None` on
    /// fetch failure; never an error.
    #[instrument(skip(self))]
    pub async fn cache_video_thumbnail(&self, video_id: &str, url: &str) -> Option<PathBuf> {
        let key = thumbnail_key(video_id);

        if let Some(record) = self
            .cache
            .get::<ThumbnailRecord>(&key, VIDEO_METADATA_NAMESPACE, false)
            .await
        {
            let path = PathBuf::from(&record.local_path);
            if self.fs.exists(&path).await.unwrap_or(false) {
                debug!(video_id = video_id, "Thumbnail already cached");
                return Some(path);
            }
        }

        let response = match self.http.execute(HttpRequest::get(url)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(video_id = video_id, url = url, error = %e, "Thumbnail download failed");
                return None;
            }
        };

        if !response.is_success() {
            warn!(
                video_id = video_id,
                url = url,
                status = response.status,
                "Thumbnail download rejected"
            );
            return None;
        }

        let extension = sniff_extension(&response.body);
        let path = self.thumbnail_dir.join(format!("{}.{}", video_id, extension));

        if let Err(e) = self.fs.write_file(&path, response.body.clone()).await {
            warn!(video_id = video_id, error = %e, "Failed to write thumbnail");
            return None;
        }

        let record = ThumbnailRecord {
            video_id: video_id.to_string(),
            original_url: url.to_string(),
            local_path: path.to_string_lossy().into_owned(),
            extension: extension.to_string(),
            cached_at_ms: self.clock.unix_timestamp_millis(),
        };

        if let Err(e) = self
            .cache
            .put(
                &key,
                &record,
                VIDEO_METADATA_NAMESPACE,
                Some(self.ttl),
                PutOptions::new(),
            )
            .await
        {
            warn!(video_id = video_id, error = %e, "Failed to record thumbnail metadata");
        }

        debug!(video_id = video_id, size = response.body.len(), "Thumbnail cached");
        Some(path)
    }

    /// Resolve the path of a cached thumbnail.
    ///
    /// Metadata-first: a pointer record whose file has vanished is deleted
    /// and the lookup falls back to probing the directory across known
    /// extensions before giving up.
    #[instrument(skip(self))]
    pub async fn get_video_thumbnail_path(&self, video_id: &str) -> Option<PathBuf> {
        let key = thumbnail_key(video_id);

        if let Some(record) = self
            .cache
            .get::<ThumbnailRecord>(&key, VIDEO_METADATA_NAMESPACE, true)
            .await
        {
            let path = PathBuf::from(&record.local_path);
            if self.fs.exists(&path).await.unwrap_or(false) {
                return Some(path);
            }

            debug!(video_id = video_id, "Thumbnail record stale, healing");
            if let Err(e) = self.cache.remove(&key, VIDEO_METADATA_NAMESPACE).await {
                warn!(video_id = video_id, error = %e, "Failed to remove stale thumbnail record");
            }
        }

        for extension in KNOWN_EXTENSIONS {
            let candidate = self.thumbnail_dir.join(format!("{}.{}", video_id, extension));
            if self.fs.exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }

        None
    }

    /// Run all three expiry sweeps: video records, playlists, and the
    /// thumbnail directory by file age.
    #[instrument(skip(self))]
    pub async fn clear_expired_entries(&self) -> SweepOutcome {
        let mut outcome = self
            .cache
            .clear_expired_entries(VIDEO_METADATA_NAMESPACE)
            .await;
        outcome.merge(self.cache.clear_expired_entries(PLAYLIST_NAMESPACE).await);
        outcome.merge(self.sweep_thumbnail_files().await);
        outcome
    }

    /// Delete thumbnail files older than the TTL by modification time.
    pub async fn sweep_thumbnail_files(&self) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let cutoff_secs = self.clock.unix_timestamp() - self.ttl.as_secs() as i64;

        let entries = match self.fs.list_directory(&self.thumbnail_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "Thumbnail directory missing or unreadable");
                return outcome;
            }
        };

        for entry in entries {
            let metadata = match self.fs.metadata(&entry).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = ?entry, error = %e, "Failed to stat thumbnail");
                    outcome.failed += 1;
                    continue;
                }
            };

            if metadata.is_directory {
                continue;
            }

            let stale = metadata
                .modified_at
                .map(|modified| modified < cutoff_secs)
                .unwrap_or(false);
            if !stale {
                continue;
            }

            match self.fs.delete_file(&entry).await {
                Ok(()) => outcome.removed += 1,
                Err(e) => {
                    warn!(path = ?entry, error = %e, "Failed to delete stale thumbnail");
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            removed = outcome.removed,
            failed = outcome.failed,
            "Thumbnail age sweep finished"
        );
        outcome
    }

    /// Delete oldest-modified thumbnails until the directory fits its budget.
    #[instrument(skip(self))]
    pub async fn enforce_size_limit(&self) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        let entries = match self.fs.list_directory(&self.thumbnail_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "Thumbnail directory missing or unreadable");
                return outcome;
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            match self.fs.metadata(&entry).await {
                Ok(metadata) if !metadata.is_directory => {
                    files.push((entry, metadata.size, metadata.modified_at.unwrap_or(0)));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = ?entry, error = %e, "Failed to stat thumbnail");
                    outcome.failed += 1;
                }
            }
        }

        let mut total: u64 = files.iter().map(|(_, size, _)| size).sum();
        if total <= self.max_thumbnail_bytes {
            return outcome;
        }

        // Oldest first
        files.sort_by_key(|(_, _, modified)| *modified);

        for (path, size, _) in files {
            if total <= self.max_thumbnail_bytes {
                break;
            }

            match self.fs.delete_file(&path).await {
                Ok(()) => {
                    total = total.saturating_sub(size);
                    outcome.removed += 1;
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to evict thumbnail");
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            evicted = outcome.removed,
            failed = outcome.failed,
            remaining_bytes = total,
            "Thumbnail size enforcement finished"
        );
        outcome
    }
}

fn thumbnail_key(video_id: &str) -> String {
    format!("{}{}", THUMBNAIL_KEY_PREFIX, video_id)
}
