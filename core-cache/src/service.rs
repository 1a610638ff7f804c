//! # Cache Facade
//!
//! [`CacheService`] is the single entry point the host application talks to.
//! It composes the generic engine with the specialized managers, owns the pin
//! registry and the prefetch job table, and runs the periodic maintenance
//! sweep as an explicitly owned background task: started by `initialize()`,
//! cancelled by `dispose()`, no ambient global state.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::image::ImageCacheManager;
use crate::manager::{CacheManager, PutOptions};
use crate::metadata::CacheEntry;
use crate::prefs::PreferencesCacheManager;
use crate::priority::{PinLevel, PinRegistry};
use crate::stats::{CacheSizeStats, DownloadProgress, DownloadStatus};
use crate::video::VideoCacheManager;
use bridge_traits::http::HttpClient;
use bridge_traits::kv::KeyValueStore;
use bridge_traits::storage::{FileSystemAccess, SettingsStore};
use bridge_traits::time::Clock;
use core_runtime::events::{CacheEvent, EntryEvent, EventBus, MaintenanceEvent, PrefetchEvent};
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to the running maintenance task.
struct MaintenanceTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Facade over the whole cache subsystem.
pub struct CacheService {
    config: CacheConfig,
    cache: Arc<CacheManager>,
    images: Arc<ImageCacheManager>,
    videos: Arc<VideoCacheManager>,
    preferences: Arc<PreferencesCacheManager>,
    pins: Arc<PinRegistry>,
    events: Arc<EventBus>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    image_dir: PathBuf,
    thumbnail_dir: PathBuf,
    maintenance: Mutex<Option<MaintenanceTask>>,
    prefetches: RwLock<HashMap<String, DownloadProgress>>,
}

impl CacheService {
    /// Build the service from bridge handles.
    ///
    /// Resolves cache directories through the filesystem bridge; call
    /// [`initialize`](Self::initialize) afterwards to create them, load pins,
    /// and start the maintenance task.
    pub async fn new(
        config: CacheConfig,
        store: Arc<dyn KeyValueStore>,
        settings: Arc<dyn SettingsStore>,
        fs: Arc<dyn FileSystemAccess>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let base = fs
            .get_cache_directory()
            .await?
            .join(&config.cache_directory);
        let image_dir = base.join(&config.image_directory);
        let thumbnail_dir = base.join(&config.thumbnail_directory);

        let events = Arc::new(EventBus::default());

        let cache = Arc::new(
            CacheManager::new(store.clone(), clock.clone())
                .with_memory_cache(config.memory_cache_entries)
                .with_default_ttl(config.default_ttl),
        );

        let images = Arc::new(
            ImageCacheManager::new(
                cache.clone(),
                fs.clone(),
                http.clone(),
                clock.clone(),
                image_dir.clone(),
            )
            .with_event_bus(events.clone()),
        );

        let videos = Arc::new(
            VideoCacheManager::new(
                cache.clone(),
                fs.clone(),
                http.clone(),
                clock.clone(),
                thumbnail_dir.clone(),
            )
            .with_ttl(config.default_ttl)
            .with_max_thumbnail_bytes(config.max_blob_cache_bytes),
        );

        let preferences = Arc::new(PreferencesCacheManager::new(settings, clock.clone()));
        let pins = Arc::new(PinRegistry::new(store, clock.clone()));

        Ok(Self {
            config,
            cache,
            images,
            videos,
            preferences,
            pins,
            events,
            fs,
            clock,
            image_dir,
            thumbnail_dir,
            maintenance: Mutex::new(None),
            prefetches: RwLock::new(HashMap::new()),
        })
    }

    /// Create directories, load pins, and start the maintenance task.
    ///
    /// Calling it again while the task is running is a no-op.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.config
            .validate()
            .map_err(CacheError::InvalidConfig)?;

        self.fs.create_dir_all(&self.image_dir).await?;
        self.fs.create_dir_all(&self.thumbnail_dir).await?;

        let pin_count = self.pins.load().await?;
        debug!(pins = pin_count, "Pin registry loaded");

        let mut guard = self.maintenance.lock();
        if guard.is_some() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let cache = self.cache.clone();
        let videos = self.videos.clone();
        let pins = self.pins.clone();
        let events = self.events.clone();
        let namespaces = self.config.managed_namespaces.clone();
        let max_namespace_bytes = self.config.max_namespace_bytes;
        let period = self.config.maintenance_interval;

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        maintenance_pass(
                            &cache,
                            &videos,
                            &pins,
                            &events,
                            &namespaces,
                            max_namespace_bytes,
                        )
                        .await;
                    }
                }
            }
        });

        *guard = Some(MaintenanceTask { cancel, handle });
        info!("Cache service initialized");
        Ok(())
    }

    /// Stop the maintenance task. Safe to call repeatedly.
    pub async fn dispose(&self) {
        let task = self.maintenance.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
            debug!("Maintenance task stopped");
        }
    }

    /// Whether the maintenance task is currently running.
    pub fn is_running(&self) -> bool {
        self.maintenance.lock().is_some()
    }

    /// Run one maintenance pass immediately.
    ///
    /// Returns `(expired_removed, evicted)` totals across namespaces.
    pub async fn run_maintenance(&self) -> (u64, u64) {
        maintenance_pass(
            &self.cache,
            &self.videos,
            &self.pins,
            &self.events,
            &self.config.managed_namespaces,
            self.config.max_namespace_bytes,
        )
        .await
    }

    // ========================================================================
    // Generic cache access
    // ========================================================================

    /// Store an app data value (books, articles, ...).
    pub async fn put_value<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        namespace: &str,
        ttl: Option<Duration>,
        options: PutOptions,
    ) -> Result<()> {
        self.cache.put(key, value, namespace, ttl, options).await
    }

    /// Retrieve an app data value, recording the access.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str, namespace: &str) -> Option<T> {
        let value = self.cache.get(key, namespace, true).await;
        if value.is_some() && self.pins.is_pinned(key) {
            self.pins.record_access(key).await;
        }
        value
    }

    /// Retrieve an app data value together with its metadata record.
    pub async fn get_value_with_metadata<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: &str,
    ) -> Option<CacheEntry<T>> {
        self.cache.get_with_metadata(key, namespace, true).await
    }

    /// Remove one entry.
    pub async fn remove_value(&self, key: &str, namespace: &str) -> Result<()> {
        self.cache.remove(key, namespace).await
    }

    /// Whether a live entry exists.
    pub async fn contains(&self, key: &str, namespace: &str) -> bool {
        self.cache.exists(key, namespace).await
    }

    /// Drop an entire namespace.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<()> {
        self.cache.clear_namespace(namespace).await
    }

    // ========================================================================
    // Pinning
    // ========================================================================

    /// Pin an item so eviction sweeps leave it alone.
    pub async fn pin_item(&self, item_id: &str, level: PinLevel) -> Result<()> {
        self.pins.pin(item_id, level).await?;
        self.events
            .emit(CacheEvent::Entry(EntryEvent::Pinned {
                item_id: item_id.to_string(),
            }))
            .ok();
        Ok(())
    }

    /// Remove an item's pin. Returns whether a pin existed.
    pub async fn unpin_item(&self, item_id: &str) -> Result<bool> {
        let existed = self.pins.unpin(item_id).await?;
        if existed {
            self.events
                .emit(CacheEvent::Entry(EntryEvent::Unpinned {
                    item_id: item_id.to_string(),
                }))
                .ok();
        }
        Ok(existed)
    }

    /// Whether an item is pinned.
    pub fn is_item_pinned(&self, item_id: &str) -> bool {
        self.pins.is_pinned(item_id)
    }

    /// The pin level of an item, if pinned.
    pub fn item_pin_level(&self, item_id: &str) -> Option<PinLevel> {
        self.pins.level(item_id)
    }

    // ========================================================================
    // Prefetch
    // ========================================================================

    /// Prefetch a book's images for offline use.
    ///
    /// One job per book id; a second call while a job is in flight returns
    /// the current progress without starting another. Progress is observable
    /// through [`subscribe`](Self::subscribe) and
    /// [`prefetch_progress`](Self::prefetch_progress). Entries fetched here
    /// are ordinary cache entries with the ordinary lifecycle.
    #[instrument(skip(self, image_urls))]
    pub async fn prefetch_book(&self, book_id: &str, image_urls: &[String]) -> DownloadProgress {
        let now = self.clock.unix_timestamp_millis();
        let total = image_urls.len() as u64;

        {
            let mut jobs = self.prefetches.write();
            if let Some(existing) = jobs.get(book_id) {
                if !existing.status.is_terminal() {
                    debug!(book_id = book_id, "Prefetch already in flight");
                    return existing.clone();
                }
            }
            jobs.insert(
                book_id.to_string(),
                DownloadProgress::new(book_id, total, now),
            );
        }

        self.events
            .emit(CacheEvent::Prefetch(PrefetchEvent::Started {
                content_id: book_id.to_string(),
                total_items: total,
            }))
            .ok();
        self.update_job(book_id, |job, now| job.mark_in_progress(now));

        let mut succeeded = 0u64;
        let mut failed = 0u64;

        for url in image_urls {
            if self.job_canceled(book_id) {
                break;
            }

            if self.images.preload_image(url, None).await {
                succeeded += 1;
            } else {
                failed += 1;
            }

            if let Some(progress) = self.update_job(book_id, |job, now| job.advance(now)) {
                self.events
                    .emit(CacheEvent::Prefetch(PrefetchEvent::Progress {
                        content_id: book_id.to_string(),
                        completed_items: progress.completed_items,
                        total_items: progress.total_items,
                        percent: progress.percent(),
                    }))
                    .ok();
            }
        }

        let final_progress = self
            .update_job(book_id, |job, now| job.mark_completed(now))
            .unwrap_or_else(|| DownloadProgress::new(book_id, total, now));

        match final_progress.status {
            DownloadStatus::Canceled => {
                self.events
                    .emit(CacheEvent::Prefetch(PrefetchEvent::Canceled {
                        content_id: book_id.to_string(),
                        completed_items: final_progress.completed_items,
                    }))
                    .ok();
            }
            _ => {
                self.events
                    .emit(CacheEvent::Prefetch(PrefetchEvent::Completed {
                        content_id: book_id.to_string(),
                        succeeded,
                        failed,
                    }))
                    .ok();
            }
        }

        final_progress
    }

    /// Current progress of a prefetch job.
    pub fn prefetch_progress(&self, book_id: &str) -> Option<DownloadProgress> {
        self.prefetches.read().get(book_id).cloned()
    }

    /// Cancel an in-flight prefetch. Returns whether a job was canceled.
    pub fn cancel_prefetch(&self, book_id: &str) -> bool {
        let now = self.clock.unix_timestamp_millis();
        let mut jobs = self.prefetches.write();
        match jobs.get_mut(book_id) {
            Some(job) if !job.status.is_terminal() => {
                job.mark_canceled(now);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Statistics & composition
    // ========================================================================

    /// Aggregate size statistics for the cache management UI.
    pub async fn cache_size_stats(&self) -> CacheSizeStats {
        let mut stats = CacheSizeStats {
            calculated_at_ms: self.clock.unix_timestamp_millis(),
            ..Default::default()
        };

        for namespace in &self.config.managed_namespaces {
            stats
                .namespaces
                .insert(namespace.clone(), self.cache.namespace_size(namespace).await);
        }
        stats.namespaces.insert(
            crate::prefs::PREFERENCES_NAMESPACE.to_string(),
            self.preferences.preferences_size().await,
        );

        let mut blob_bytes = 0u64;
        for dir in [&self.image_dir, &self.thumbnail_dir] {
            blob_bytes += self.fs.directory_size(dir).await.unwrap_or(0);
        }
        stats.blob_bytes = blob_bytes;

        stats
    }

    /// Subscribe to cache events (prefetch progress, sweeps, pins).
    pub fn subscribe(&self) -> core_runtime::events::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// The image cache manager.
    pub fn images(&self) -> &ImageCacheManager {
        &self.images
    }

    /// The video/playlist cache manager.
    pub fn videos(&self) -> &VideoCacheManager {
        &self.videos
    }

    /// The preferences manager.
    pub fn preferences(&self) -> &PreferencesCacheManager {
        &self.preferences
    }

    /// The service configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn update_job(
        &self,
        book_id: &str,
        apply: impl FnOnce(&mut DownloadProgress, i64),
    ) -> Option<DownloadProgress> {
        let now = self.clock.unix_timestamp_millis();
        let mut jobs = self.prefetches.write();
        jobs.get_mut(book_id).map(|job| {
            apply(job, now);
            job.clone()
        })
    }

    fn job_canceled(&self, book_id: &str) -> bool {
        self.prefetches
            .read()
            .get(book_id)
            .map(|job| job.status == DownloadStatus::Canceled)
            .unwrap_or(false)
    }
}

/// One full maintenance pass: expiry then pin-aware size enforcement for
/// every managed namespace, plus the thumbnail file sweeps.
///
/// Processes one entry at a time and is idempotent, so interrupting it
/// mid-pass is safe; the next pass picks up whatever is left.
async fn maintenance_pass(
    cache: &CacheManager,
    videos: &VideoCacheManager,
    pins: &PinRegistry,
    events: &EventBus,
    namespaces: &[String],
    max_namespace_bytes: u64,
) -> (u64, u64) {
    let started = std::time::Instant::now();
    let mut expired_total = 0u64;
    let mut evicted_total = 0u64;

    for namespace in namespaces {
        let expired = cache.clear_expired_entries(namespace).await;
        expired_total += expired.removed;
        events
            .emit(CacheEvent::Maintenance(MaintenanceEvent::ExpiredCleared {
                namespace: namespace.clone(),
                removed: expired.removed,
                failed: expired.failed,
            }))
            .ok();

        let evicted = cache
            .enforce_size_limit(namespace, max_namespace_bytes, Some(pins))
            .await;
        evicted_total += evicted.removed;
        events
            .emit(CacheEvent::Maintenance(MaintenanceEvent::SizeEnforced {
                namespace: namespace.clone(),
                evicted: evicted.removed,
                failed: evicted.failed,
            }))
            .ok();
    }

    // Thumbnail files carry no metadata records; sweep them by age and size.
    expired_total += videos.sweep_thumbnail_files().await.removed;
    evicted_total += videos.enforce_size_limit().await.removed;

    let duration_ms = started.elapsed().as_millis() as u64;
    events
        .emit(CacheEvent::Maintenance(MaintenanceEvent::Completed {
            expired_removed: expired_total,
            evicted: evicted_total,
            duration_ms,
        }))
        .ok();

    debug!(
        expired = expired_total,
        evicted = evicted_total,
        duration_ms = duration_ms,
        "Maintenance pass finished"
    );

    (expired_total, evicted_total)
}
