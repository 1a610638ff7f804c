//! # Offline Cache Core
//!
//! Multi-tier cache layer for the reading platform: a generic namespaced
//! key-value cache with TTL expiry, access tracking, and pin-aware LRU
//! eviction, plus specialized managers for images, video content, and
//! preferences.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │     CacheService                          │
//! │  - put_value() / get_value()              │
//! │  - pin_item() / unpin_item()              │
//! │  - prefetch_book()                        │
//! │  - cache_size_stats()                     │
//! └──────┬────────────┬───────────┬───────────┘
//!        │            │           │
//!        │   ImageCacheManager    │
//!        │   VideoCacheManager    PreferencesCacheManager
//!        │            │                │
//!        └──> CacheManager (L1 LruCache / L2 KeyValueStore)
//!                      │
//!                      └──> FileSystemAccess (blobs) / HttpClient (fetches)
//! ```
//!
//! ## Key behaviors
//!
//! - Payloads and metadata are separate records, created and deleted
//!   together; a payload without metadata still serves (compat path).
//! - Expiry is metadata-driven: an expired entry reads as a miss while its
//!   records stay put for the maintenance sweep.
//! - Size eviction is least-recently-accessed-first and skips pinned items.
//! - Cache failures never surface to callers on read paths; they degrade to
//!   a miss so the app falls back to fetching fresh.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_cache::{CacheConfig, CacheService};
//!
//! # async fn example(service: &CacheService) -> core_cache::Result<()> {
//! service.initialize().await?;
//!
//! service
//!     .put_value("book1", &book, "books", None, Default::default())
//!     .await?;
//!
//! if let Some(cover) = service.images().get_image(&book.cover_url, None).await {
//!     println!("cover cached at {:?}", cover);
//! }
//!
//! let stats = service.cache_size_stats().await;
//! println!("cache size: {} bytes", stats.total_bytes());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod manager;
pub mod metadata;
pub mod prefs;
pub mod priority;
pub mod service;
pub mod stats;
pub mod value;
pub mod video;

// Re-export commonly used types
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use image::{ImageCacheManager, ImageRecord, IMAGE_METADATA_NAMESPACE};
pub use manager::{CacheManager, PutOptions};
pub use metadata::{CacheEntry, CacheMetadata, TextDirection, DEFAULT_TTL_MS, METADATA_NAMESPACE};
pub use prefs::{PreferencesCacheManager, PREFERENCES_NAMESPACE};
pub use priority::{PinLevel, PinRecord, PinRegistry, PIN_NAMESPACE};
pub use service::CacheService;
pub use stats::{CacheSizeStats, DownloadProgress, DownloadStatus, SweepOutcome};
pub use video::{ThumbnailRecord, VideoCacheManager, PLAYLIST_NAMESPACE, VIDEO_METADATA_NAMESPACE};
