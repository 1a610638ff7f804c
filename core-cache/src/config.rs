//! Cache configuration

use std::time::Duration;

/// Configuration for the cache service.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live applied when a caller does not pass one (default: 7 days)
    pub default_ttl: Duration,

    /// Size budget per managed namespace in bytes (default: 100MB)
    pub max_namespace_bytes: u64,

    /// Size budget for the thumbnail directory in bytes (default: 500MB)
    pub max_blob_cache_bytes: u64,

    /// Capacity of the in-process L1 cache in entries; 0 disables it (default: 256)
    pub memory_cache_entries: usize,

    /// Interval between maintenance sweeps (default: 15 minutes)
    pub maintenance_interval: Duration,

    /// Base directory for cached blobs (relative to the app cache dir)
    pub cache_directory: String,

    /// Subdirectory for cached images
    pub image_directory: String,

    /// Subdirectory for cached video thumbnails
    pub thumbnail_directory: String,

    /// Namespaces the maintenance sweep covers
    pub managed_namespaces: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            max_namespace_bytes: 100 * 1024 * 1024,
            max_blob_cache_bytes: 500 * 1024 * 1024,
            memory_cache_entries: 256,
            maintenance_interval: Duration::from_secs(15 * 60),
            cache_directory: "offline_cache".to_string(),
            image_directory: "images".to_string(),
            thumbnail_directory: "thumbnails".to_string(),
            managed_namespaces: vec![
                "books".to_string(),
                "articles".to_string(),
                "video_metadata".to_string(),
                "playlists".to_string(),
                "image_metadata".to_string(),
            ],
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default time-to-live.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the per-namespace size budget.
    pub fn with_max_namespace_bytes(mut self, bytes: u64) -> Self {
        self.max_namespace_bytes = bytes;
        self
    }

    /// Set the thumbnail directory size budget.
    pub fn with_max_blob_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_cache_bytes = bytes;
        self
    }

    /// Set the L1 capacity; 0 disables the memory tier.
    pub fn with_memory_cache_entries(mut self, entries: usize) -> Self {
        self.memory_cache_entries = entries;
        self
    }

    /// Set the maintenance sweep interval.
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Set the blob cache directory name.
    pub fn with_cache_directory(mut self, dir: impl Into<String>) -> Self {
        self.cache_directory = dir.into();
        self
    }

    /// Replace the set of namespaces the maintenance sweep covers.
    pub fn with_managed_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.managed_namespaces = namespaces;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl.is_zero() {
            return Err("default_ttl must be greater than zero".to_string());
        }

        if self.max_namespace_bytes == 0 {
            return Err("max_namespace_bytes must be greater than 0".to_string());
        }

        if self.max_blob_cache_bytes == 0 {
            return Err("max_blob_cache_bytes must be greater than 0".to_string());
        }

        if self.maintenance_interval.is_zero() {
            return Err("maintenance_interval must be greater than zero".to_string());
        }

        if self.cache_directory.is_empty() {
            return Err("cache_directory cannot be empty".to_string());
        }

        Ok(())
    }
}
