//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for blob file I/O (cached images, video
//! thumbnails) and the typed preferences store.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O operations to support different platforms:
/// - Desktop: Direct filesystem access
/// - iOS/Android: Sandboxed app directories
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn cache_blob(fs: &dyn FileSystemAccess, data: &[u8]) -> Result<()> {
///     let cache_dir = fs.get_cache_directory().await?;
///     let file_path = cache_dir.join("cover.jpg");
///     fs.write_file(&file_path, data.into()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's cache directory
    ///
    /// This directory is suitable for temporary files that can be deleted
    /// by the system when storage is low.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Get the application's data directory
    ///
    /// This directory is suitable for persistent application data.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory and all its contents
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Calculate total size of a directory recursively
    async fn directory_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let entries = self.list_directory(path).await?;

        for entry in entries {
            let metadata = self.metadata(&entry).await?;
            if metadata.is_directory {
                total += self.directory_size(&entry).await?;
            } else {
                total += metadata.size;
            }
        }

        Ok(total)
    }
}

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage used for small typed
/// values (reader settings, bookmarks, reading progress):
/// - iOS: UserDefaults
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite-backed key-value table
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("theme", "dark").await?;
///     store.set_bool("sync_on_wifi_only", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Store a floating-point value
    async fn set_f64(&self, key: &str, value: f64) -> Result<()>;

    /// Retrieve a floating-point value
    async fn get_f64(&self, key: &str) -> Result<Option<f64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;
}

/// In-memory settings store for tests and development
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: parking_lot::RwLock<std::collections::HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_raw(&self, key: &str, value: String) {
        self.values.write().insert(key.to_string(), value);
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_raw(key, value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_raw(key))
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_raw(key, value.to_string());
        Ok(())
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.get_raw(key).and_then(|s| s.parse().ok()))
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_raw(key, value.to_string());
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get_raw(key).and_then(|s| s.parse().ok()))
    }

    async fn set_f64(&self, key: &str, value: f64) -> Result<()> {
        self.set_raw(key, value.to_string());
        Ok(())
    }

    async fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.get_raw(key).and_then(|s| s.parse().ok()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.values.read().contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.values.read().keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        self.values.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_metadata() {
        let metadata = FileMetadata {
            size: 1024,
            created_at: Some(1234567890),
            modified_at: Some(1234567900),
            is_directory: false,
        };

        assert_eq!(metadata.size, 1024);
        assert!(!metadata.is_directory);
    }

    #[tokio::test]
    async fn test_memory_settings_typed_values() {
        let store = MemorySettingsStore::new();

        store.set_string("theme", "dark").await.unwrap();
        store.set_bool("wifi_only", true).await.unwrap();
        store.set_i64("font_size", 18).await.unwrap();
        store.set_f64("line_height", 1.4).await.unwrap();

        assert_eq!(
            store.get_string("theme").await.unwrap(),
            Some("dark".to_string())
        );
        assert_eq!(store.get_bool("wifi_only").await.unwrap(), Some(true));
        assert_eq!(store.get_i64("font_size").await.unwrap(), Some(18));
        assert_eq!(store.get_f64("line_height").await.unwrap(), Some(1.4));
    }

    #[tokio::test]
    async fn test_memory_settings_delete_and_clear() {
        let store = MemorySettingsStore::new();

        store.set_string("a", "1").await.unwrap();
        store.set_string("b", "2").await.unwrap();
        assert!(store.has_key("a").await.unwrap());

        store.delete("a").await.unwrap();
        assert!(!store.has_key("a").await.unwrap());

        store.clear_all().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }
}
