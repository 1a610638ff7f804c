//! Namespaced Key-Value Storage Abstraction
//!
//! Provides a platform-agnostic trait for the persistent key-value backend
//! that the cache core stores payloads and metadata records in:
//! - Desktop: SQLite via sqlx (`bridge-desktop`)
//! - Mobile: platform database adapters
//!
//! ## Design Philosophy
//!
//! A namespace is a logical partition of the store holding one category of
//! payloads (e.g. "books", "image_metadata"). The trait deliberately exposes
//! only plain string values: the core serializes everything to a JSON
//! envelope before it reaches the backend, so backends never need to know
//! about payload shapes.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Namespaced persistent key-value store trait
///
/// All operations are scoped to a namespace. Implementations must treat
/// (`namespace`, `key`) as the unit of identity and must make `delete`
/// idempotent: deleting an absent key is a successful no-op.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::kv::KeyValueStore;
///
/// async fn store_record(store: &dyn KeyValueStore) -> Result<()> {
///     store.put("books", "book-1", r#"{"title":"Dune"}"#).await?;
///     let raw = store.get("books", "book-1").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve the value stored under a key, or `None` if absent
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Store a value under a key, replacing any existing value
    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Delete a key
    ///
    /// Deleting a key that does not exist is not an error.
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    /// Check whether a key exists without retrieving it
    async fn contains(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    /// List all keys in a namespace
    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>>;

    /// Delete every key in a namespace
    async fn clear_namespace(&self, namespace: &str) -> Result<()>;
}

/// In-memory key-value store for tests and development
///
/// Backed by a plain `HashMap` behind a lock. Contents do not survive the
/// process; use `bridge-desktop`'s SQLite implementation for persistence.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    namespaces: parking_lot::RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored in a namespace
    pub fn namespace_len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        if let Some(ns) = self.namespaces.write().get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn contains(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.contains_key(key))
            .unwrap_or(false))
    }

    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryKeyValueStore::new();

        store.put("books", "book-1", "value").await.unwrap();
        assert_eq!(
            store.get("books", "book-1").await.unwrap(),
            Some("value".to_string())
        );
        assert!(store.contains("books", "book-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryKeyValueStore::new();

        store.put("books", "id", "a").await.unwrap();
        store.put("videos", "id", "b").await.unwrap();

        assert_eq!(store.get("books", "id").await.unwrap(), Some("a".into()));
        assert_eq!(store.get("videos", "id").await.unwrap(), Some("b".into()));

        store.clear_namespace("books").await.unwrap();
        assert_eq!(store.get("books", "id").await.unwrap(), None);
        assert_eq!(store.get("videos", "id").await.unwrap(), Some("b".into()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryKeyValueStore::new();

        store.put("books", "id", "a").await.unwrap();
        store.delete("books", "id").await.unwrap();
        store.delete("books", "id").await.unwrap();
        store.delete("books", "never-existed").await.unwrap();

        assert_eq!(store.get("books", "id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_keys() {
        let store = MemoryKeyValueStore::new();

        store.put("books", "k1", "a").await.unwrap();
        store.put("books", "k2", "b").await.unwrap();

        let mut keys = store.list_keys("books").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["k1", "k2"]);
        assert!(store.list_keys("empty").await.unwrap().is_empty());
    }
}
