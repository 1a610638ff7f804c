//! Tests for the generic cache engine
//!
//! These tests drive the engine over the in-memory backend with a manual
//! clock, so TTL windows are exact rather than sleep-based.

use bridge_traits::kv::{KeyValueStore, MemoryKeyValueStore};
use bridge_traits::time::ManualClock;
use core_cache::{
    CacheManager, CacheMetadata, PinLevel, PinRegistry, PutOptions, METADATA_NAMESPACE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    title: String,
}

struct Fixture {
    store: Arc<MemoryKeyValueStore>,
    clock: Arc<ManualClock>,
    cache: CacheManager,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let cache = CacheManager::new(store.clone(), clock.clone());
    Fixture {
        store,
        clock,
        cache,
    }
}

fn foo_book() -> Book {
    Book {
        title: "Foo".to_string(),
    }
}

#[tokio::test]
async fn test_roundtrip_before_ttl() {
    let f = fixture();

    f.cache
        .put("book1", &foo_book(), "books", Some(HOUR), PutOptions::new())
        .await
        .unwrap();

    let back: Book = f.cache.get("book1", "books", true).await.unwrap();
    assert_eq!(back, foo_book());

    // Structured map payloads round-trip too
    let mut map = HashMap::new();
    map.insert("title".to_string(), "Foo".to_string());
    f.cache
        .put("map1", &map, "books", Some(HOUR), PutOptions::new())
        .await
        .unwrap();
    let back: HashMap<String, String> = f.cache.get("map1", "books", true).await.unwrap();
    assert_eq!(back, map);
}

#[tokio::test]
async fn test_expiry_is_metadata_driven() {
    let f = fixture();

    f.cache
        .put("book1", &foo_book(), "books", Some(HOUR), PutOptions::new())
        .await
        .unwrap();

    f.clock.advance_millis(2 * 60 * 60 * 1000);

    let miss: Option<Book> = f.cache.get("book1", "books", true).await;
    assert_eq!(miss, None);

    // The raw payload is still in the store: expiry is decided by metadata,
    // not by storage, and reads do not eagerly delete.
    assert!(f.store.contains("books", "book1").await.unwrap());
    assert!(f
        .store
        .contains(METADATA_NAMESPACE, "books:book1")
        .await
        .unwrap());

    // exists() reports the entry as dead though
    assert!(!f.cache.exists("book1", "books").await);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let f = fixture();

    f.cache
        .put("book1", &foo_book(), "books", None, PutOptions::new())
        .await
        .unwrap();
    f.cache.remove("book1", "books").await.unwrap();

    let miss: Option<Book> = f.cache.get("book1", "books", true).await;
    assert_eq!(miss, None);
    assert!(!f.store.contains("books", "book1").await.unwrap());
    assert!(!f
        .store
        .contains(METADATA_NAMESPACE, "books:book1")
        .await
        .unwrap());

    // Removing again, and removing something that never existed, both succeed
    f.cache.remove("book1", "books").await.unwrap();
    f.cache.remove("never", "books").await.unwrap();
}

#[tokio::test]
async fn test_access_stats_tracking() {
    let f = fixture();

    f.cache
        .put("book1", &foo_book(), "books", None, PutOptions::new())
        .await
        .unwrap();

    let _: Option<Book> = f.cache.get("book1", "books", true).await;
    let _: Option<Book> = f.cache.get("book1", "books", true).await;
    let meta = f.cache.metadata_for("book1", "books").await.unwrap();
    assert_eq!(meta.access_count, 2);

    // Stats-disabled reads leave the record untouched
    let _: Option<Book> = f.cache.get("book1", "books", false).await;
    let meta = f.cache.metadata_for("book1", "books").await.unwrap();
    assert_eq!(meta.access_count, 2);
}

#[tokio::test]
async fn test_last_access_refreshed_on_read() {
    let f = fixture();

    f.cache
        .put("book1", &foo_book(), "books", None, PutOptions::new())
        .await
        .unwrap();
    let created = f.cache.metadata_for("book1", "books").await.unwrap();

    f.clock.advance_millis(5_000);
    let _: Option<Book> = f.cache.get("book1", "books", true).await;

    let read = f.cache.metadata_for("book1", "books").await.unwrap();
    assert_eq!(read.last_access_ms, created.last_access_ms + 5_000);
}

#[tokio::test]
async fn test_payload_without_metadata_still_serves() {
    let f = fixture();

    // Simulates an entry written before metadata tracking existed
    f.store.put("books", "legacy", "plain text").await.unwrap();

    let value: Option<String> = f.cache.get("legacy", "books", true).await;
    assert_eq!(value, Some("plain text".to_string()));
    assert!(f.cache.exists("legacy", "books").await);

    // get_with_metadata synthesizes a record for it
    let entry = f
        .cache
        .get_with_metadata::<String>("legacy", "books", false)
        .await
        .unwrap();
    assert_eq!(entry.metadata.source, "unknown");
    assert_eq!(entry.metadata.ttl_ms, 0);
}

#[tokio::test]
async fn test_get_with_metadata_returns_record() {
    let f = fixture();

    f.cache
        .put(
            "book1",
            &foo_book(),
            "books",
            Some(HOUR),
            PutOptions::new().with_language("fa"),
        )
        .await
        .unwrap();

    let entry = f
        .cache
        .get_with_metadata::<Book>("book1", "books", true)
        .await
        .unwrap();
    assert_eq!(entry.data, foo_book());
    assert_eq!(entry.metadata.language.as_deref(), Some("fa"));
    assert_eq!(
        entry.metadata.direction,
        Some(core_cache::TextDirection::Rtl)
    );
}

#[tokio::test]
async fn test_clear_namespace_removes_payloads_and_metadata() {
    let f = fixture();

    for key in ["a", "b"] {
        f.cache
            .put(key, &foo_book(), "books", None, PutOptions::new())
            .await
            .unwrap();
    }
    f.cache
        .put("v", &foo_book(), "videos", None, PutOptions::new())
        .await
        .unwrap();

    f.cache.clear_namespace("books").await.unwrap();

    assert!(f.cache.all_keys("books").await.is_empty());
    assert!(f
        .store
        .list_keys(METADATA_NAMESPACE)
        .await
        .unwrap()
        .iter()
        .all(|k| !k.starts_with("books:")));

    // Other namespaces untouched
    let still: Option<Book> = f.cache.get("v", "videos", false).await;
    assert!(still.is_some());
}

#[tokio::test]
async fn test_clear_expired_entries() {
    let f = fixture();

    f.cache
        .put("old", &foo_book(), "books", Some(HOUR), PutOptions::new())
        .await
        .unwrap();
    f.clock.advance_millis(90 * 60 * 1000);
    f.cache
        .put("fresh", &foo_book(), "books", Some(HOUR), PutOptions::new())
        .await
        .unwrap();

    let outcome = f.cache.clear_expired_entries("books").await;
    assert_eq!(outcome.removed, 1);
    assert_eq!(outcome.failed, 0);

    assert!(!f.store.contains("books", "old").await.unwrap());
    assert!(f.store.contains("books", "fresh").await.unwrap());
}

#[tokio::test]
async fn test_expiry_sweep_skips_unparseable_records() {
    let f = fixture();

    f.cache
        .put("old", &foo_book(), "books", Some(HOUR), PutOptions::new())
        .await
        .unwrap();
    f.store
        .put(METADATA_NAMESPACE, "books:corrupt", "{not json")
        .await
        .unwrap();

    f.clock.advance_millis(2 * 60 * 60 * 1000);

    let outcome = f.cache.clear_expired_entries("books").await;
    assert_eq!(outcome.removed, 1);
    assert_eq!(outcome.failed, 1);
}

#[tokio::test]
async fn test_namespace_size_sums_metadata() {
    let f = fixture();

    f.cache
        .put("a", &"x".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();
    f.cache
        .put("b", &"y".repeat(50), "books", None, PutOptions::new())
        .await
        .unwrap();

    assert_eq!(f.cache.namespace_size("books").await, 150);
    assert_eq!(f.cache.namespace_size("empty").await, 0);
}

#[tokio::test]
async fn test_size_limit_noop_when_under_budget() {
    let f = fixture();

    f.cache
        .put("a", &"x".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();

    let outcome = f.cache.enforce_size_limit("books", 1_000, None).await;
    assert_eq!(outcome.removed, 0);
    assert_eq!(f.cache.namespace_size("books").await, 100);
}

#[tokio::test]
async fn test_size_limit_evicts_least_recently_accessed_first() {
    let f = fixture();

    // A last accessed at t0, B at t0+10s
    f.cache
        .put("a", &"x".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();
    f.clock.advance_millis(10_000);
    f.cache
        .put("b", &"y".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();

    // Budget forces exactly one eviction
    let outcome = f.cache.enforce_size_limit("books", 150, None).await;
    assert_eq!(outcome.removed, 1);

    assert!(!f.cache.exists("a", "books").await);
    assert!(f.cache.exists("b", "books").await);
    assert!(f.cache.namespace_size("books").await <= 150);
}

#[tokio::test]
async fn test_reading_an_entry_saves_it_from_eviction() {
    let f = fixture();

    f.cache
        .put("a", &"x".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();
    f.clock.advance_millis(10_000);
    f.cache
        .put("b", &"y".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();

    // Touch A so it becomes the most recently accessed
    f.clock.advance_millis(10_000);
    let _: Option<String> = f.cache.get("a", "books", true).await;

    f.cache.enforce_size_limit("books", 150, None).await;
    assert!(f.cache.exists("a", "books").await);
    assert!(!f.cache.exists("b", "books").await);
}

#[tokio::test]
async fn test_pinned_entry_survives_eviction() {
    let f = fixture();
    let pins = PinRegistry::new(f.store.clone(), f.clock.clone());
    pins.pin("a", PinLevel::High).await.unwrap();

    // A is oldest and would normally be the first eviction candidate
    f.cache
        .put("a", &"x".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();
    f.clock.advance_millis(10_000);
    f.cache
        .put("b", &"y".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();

    let outcome = f.cache.enforce_size_limit("books", 150, Some(&pins)).await;
    assert_eq!(outcome.removed, 1);

    assert!(f.cache.exists("a", "books").await);
    assert!(!f.cache.exists("b", "books").await);
    assert!(f.cache.namespace_size("books").await <= 150);
}

#[tokio::test]
async fn test_eviction_stops_when_only_pinned_remain() {
    let f = fixture();
    let pins = PinRegistry::new(f.store.clone(), f.clock.clone());
    pins.pin("a", PinLevel::High).await.unwrap();
    pins.pin("b", PinLevel::Medium).await.unwrap();

    f.cache
        .put("a", &"x".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();
    f.cache
        .put("b", &"y".repeat(100), "books", None, PutOptions::new())
        .await
        .unwrap();

    let outcome = f.cache.enforce_size_limit("books", 50, Some(&pins)).await;
    assert_eq!(outcome.removed, 0);
    assert!(f.cache.exists("a", "books").await);
    assert!(f.cache.exists("b", "books").await);
}

#[tokio::test]
async fn test_book_scenario() {
    let f = fixture();

    let mut book = HashMap::new();
    book.insert("title".to_string(), "Foo".to_string());

    f.cache
        .put("book1", &book, "books", Some(HOUR), PutOptions::new())
        .await
        .unwrap();

    let hit: Option<HashMap<String, String>> = f.cache.get("book1", "books", true).await;
    assert_eq!(hit, Some(book));

    f.clock.advance_millis(2 * 60 * 60 * 1000);
    let miss: Option<HashMap<String, String>> = f.cache.get("book1", "books", true).await;
    assert_eq!(miss, None);
}

#[tokio::test]
async fn test_metadata_hash_matches_payload() {
    let f = fixture();

    f.cache
        .put("book1", &foo_book(), "books", None, PutOptions::new())
        .await
        .unwrap();

    let raw = f.store.get("books", "book1").await.unwrap().unwrap();
    let meta_raw = f
        .store
        .get(METADATA_NAMESPACE, "books:book1")
        .await
        .unwrap()
        .unwrap();
    let meta: CacheMetadata = serde_json::from_str(&meta_raw).unwrap();

    assert_eq!(meta.size_bytes, raw.len() as u64);
    assert_eq!(
        meta.content_hash.as_deref(),
        Some(core_cache::value::hash_payload(&raw).as_str())
    );
}
