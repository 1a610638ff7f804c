//! Tests for the image and video cache managers
//!
//! Network fetches are mocked; files go through the real Tokio filesystem
//! adapter under a scratch directory.

use bridge_desktop::TokioFileSystem;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::kv::MemoryKeyValueStore;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::ManualClock;
use bytes::Bytes;
use core_cache::{CacheManager, ImageCacheManager, VideoCacheManager};
use mockall::mock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Http {}

    #[async_trait::async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
    }
}

fn png_bytes() -> Bytes {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.resize(64, 0xAB);
    Bytes::from(data)
}

fn ok_response() -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: png_bytes(),
    }
}

fn scratch_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rpc-media-{}-{}", label, uuid::Uuid::new_v4()))
}

struct Fixture {
    clock: Arc<ManualClock>,
    fs: Arc<TokioFileSystem>,
    cache: Arc<CacheManager>,
    root: PathBuf,
}

fn fixture(label: &str) -> Fixture {
    let root = scratch_dir(label);
    let clock = Arc::new(ManualClock::at_system_time());
    let fs = Arc::new(TokioFileSystem::with_directories(root.clone(), root.clone()));
    let cache = Arc::new(CacheManager::new(
        Arc::new(MemoryKeyValueStore::new()),
        clock.clone(),
    ));
    Fixture {
        clock,
        fs,
        cache,
        root,
    }
}

fn image_manager(f: &Fixture, http: MockHttp) -> ImageCacheManager {
    ImageCacheManager::new(
        f.cache.clone(),
        f.fs.clone(),
        Arc::new(http),
        f.clock.clone(),
        f.root.join("images"),
    )
}

fn video_manager(f: &Fixture, http: MockHttp) -> VideoCacheManager {
    VideoCacheManager::new(
        f.cache.clone(),
        f.fs.clone(),
        Arc::new(http),
        f.clock.clone(),
        f.root.join("thumbnails"),
    )
}

async fn cleanup(f: &Fixture) {
    let _ = f.fs.delete_dir_all(&f.root).await;
}

// ============================================================================
// Image cache
// ============================================================================

#[tokio::test]
async fn test_query_variants_resolve_to_one_entry() {
    let f = fixture("img-norm");
    let mut http = MockHttp::new();
    // The whole point: exactly one network fetch for both URL variants
    http.expect_execute().times(1).returning(|_| Ok(ok_response()));
    let images = image_manager(&f, http);

    let first = images
        .get_image("https://x/a.png?v=1", None)
        .await
        .expect("first fetch caches");
    let second = images
        .get_image("https://x/a.png?v=2", None)
        .await
        .expect("second call is a hit");

    assert_eq!(first, second);
    assert!(f.fs.exists(&first).await.unwrap());

    cleanup(&f).await;
}

#[tokio::test]
async fn test_download_failure_returns_none() {
    let f = fixture("img-fail");
    let mut http = MockHttp::new();
    http.expect_execute()
        .returning(|_| Err(BridgeError::OperationFailed("offline".to_string())));
    let images = image_manager(&f, http);

    assert!(images.get_image("https://x/a.png", None).await.is_none());
    assert!(!images.preload_image("https://x/a.png", None).await);

    cleanup(&f).await;
}

#[tokio::test]
async fn test_non_success_status_returns_none() {
    let f = fixture("img-404");
    let mut http = MockHttp::new();
    http.expect_execute().returning(|_| {
        Ok(HttpResponse {
            status: 404,
            headers: HashMap::new(),
            body: Bytes::new(),
        })
    });
    let images = image_manager(&f, http);

    assert!(images.get_image("https://x/missing.png", None).await.is_none());

    cleanup(&f).await;
}

#[tokio::test]
async fn test_stale_image_metadata_heals_and_refetches() {
    let f = fixture("img-stale");
    let mut http = MockHttp::new();
    http.expect_execute().times(2).returning(|_| Ok(ok_response()));
    let images = image_manager(&f, http);

    let path = images.get_image("https://x/a.png", None).await.unwrap();

    // Someone deletes the file behind the cache's back
    f.fs.delete_file(&path).await.unwrap();

    let refetched = images.get_image("https://x/a.png", None).await.unwrap();
    assert!(f.fs.exists(&refetched).await.unwrap());

    cleanup(&f).await;
}

#[tokio::test]
async fn test_disk_probe_backfills_metadata() {
    let f = fixture("img-backfill");
    let mut http = MockHttp::new();
    http.expect_execute().times(1).returning(|_| Ok(ok_response()));
    let images = image_manager(&f, http);

    let path = images.get_image("https://x/a.png", None).await.unwrap();

    // Drop only the metadata record; the file stays
    f.cache
        .clear_namespace(core_cache::IMAGE_METADATA_NAMESPACE)
        .await
        .unwrap();

    // Served from disk without a second fetch (mock allows only one call)
    let hit = images.get_image("https://x/a.png", None).await.unwrap();
    assert_eq!(hit, path);

    cleanup(&f).await;
}

#[tokio::test]
async fn test_preload_images_continues_past_failures() {
    let f = fixture("img-batch");
    let mut http = MockHttp::new();
    http.expect_execute().returning(|request| {
        if request.url.contains("bad") {
            Err(BridgeError::OperationFailed("boom".to_string()))
        } else {
            Ok(ok_response())
        }
    });
    let images = image_manager(&f, http);

    let urls = vec![
        "https://x/1.png".to_string(),
        "https://x/bad.png".to_string(),
        "https://x/3.png".to_string(),
    ];

    assert_eq!(images.preload_images(&urls, None).await, 2);

    cleanup(&f).await;
}

#[tokio::test]
async fn test_clear_cache_empties_directory_and_records() {
    let f = fixture("img-clear");
    let mut http = MockHttp::new();
    http.expect_execute().times(2).returning(|_| Ok(ok_response()));
    let images = image_manager(&f, http);

    let path = images.get_image("https://x/a.png", None).await.unwrap();
    images.clear_cache().await.unwrap();

    assert!(!f.fs.exists(&path).await.unwrap());

    // Next lookup goes back to the network (second expected call)
    assert!(images.get_image("https://x/a.png", None).await.is_some());

    cleanup(&f).await;
}

// ============================================================================
// Video cache
// ============================================================================

#[tokio::test]
async fn test_video_metadata_roundtrip_and_expiry() {
    let f = fixture("vid-meta");
    let videos = video_manager(&f, MockHttp::new()).with_ttl(Duration::from_secs(3600));

    let mut record = HashMap::new();
    record.insert("title".to_string(), "Intro".to_string());

    videos.cache_video_metadata("v1", &record).await.unwrap();
    assert_eq!(
        videos.get_video_metadata::<HashMap<String, String>>("v1").await,
        Some(record)
    );

    f.clock.advance_millis(2 * 3600 * 1000);
    assert_eq!(
        videos.get_video_metadata::<HashMap<String, String>>("v1").await,
        None
    );

    cleanup(&f).await;
}

#[tokio::test]
async fn test_playlist_roundtrip() {
    let f = fixture("vid-playlist");
    let videos = video_manager(&f, MockHttp::new());

    let playlist = vec!["v1".to_string(), "v2".to_string()];
    videos.cache_playlist("p1", &playlist).await.unwrap();

    assert_eq!(
        videos.get_playlist::<Vec<String>>("p1").await,
        Some(playlist)
    );
    assert_eq!(videos.get_playlist::<Vec<String>>("p2").await, None);

    cleanup(&f).await;
}

#[tokio::test]
async fn test_thumbnail_download_is_idempotent() {
    let f = fixture("vid-thumb");
    let mut http = MockHttp::new();
    // Same video id twice: exactly one network fetch
    http.expect_execute().times(1).returning(|_| Ok(ok_response()));
    let videos = video_manager(&f, http);

    let first = videos
        .cache_video_thumbnail("v1", "https://x/thumb.png")
        .await
        .unwrap();
    let second = videos
        .cache_video_thumbnail("v1", "https://x/thumb.png")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert!(f.fs.exists(&first).await.unwrap());

    cleanup(&f).await;
}

#[tokio::test]
async fn test_thumbnail_path_lookup_heals_stale_record() {
    let f = fixture("vid-thumb-stale");
    let mut http = MockHttp::new();
    http.expect_execute().times(1).returning(|_| Ok(ok_response()));
    let videos = video_manager(&f, http);

    let path = videos
        .cache_video_thumbnail("v1", "https://x/thumb.png")
        .await
        .unwrap();
    assert_eq!(videos.get_video_thumbnail_path("v1").await, Some(path.clone()));

    // File vanishes; the stale record is healed and the lookup misses
    f.fs.delete_file(&path).await.unwrap();
    assert_eq!(videos.get_video_thumbnail_path("v1").await, None);

    cleanup(&f).await;
}

#[tokio::test]
async fn test_thumbnail_path_falls_back_to_extension_probe() {
    let f = fixture("vid-thumb-probe");
    let videos = video_manager(&f, MockHttp::new());

    // A file someone dropped in place without any record
    let path = f.root.join("thumbnails").join("v9.png");
    f.fs.write_file(&path, png_bytes()).await.unwrap();

    assert_eq!(videos.get_video_thumbnail_path("v9").await, Some(path));
    assert_eq!(videos.get_video_thumbnail_path("v10").await, None);

    cleanup(&f).await;
}

#[tokio::test]
async fn test_expired_sweep_covers_records_and_files() {
    let f = fixture("vid-sweep");
    let mut http = MockHttp::new();
    http.expect_execute().times(1).returning(|_| Ok(ok_response()));
    let videos = video_manager(&f, http).with_ttl(Duration::from_secs(3600));

    videos
        .cache_video_metadata("v1", &"meta".to_string())
        .await
        .unwrap();
    videos
        .cache_playlist("p1", &vec!["v1".to_string()])
        .await
        .unwrap();
    videos
        .cache_video_thumbnail("v1", "https://x/thumb.png")
        .await
        .unwrap();

    // Two hours later everything is stale: both record namespaces and the
    // on-disk file (its mtime is two hours behind the manual clock).
    f.clock.advance_millis(2 * 3600 * 1000);
    let outcome = videos.clear_expired_entries().await;

    // v1 record, thumbnail pointer record, p1 record, thumbnail file
    assert_eq!(outcome.removed, 4);
    assert_eq!(outcome.failed, 0);
    assert_eq!(videos.get_video_thumbnail_path("v1").await, None);

    cleanup(&f).await;
}

#[tokio::test]
async fn test_thumbnail_size_limit() {
    let f = fixture("vid-size");
    let videos = video_manager(&f, MockHttp::new()).with_max_thumbnail_bytes(100);

    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        f.fs.write_file(
            &f.root.join("thumbnails").join(name),
            Bytes::from(vec![0u8; 60]),
        )
        .await
        .unwrap();
    }

    let outcome = videos.enforce_size_limit().await;
    assert_eq!(outcome.removed, 2);

    let dir_size = f
        .fs
        .directory_size(&f.root.join("thumbnails"))
        .await
        .unwrap();
    assert!(dir_size <= 100);

    // Already under budget: nothing more to do
    let outcome = videos.enforce_size_limit().await;
    assert_eq!(outcome.removed, 0);

    cleanup(&f).await;
}
