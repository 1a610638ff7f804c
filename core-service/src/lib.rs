//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! key-value store, settings store, clock) into the cache core. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`); mobile hosts construct [`CoreDependencies`] from their
//! own adapters and call [`build_cache_service`] directly.

pub mod error;

pub use error::{CoreError, Result};

// Re-export the cache surface hosts program against
pub use core_cache::{CacheConfig, CacheService, PinLevel, PutOptions};
pub use core_runtime::events::CacheEvent;

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    kv::KeyValueStore,
    storage::{FileSystemAccess, SettingsStore},
    time::Clock,
};
use tracing::info;

/// Aggregated handle to all bridge dependencies the cache core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub kv_store: Arc<dyn KeyValueStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystemAccess>,
        kv_store: Arc<dyn KeyValueStore>,
        settings_store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            filesystem,
            kv_store,
            settings_store,
            clock,
        }
    }
}

/// Build a [`CacheService`] from the provided dependencies.
///
/// The service is constructed but not initialized; call
/// `service.initialize()` once the host is ready to create directories and
/// start the maintenance task.
pub async fn build_cache_service(
    config: CacheConfig,
    deps: CoreDependencies,
) -> Result<CacheService> {
    let service = CacheService::new(
        config,
        deps.kv_store,
        deps.settings_store,
        deps.filesystem,
        deps.http_client,
        deps.clock,
    )
    .await?;

    Ok(service)
}

/// Convenience bootstrapper for desktop hosts.
///
/// Builds SQLite-backed stores under the platform data directory, wires the
/// reqwest HTTP client and tokio filesystem, and initializes the service.
///
/// ```ignore
/// use core_service::{bootstrap_desktop, CacheConfig};
///
/// let service = bootstrap_desktop(CacheConfig::default()).await?;
/// let stats = service.cache_size_stats().await;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: CacheConfig) -> Result<CacheService> {
    use bridge_desktop::{
        ReqwestHttpClient, SqliteKeyValueStore, SqliteSettingsStore, TokioFileSystem,
    };
    use bridge_traits::time::SystemClock;

    let filesystem = Arc::new(TokioFileSystem::new());
    let data_dir = filesystem
        .get_data_directory()
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

    let kv_store = SqliteKeyValueStore::new(data_dir.join("cache.db"))
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    let settings_store = SqliteSettingsStore::new(data_dir.join("settings.db"))
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

    let deps = CoreDependencies::new(
        Arc::new(ReqwestHttpClient::new()),
        filesystem,
        Arc::new(kv_store),
        Arc::new(settings_store),
        Arc::new(SystemClock),
    );

    let service = build_cache_service(config, deps).await?;
    service.initialize().await?;

    info!("Desktop cache service ready");
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::kv::MemoryKeyValueStore;
    use bridge_traits::storage::MemorySettingsStore;
    use bridge_traits::time::ManualClock;
    use bridge_traits::{
        error::BridgeError,
        http::{HttpRequest, HttpResponse},
    };

    struct NoNetwork;

    #[async_trait::async_trait]
    impl HttpClient for NoNetwork {
        async fn execute(&self, _request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
            Err(BridgeError::NotAvailable("no network in tests".to_string()))
        }
    }

    fn memory_deps() -> CoreDependencies {
        let root = std::env::temp_dir().join("rpc-core-service-tests");
        CoreDependencies::new(
            Arc::new(NoNetwork),
            Arc::new(bridge_desktop::TokioFileSystem::with_directories(
                root.clone(),
                root,
            )),
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(MemorySettingsStore::new()),
            Arc::new(ManualClock::new(1_000)),
        )
    }

    #[tokio::test]
    async fn test_build_and_lifecycle() {
        let service = build_cache_service(CacheConfig::default(), memory_deps())
            .await
            .unwrap();

        service.initialize().await.unwrap();
        assert!(service.is_running());

        service
            .put_value("k", &"v".to_string(), "books", None, PutOptions::new())
            .await
            .unwrap();
        assert_eq!(
            service.get_value::<String>("k", "books").await,
            Some("v".to_string())
        );

        service.dispose().await;
        assert!(!service.is_running());
    }
}
