//! Process-wide engine service.
//!
//! Owns the shared cache store, source LRU, and background pool, and
//! opens stamp images against them. Constructed once per process and
//! passed by reference to everything that needs it, so tests can run an
//! isolated engine against a temp directory.

use std::sync::Arc;

use projection::WorkProjection;
use stamp_common::{StampError, StampResult};
use storage::{RenderPool, SourceCache, SourceCacheStats, StoreStats, TileStore};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::EngineConfig;
use crate::image::StampImage;
use crate::provider::PixelProvider;

/// The stamp engine: shared services plus the current working
/// projection.
pub struct StampEngine {
    store: Arc<TileStore>,
    source_cache: Arc<SourceCache>,
    pool: RenderPool,
    config: EngineConfig,
    work: RwLock<WorkProjection>,
}

impl StampEngine {
    /// Create an engine from configuration. Fails only when the cache
    /// root cannot be created or the configuration is invalid.
    pub async fn new(config: EngineConfig) -> StampResult<Self> {
        config
            .validate()
            .map_err(StampError::ConfigError)?;

        let store = Arc::new(TileStore::open(&config.cache_root).await?);
        let source_cache = Arc::new(SourceCache::new(config.source_cache_entries));
        let pool = if config.pool_workers == 0 {
            RenderPool::with_hardware_concurrency()
        } else {
            RenderPool::new(config.pool_workers)
        };

        info!(
            cache_root = %config.cache_root.display(),
            workers = pool.workers(),
            "stamp engine ready"
        );

        Ok(Self {
            store,
            source_cache,
            pool,
            config,
            work: RwLock::new(WorkProjection::default()),
        })
    }

    /// Open a stamp image against this engine's shared services.
    pub async fn open_stamp(
        &self,
        id: impl Into<String>,
        provider: Arc<dyn PixelProvider>,
    ) -> StampResult<StampImage> {
        let work = *self.work.read().await;
        StampImage::open(
            id,
            provider,
            Arc::clone(&self.store),
            Arc::clone(&self.source_cache),
            self.pool.clone(),
            self.config.clone(),
            work,
        )
        .await
    }

    /// The current working projection.
    pub async fn work_projection(&self) -> WorkProjection {
        *self.work.read().await
    }

    /// Reconfigure the working projection. Images opened earlier must be
    /// told through their own `invalidate_projection`; this only affects
    /// stamps opened afterwards.
    pub async fn set_work_projection(&self, work: WorkProjection) {
        *self.work.write().await = work;
    }

    /// Disk store counters.
    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// In-memory source cache counters.
    pub async fn source_cache_stats(&self) -> SourceCacheStats {
        self.source_cache.stats().await
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
