//! In-memory LRU cache for decoded source pixels.
//!
//! Sits in front of the disk store's source area so repeated renders of
//! the same frames skip both the disk and the provider. Entries are
//! shared as `Arc<PixelBuffer>`; eviction never invalidates a buffer a
//! render is still holding.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use stamp_common::PixelBuffer;
use tokio::sync::Mutex;

/// Cache counters.
#[derive(Debug, Default, Clone)]
pub struct SourceCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl SourceCacheStats {
    /// Hit rate in [0, 1].
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded in-memory cache keyed by source-area filename.
pub struct SourceCache {
    cache: Mutex<LruCache<String, Arc<PixelBuffer>>>,
    stats: Mutex<SourceCacheStats>,
    capacity: usize,
}

impl SourceCache {
    /// Create a cache holding at most `capacity` decoded frames.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped above zero");
        Self {
            cache: Mutex::new(LruCache::new(cap)),
            stats: Mutex::new(SourceCacheStats::default()),
            capacity: capacity.max(1),
        }
    }

    /// Look up a decoded frame.
    pub async fn get(&self, key: &str) -> Option<Arc<PixelBuffer>> {
        let mut cache = self.cache.lock().await;
        let found = cache.get(key).cloned();
        drop(cache);

        let mut stats = self.stats.lock().await;
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Insert a decoded frame, evicting the least recently used entry
    /// when full.
    pub async fn put(&self, key: String, buffer: Arc<PixelBuffer>) {
        let mut cache = self.cache.lock().await;
        let evicting = cache.len() >= self.capacity && !cache.contains(&key);
        cache.put(key, buffer);
        drop(cache);

        if evicting {
            self.stats.lock().await.evictions += 1;
        }
    }

    /// Current counters.
    pub async fn stats(&self) -> SourceCacheStats {
        self.stats.lock().await.clone()
    }

    /// Number of cached frames.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    /// Drop every entry and reset counters.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
        *self.stats.lock().await = SourceCacheStats::default();
    }
}
