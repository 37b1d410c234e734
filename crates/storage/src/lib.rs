//! Storage abstractions for the stamp engine.
//!
//! Provides:
//! - Disk-backed persistence for raw source pixels and reprojected tiles
//! - An in-memory LRU cache in front of the source area
//! - A bounded background pool for deferred cache writes and prefetches

pub mod pool;
pub mod source_cache;
pub mod tile_store;

pub use pool::RenderPool;
pub use source_cache::{SourceCache, SourceCacheStats};
pub use tile_store::{StoreStats, TileKey, TileStore};
