//! Configuration for the stamp engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the stamp engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory of the disk tile cache.
    pub cache_root: PathBuf,

    /// Background pool size. Zero means available hardware concurrency.
    pub pool_workers: usize,

    /// Bound on a single provider pixel fetch, in milliseconds. A
    /// timeout is a soft failure: the tile stays unavailable for this
    /// pass and a background prefetch is enqueued.
    pub fetch_timeout_ms: u64,

    /// Capacity of the in-memory decoded-source cache, in frames.
    pub source_cache_entries: usize,

    /// Target tile edge in source lines when rendering at or above the
    /// source's full resolution.
    pub target_tile_lines: usize,

    /// When a frame's natural extent exceeds this multiple of the
    /// requested extent's area, the frame renders through the direct
    /// (uncached) path instead of building an oversized whole tile.
    pub oversize_extent_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("stamp-cache"),
            pool_workers: 0,
            fetch_timeout_ms: 8000,
            source_cache_entries: 64,
            target_tile_lines: 500,
            oversize_extent_factor: 9.0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("STAMP_CACHE_ROOT") {
            if !val.is_empty() {
                config.cache_root = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("STAMP_POOL_WORKERS") {
            if let Ok(n) = val.parse() {
                config.pool_workers = n;
            }
        }

        if let Ok(val) = std::env::var("STAMP_FETCH_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.fetch_timeout_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("STAMP_SOURCE_CACHE_ENTRIES") {
            if let Ok(n) = val.parse() {
                config.source_cache_entries = n;
            }
        }

        if let Ok(val) = std::env::var("STAMP_TARGET_TILE_LINES") {
            if let Ok(n) = val.parse() {
                config.target_tile_lines = n;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch_timeout_ms == 0 {
            return Err("fetch_timeout_ms must be > 0".to_string());
        }

        if self.source_cache_entries == 0 {
            return Err("source_cache_entries must be > 0".to_string());
        }

        if self.target_tile_lines == 0 {
            return Err("target_tile_lines must be > 0".to_string());
        }

        if !(self.oversize_extent_factor >= 1.0) {
            return Err("oversize_extent_factor must be >= 1.0".to_string());
        }

        Ok(())
    }

    /// Fetch timeout as a Duration.
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_tile_lines, 500);
    }

    #[test]
    fn test_validation_rejects_zeros() {
        let mut config = EngineConfig::default();
        config.fetch_timeout_ms = 0;
        assert!(config.validate().is_err());

        config = EngineConfig::default();
        config.target_tile_lines = 0;
        assert!(config.validate().is_err());

        config = EngineConfig::default();
        config.oversize_extent_factor = 0.5;
        assert!(config.validate().is_err());
    }
}
