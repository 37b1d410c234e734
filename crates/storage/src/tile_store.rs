//! Disk-backed tile store.
//!
//! One file per cache key under a fixed root directory, partitioned into
//! a `source/` sub-area (raw provider pixels) and a `projected/` sub-area
//! (reprojected tiles). The areas invalidate independently: source
//! entries carry no projection hash and survive projection changes.
//!
//! Reads that fail for any reason (missing file, short file, corrupt
//! header) are cache misses, never errors.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BufMut};
use stamp_common::{PixelBuffer, StampError, StampResult};
use tracing::{debug, warn};

/// Magic prefix of the tile codec; bumping it invalidates every
/// previously written entry.
const TILE_MAGIC: &[u8; 4] = b"STP1";

/// Cache key for one frame's pixels.
///
/// Projected entries use the full tuple; source entries drop the
/// projection hash and semantics tag so they survive projection changes.
#[derive(Debug, Clone, PartialEq)]
pub struct TileKey {
    /// Stamp identifier, sanitized into the filename.
    pub source_id: String,
    /// Frame index within the stamp's tiling.
    pub frame_index: usize,
    /// Hash of the working projection configuration.
    pub projection_hash: u64,
    /// Render pixel density the tile was built for.
    pub ppd: f64,
    /// Pixel-semantics tag ("vis" or "num").
    pub semantics: &'static str,
}

impl TileKey {
    /// Filename for the projected sub-area.
    pub fn projected_name(&self) -> String {
        format!(
            "{}_f{}_p{:016x}_d{}_{}.tile",
            sanitize(&self.source_id),
            self.frame_index,
            self.projection_hash,
            quantize_ppd(self.ppd),
            self.semantics
        )
    }

    /// Filename for the source sub-area: no projection hash, no
    /// semantics tag.
    pub fn source_name(&self) -> String {
        format!(
            "{}_f{}_d{}.raw",
            sanitize(&self.source_id),
            self.frame_index,
            quantize_ppd(self.ppd)
        )
    }
}

/// Strip path separators and anything else unsafe in a filename.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Quantize a pixel density for key stability (1/1024 degree steps).
fn quantize_ppd(ppd: f64) -> u64 {
    (ppd * 1024.0).round() as u64
}

/// Cumulative store counters.
#[derive(Debug, Default, Clone)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub corrupt: u64,
}

/// Disk-backed store shared by every image and frame in the process.
///
/// Constructed once and passed by reference, so tests can point it at a
/// temp directory.
pub struct TileStore {
    source_dir: PathBuf,
    projected_dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    corrupt: AtomicU64,
}

impl TileStore {
    /// Open (creating if needed) a store rooted at the given directory.
    pub async fn open(root: impl AsRef<Path>) -> StampResult<Self> {
        let root = root.as_ref().to_path_buf();
        let source_dir = root.join("source");
        let projected_dir = root.join("projected");
        tokio::fs::create_dir_all(&source_dir)
            .await
            .map_err(|e| StampError::StoreError(format!("create {:?}: {}", source_dir, e)))?;
        tokio::fs::create_dir_all(&projected_dir)
            .await
            .map_err(|e| StampError::StoreError(format!("create {:?}: {}", projected_dir, e)))?;

        Ok(Self {
            source_dir,
            projected_dir,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            corrupt: AtomicU64::new(0),
        })
    }

    /// Read a reprojected tile. Missing or corrupt entries are misses.
    pub async fn read_projected(&self, key: &TileKey) -> Option<PixelBuffer> {
        self.read(self.projected_dir.join(key.projected_name())).await
    }

    /// Persist a reprojected tile.
    pub async fn write_projected(&self, key: &TileKey, buffer: &PixelBuffer) -> StampResult<()> {
        self.write(self.projected_dir.join(key.projected_name()), buffer)
            .await
    }

    /// Read raw source pixels. Missing or corrupt entries are misses.
    pub async fn read_source(&self, key: &TileKey) -> Option<PixelBuffer> {
        self.read(self.source_dir.join(key.source_name())).await
    }

    /// Persist raw source pixels.
    pub async fn write_source(&self, key: &TileKey, buffer: &PixelBuffer) -> StampResult<()> {
        self.write(self.source_dir.join(key.source_name()), buffer)
            .await
    }

    /// Remove every projected entry. Source entries are untouched; they
    /// remain valid across projection changes.
    pub async fn clear_projected(&self) -> StampResult<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.projected_dir)
            .await
            .map_err(|e| StampError::StoreError(e.to_string()))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Current counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
        }
    }

    async fn read(&self, path: PathBuf) -> Option<PixelBuffer> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match decode(&bytes) {
            Some(buffer) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(buffer)
            }
            None => {
                // Corrupt entry: drop it and treat as a miss so it gets
                // regenerated.
                warn!(path = %path.display(), "corrupt cache entry, discarding");
                self.corrupt.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    async fn write(&self, path: PathBuf, buffer: &PixelBuffer) -> StampResult<()> {
        let encoded = encode(buffer);
        // Write through a temp name so a torn write can never be read
        // back as a valid entry.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &encoded)
            .await
            .map_err(|e| StampError::StoreError(format!("write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StampError::StoreError(format!("rename {:?}: {}", path, e)))?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), "cache entry written");
        Ok(())
    }
}

/// Encode a buffer: magic, dimensions, then little-endian f32 samples.
fn encode(buffer: &PixelBuffer) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + buffer.data.len() * 4);
    out.put_slice(TILE_MAGIC);
    out.put_u32_le(buffer.width as u32);
    out.put_u32_le(buffer.height as u32);
    for &v in &buffer.data {
        out.put_f32_le(v);
    }
    out
}

/// Decode a buffer; None for anything that does not round-trip exactly.
fn decode(bytes: &[u8]) -> Option<PixelBuffer> {
    let mut cursor = bytes;
    if cursor.remaining() < 12 || &cursor[..4] != TILE_MAGIC {
        return None;
    }
    cursor.advance(4);
    let width = cursor.get_u32_le() as usize;
    let height = cursor.get_u32_le() as usize;

    let expected = width.checked_mul(height)?.checked_mul(4)?;
    if cursor.remaining() != expected {
        return None;
    }

    let mut data = Vec::with_capacity(width * height);
    for _ in 0..width * height {
        data.push(cursor.get_f32_le());
    }
    PixelBuffer::from_data(width, height, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> TileKey {
        TileKey {
            source_id: "orbit/1234:red".to_string(),
            frame_index: 3,
            projection_hash: 0xdeadbeef,
            ppd: 4.0,
            semantics: "num",
        }
    }

    fn buffer() -> PixelBuffer {
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.5).collect();
        PixelBuffer::from_data(4, 3, data).unwrap()
    }

    #[test]
    fn test_key_names_are_path_safe() {
        let k = key();
        for name in [k.projected_name(), k.source_name()] {
            assert!(!name.contains('/'), "separator leaked into {}", name);
            assert!(!name.contains(':'), "separator leaked into {}", name);
        }
        // Source names must not depend on the projection hash.
        let mut other = key();
        other.projection_hash = 1;
        assert_eq!(k.source_name(), other.source_name());
        assert_ne!(k.projected_name(), other.projected_name());
    }

    #[test]
    fn test_codec_roundtrip() {
        let buf = buffer();
        let decoded = decode(&encode(&buf)).unwrap();
        assert_eq!(decoded, buf);
    }

    #[test]
    fn test_codec_preserves_nan() {
        let mut buf = buffer();
        buf.set(1, 1, f32::NAN);
        let decoded = decode(&encode(&buf)).unwrap();
        assert!(decoded.get(1, 1).unwrap().is_nan());
        assert_eq!(decoded.get(0, 0), Some(0.0));
    }

    #[test]
    fn test_codec_rejects_corrupt() {
        let mut bytes = encode(&buffer());
        bytes.truncate(bytes.len() - 3);
        assert!(decode(&bytes).is_none());

        let mut bad_magic = encode(&buffer());
        bad_magic[0] = b'X';
        assert!(decode(&bad_magic).is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_is_identical() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).await.unwrap();

        let k = key();
        let buf = buffer();
        store.write_projected(&k, &buf).await.unwrap();
        let back = store.read_projected(&k).await.unwrap();
        assert_eq!(back, buf);

        let stats = store.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_missing_entry_is_miss() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).await.unwrap();
        assert!(store.read_projected(&key()).await.is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss_and_removed() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).await.unwrap();

        let k = key();
        let path = dir.path().join("projected").join(k.projected_name());
        tokio::fs::write(&path, b"not a tile").await.unwrap();

        assert!(store.read_projected(&k).await.is_none());
        assert_eq!(store.stats().corrupt, 1);
        assert!(!path.exists(), "corrupt entry should be discarded");
    }

    #[tokio::test]
    async fn test_clear_projected_keeps_source() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).await.unwrap();

        let k = key();
        let buf = buffer();
        store.write_projected(&k, &buf).await.unwrap();
        store.write_source(&k, &buf).await.unwrap();

        let removed = store.clear_projected().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.read_projected(&k).await.is_none());
        assert!(store.read_source(&k).await.is_some());
    }
}
