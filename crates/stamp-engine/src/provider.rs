//! The external metadata/pixel provider interface.
//!
//! The engine never talks to a network or file format directly; it asks
//! an implementation of [`PixelProvider`] for geometry, size, projection
//! parameters, and decoded pixel ranges. Provider failures are soft:
//! the affected stamp is temporarily unavailable and retried on the next
//! render pass.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geometry::LonLat;
use stamp_common::{PixelBuffer, PixelRect, StampResult};

/// Corner geometry of a stamp, as returned by the provider.
#[derive(Debug, Clone)]
pub enum GeometrySpec {
    /// One quadrilateral for the whole raster, ordered SW, SE, NE, NW in
    /// pixel terms (SW is sample 0 of the last line).
    WholeImage([LonLat; 4]),
    /// Exact per-tile corner geometry ("real frame points"): a row-major
    /// grid of quadrilaterals, each ordered SW, SE, NE, NW.
    PerTile {
        rows: usize,
        cols: usize,
        corners: Vec<[LonLat; 4]>,
    },
}

impl GeometrySpec {
    /// The whole-image corner quadrilateral: for per-tile geometry, the
    /// outer corners of the tile grid.
    pub fn whole_corners(&self) -> Option<[LonLat; 4]> {
        match self {
            GeometrySpec::WholeImage(corners) => Some(*corners),
            GeometrySpec::PerTile { rows, cols, corners } => {
                if corners.len() != rows * cols || corners.is_empty() {
                    return None;
                }
                // Row-major with row 0 at the top (north) of the raster.
                let nw_tile = corners[0];
                let ne_tile = corners[cols - 1];
                let sw_tile = corners[(rows - 1) * cols];
                let se_tile = corners[rows * cols - 1];
                Some([sw_tile[0], se_tile[1], ne_tile[2], nw_tile[3]])
            }
        }
    }
}

/// Descriptive metadata for a stamp, carried for diagnostics and
/// point-query responses.
#[derive(Debug, Clone)]
pub struct StampInfo {
    /// Stamp identifier.
    pub id: String,
    /// Acquisition time, when the provider knows it.
    pub acquired: Option<DateTime<Utc>>,
}

/// The external image/metadata provider.
///
/// Implementations are expected to be remote; every call can fail or
/// hang, so the engine bounds pixel fetches with a timeout and treats
/// failures as transient.
#[async_trait]
pub trait PixelProvider: Send + Sync {
    /// Corner points describing the stamp's quadrilateral, or per-tile
    /// geometry for sources that carry it.
    async fn geometry(&self, id: &str) -> StampResult<GeometrySpec>;

    /// Native raster size as (lines, samples).
    async fn native_size(&self, id: &str) -> StampResult<(usize, usize)>;

    /// Projection parameters as a key/value map (kind, offsets, scale,
    /// ignore value, numeric flag, units, hints).
    async fn projection_params(&self, id: &str) -> StampResult<HashMap<String, String>>;

    /// Decoded samples for a sub-rectangle of the native raster at the
    /// requested output pixel density. The returned buffer covers the
    /// same region as `rect`, decimated to the density. A density of 0
    /// requests native resolution.
    async fn read_pixels(&self, id: &str, rect: PixelRect, ppd: f64) -> StampResult<PixelBuffer>;

    /// Descriptive metadata. Default implementation returns the bare id.
    async fn info(&self, id: &str) -> StampResult<StampInfo> {
        Ok(StampInfo {
            id: id.to_string(),
            acquired: None,
        })
    }
}
