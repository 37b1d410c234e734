//! World-coordinate extents and wrap helpers.

use serde::{Deserialize, Serialize};

/// A rectangular extent in world coordinates.
///
/// World coordinates are the application's flat map-projection space,
/// expressed in degrees. X may run outside [-180, 180] when a viewport
/// spans the ±360° seam; the wrap helpers below enumerate the 360°
/// repetitions needed to cover such a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl WorldExtent {
    /// Create a new extent from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Width of the extent in world units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the extent in world units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this extent intersects another.
    pub fn intersects(&self, other: &WorldExtent) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two extents.
    pub fn intersection(&self, other: &WorldExtent) -> Option<WorldExtent> {
        if !self.intersects(other) {
            return None;
        }

        Some(WorldExtent {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Check if a point is contained within this extent.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow the extent to include another.
    pub fn union(&self, other: &WorldExtent) -> WorldExtent {
        WorldExtent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Translate the extent along the X axis.
    pub fn translated_x(&self, dx: f64) -> WorldExtent {
        WorldExtent {
            min_x: self.min_x + dx,
            min_y: self.min_y,
            max_x: self.max_x + dx,
            max_y: self.max_y,
        }
    }

    /// Pixel dimensions of the extent at a given density, clamped to at
    /// least one pixel per axis so extreme zooms never produce a
    /// zero-size buffer.
    pub fn pixel_size(&self, ppd: f64) -> (usize, usize) {
        let w = (self.width() * ppd).round() as usize;
        let h = (self.height() * ppd).round() as usize;
        (w.max(1), h.max(1))
    }

    /// The X offsets (multiples of 360°) under which a stamp placed in
    /// the canonical period must be tested for visibility against this
    /// extent. One offset per world-wrap repetition the extent spans.
    ///
    /// An extent lying exactly on a period boundary (`min_x == 180`)
    /// belongs to the lower period: `floor` semantics on both ends.
    pub fn wrap_offsets(&self) -> Vec<f64> {
        let lo = (self.min_x / 360.0).floor() as i64;
        let hi = (self.max_x / 360.0).ceil() as i64;
        (lo..=hi).map(|k| k as f64 * 360.0).collect()
    }

    /// Generate a cache key fragment for this extent (quantized to avoid
    /// floating point issues).
    pub fn cache_key(&self) -> String {
        format!(
            "{:.6}_{:.6}_{:.6}_{:.6}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
