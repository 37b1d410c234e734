//! The working map projection: the application's world coordinate space.
//!
//! World coordinates are plate-carrée degrees — X is longitude offset
//! into the period centered on the configured center longitude, Y is
//! latitude. The render resolution unit (pixels per degree) follows
//! directly from this choice.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use geometry::LonLat;
use serde::{Deserialize, Serialize};
use stamp_common::WorldExtent;

/// The application's working map projection.
///
/// Reconfiguring the projection changes the hash, which invalidates every
/// projected tile built under the old configuration (source pixels
/// survive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkProjection {
    /// Center longitude of the canonical world period, degrees.
    pub center_lon: f64,
}

impl Default for WorkProjection {
    fn default() -> Self {
        Self { center_lon: 0.0 }
    }
}

impl WorkProjection {
    /// Create a projection centered on the given longitude.
    pub fn centered_on(center_lon: f64) -> Self {
        Self { center_lon }
    }

    /// Project a geodetic coordinate into world space, placing X in the
    /// canonical period `[center - 180, center + 180)`.
    pub fn forward(&self, p: LonLat) -> (f64, f64) {
        let mut x = p.lon;
        while x >= self.center_lon + 180.0 {
            x -= 360.0;
        }
        while x < self.center_lon - 180.0 {
            x += 360.0;
        }
        (x, p.lat)
    }

    /// Invert a world coordinate to geodetic.
    ///
    /// World X outside [-180, 180] is a wrap repetition and inverts to
    /// the same meridian it names; no normalization happens here.
    pub fn inverse(&self, x: f64, y: f64) -> LonLat {
        LonLat::new(x, y)
    }

    /// Translate a geographic bounding range into the canonical world
    /// period: the extent is shifted by whole periods until its center
    /// falls within `[center - 180, center + 180)`.
    pub fn canonical_extent(&self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> WorldExtent {
        let mut extent = WorldExtent::new(min_lon, min_lat, max_lon, max_lat);
        let mut center = (extent.min_x + extent.max_x) / 2.0;
        while center >= self.center_lon + 180.0 {
            extent = extent.translated_x(-360.0);
            center -= 360.0;
        }
        while center < self.center_lon - 180.0 {
            extent = extent.translated_x(360.0);
            center += 360.0;
        }
        extent
    }

    /// Stable hash of the projection configuration, quantized so that
    /// serialization round trips cannot perturb it.
    pub fn projection_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        "plate-carree".hash(&mut hasher);
        ((self.center_lon * 1e6).round() as i64).hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_places_in_canonical_period() {
        let proj = WorkProjection::default();
        let (x, y) = proj.forward(LonLat::new(190.0, 10.0));
        assert_eq!(x, -170.0);
        assert_eq!(y, 10.0);

        let shifted = WorkProjection::centered_on(180.0);
        let (x, _) = shifted.forward(LonLat::new(-170.0, 0.0));
        assert_eq!(x, 190.0);
    }

    #[test]
    fn test_inverse_preserves_wrap_repetitions() {
        let proj = WorkProjection::default();
        let p = proj.inverse(365.0, 5.0);
        assert_eq!(p.lon, 365.0);
        assert_eq!(p.normalized().lon, 5.0);
    }

    #[test]
    fn test_canonical_extent_shifts_whole_periods() {
        let proj = WorkProjection::default();
        let e = proj.canonical_extent(350.0, 0.0, 370.0, 10.0);
        assert_eq!(e.min_x, -10.0);
        assert_eq!(e.max_x, 10.0);
    }

    #[test]
    fn test_hash_changes_with_center() {
        let a = WorkProjection::centered_on(0.0);
        let b = WorkProjection::centered_on(180.0);
        assert_ne!(a.projection_hash(), b.projection_hash());
        assert_eq!(a.projection_hash(), WorkProjection::default().projection_hash());
    }
}
