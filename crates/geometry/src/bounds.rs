//! Geographic bounds of a cell, absorbing curved-edge excursions.
//!
//! A naive min/max over the four corners under-estimates a cell whose
//! edges bulge poleward: the great circle through two corners at the same
//! latitude reaches a higher latitude between them. Each edge is tested
//! for such an extreme and the bounds widened accordingly.

use nalgebra::Vector3;
use stamp_common::WorldExtent;

use crate::cell::GeometryCell;
use crate::latlon::LonLat;

/// Bounding range of a cell in geodetic degrees.
///
/// Longitudes are unwrapped for continuity around the chain, so a cell
/// straddling the antimeridian comes back as e.g. [170, 190] rather than
/// a degenerate [-180, 180] box. The tiling layer translates by 360°
/// multiples as needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeographicBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeographicBounds {
    /// Convert to a world-coordinate extent (plate-carrée world space,
    /// degrees).
    pub fn to_extent(&self) -> WorldExtent {
        WorldExtent::new(self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

impl GeometryCell {
    /// Compute the cell's geographic bounds.
    ///
    /// Projects the corner chain to lon/lat, then, for each edge, finds
    /// the latitude extreme of the edge's great circle (the projection of
    /// the up axis onto the circle plane, via cross products against the
    /// edge normal) and absorbs it when the extreme falls on the edge arc.
    ///
    /// Returns None for a dead cell.
    pub fn geographic_bounds(&self) -> Option<GeographicBounds> {
        if self.is_dead() {
            return None;
        }

        let corners = self.corners();

        // Unwrap corner longitudes for continuity around the chain.
        let mut lons = [0.0f64; 4];
        let mut lats = [0.0f64; 4];
        for (i, c) in corners.iter().enumerate() {
            let ll = LonLat::from_vector(c);
            lats[i] = ll.lat;
            lons[i] = if i == 0 {
                ll.lon
            } else {
                let mut lon = ll.lon;
                while lon - lons[i - 1] > 180.0 {
                    lon -= 360.0;
                }
                while lon - lons[i - 1] < -180.0 {
                    lon += 360.0;
                }
                lon
            };
        }

        let mut min_lon = lons[0];
        let mut max_lon = lons[0];
        let mut min_lat = lats[0];
        let mut max_lat = lats[0];
        for i in 1..4 {
            min_lon = min_lon.min(lons[i]);
            max_lon = max_lon.max(lons[i]);
            min_lat = min_lat.min(lats[i]);
            max_lat = max_lat.max(lats[i]);
        }

        // Absorb the latitude extremes of curved edges.
        for i in 0..4 {
            let a = &corners[i];
            let b = &corners[(i + 1) % 4];
            for lat in edge_latitude_extremes(a, b) {
                min_lat = min_lat.min(lat);
                max_lat = max_lat.max(lat);
            }
        }

        Some(GeographicBounds {
            min_lon,
            min_lat: min_lat.max(-90.0),
            max_lon,
            max_lat: max_lat.min(90.0),
        })
    }
}

/// Latitude extremes of the great-circle arc from `a` to `b` that lie
/// strictly on the arc.
///
/// The extreme directions of the circle are the projections of the up
/// axis onto the circle plane: n × (up × n). An equatorial circle has no
/// latitude extreme; endpoints are already counted by the caller.
fn edge_latitude_extremes(a: &Vector3<f64>, b: &Vector3<f64>) -> Vec<f64> {
    const EPS: f64 = 1e-12;
    let up = Vector3::new(0.0, 0.0, 1.0);

    let n = a.cross(b);
    if n.norm() < EPS {
        return Vec::new();
    }
    let n = n.normalize();

    let extreme = n.cross(&up.cross(&n));
    if extreme.norm() < EPS {
        // The circle lies in the equatorial plane; latitude is constant.
        return Vec::new();
    }
    let extreme = extreme.normalize();

    let mut out = Vec::new();
    for candidate in [extreme, -extreme] {
        // On-arc test: the candidate lies between a and b when both
        // partial arcs wind the same way as the edge.
        if a.cross(&candidate).dot(&n) >= 0.0 && candidate.cross(b).dot(&n) >= 0.0 {
            out.push(candidate.z.clamp(-1.0, 1.0).asin().to_degrees());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(corners: [(f64, f64); 4]) -> GeometryCell {
        GeometryCell::new([
            LonLat::new(corners[0].0, corners[0].1).to_vector(),
            LonLat::new(corners[1].0, corners[1].1).to_vector(),
            LonLat::new(corners[2].0, corners[2].1).to_vector(),
            LonLat::new(corners[3].0, corners[3].1).to_vector(),
        ])
    }

    #[test]
    fn test_equatorial_cell_bounds() {
        let c = cell([(0.0, -5.0), (10.0, -5.0), (10.0, 5.0), (0.0, 5.0)]);
        let b = c.geographic_bounds().unwrap();
        assert!((b.min_lon - 0.0).abs() < 1e-9);
        assert!((b.max_lon - 10.0).abs() < 1e-9);
        // Mid-latitude edges of a small equatorial cell bulge by well
        // under a degree.
        assert!(b.min_lat < -5.0 + 1e-9 && b.min_lat > -6.0);
        assert!(b.max_lat > 5.0 - 1e-9 && b.max_lat < 6.0);
    }

    #[test]
    fn test_polar_edge_excursion_absorbed() {
        // North edge runs between (±60°, 80°); its great circle reaches
        // tan(lat) = tan(80°)/cos(60°), about 84.97°. A corner-only box
        // would stop at 80°.
        let c = cell([(-60.0, 70.0), (60.0, 70.0), (60.0, 80.0), (-60.0, 80.0)]);
        let b = c.geographic_bounds().unwrap();
        assert!(
            b.max_lat > 84.0 && b.max_lat < 86.0,
            "expected poleward excursion near 85°, got {}",
            b.max_lat
        );
        assert!((b.min_lon + 60.0).abs() < 1e-9);
        assert!((b.max_lon - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_antimeridian_cell_unwraps() {
        let c = cell([(170.0, 0.0), (190.0, 0.0), (190.0, 10.0), (170.0, 10.0)]);
        let b = c.geographic_bounds().unwrap();
        assert!((b.min_lon - 170.0).abs() < 1e-9);
        assert!((b.max_lon - 190.0).abs() < 1e-9);
    }

    #[test]
    fn test_dead_cell_has_no_bounds() {
        let c = GeometryCell::new([Vector3::zeros(); 4]);
        assert!(c.geographic_bounds().is_none());
    }
}
