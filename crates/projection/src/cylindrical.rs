//! Corner-interpolated cylindrical source projection.
//!
//! Used when a provider declares cylindrical geometry but supplies only
//! corner points: pixel positions interpolate linearly in lon/lat space
//! between the four corners, with longitudes unwrapped so a stamp
//! straddling the antimeridian interpolates continuously.

use geometry::LonLat;

/// Corner-interpolated cylindrical projection.
#[derive(Debug, Clone)]
pub struct CornerCylindrical {
    /// Corner coordinates ordered SW, SE, NE, NW, longitudes unwrapped.
    corners: [LonLat; 4],
    /// Native raster size in lines.
    lines: usize,
    /// Native raster size in samples.
    samples: usize,
}

impl CornerCylindrical {
    /// Create the projection from corner coordinates (SW, SE, NE, NW)
    /// and the native raster size. Returns None for an empty raster.
    pub fn new(corners: [LonLat; 4], lines: usize, samples: usize) -> Option<Self> {
        if lines == 0 || samples == 0 {
            return None;
        }

        // Unwrap corner longitudes for continuity around the chain.
        let mut unwrapped = corners;
        for i in 1..4 {
            while unwrapped[i].lon - unwrapped[i - 1].lon > 180.0 {
                unwrapped[i].lon -= 360.0;
            }
            while unwrapped[i].lon - unwrapped[i - 1].lon < -180.0 {
                unwrapped[i].lon += 360.0;
            }
        }

        Some(Self {
            corners: unwrapped,
            lines,
            samples,
        })
    }

    /// Map a source pixel to geodetic coordinates by bilinear
    /// interpolation between the corners. Line 0 is the north edge.
    pub fn forward(&self, line: f64, sample: f64) -> LonLat {
        let max_line = (self.lines - 1).max(1) as f64;
        let max_sample = (self.samples - 1).max(1) as f64;
        let u = sample / max_sample;
        let v = 1.0 - line / max_line;

        let [sw, se, ne, nw] = self.corners;
        let lon = sw.lon * (1.0 - u) * (1.0 - v)
            + se.lon * u * (1.0 - v)
            + ne.lon * u * v
            + nw.lon * (1.0 - u) * v;
        let lat = sw.lat * (1.0 - u) * (1.0 - v)
            + se.lat * u * (1.0 - v)
            + ne.lat * u * v
            + nw.lat * (1.0 - u) * v;
        LonLat::new(lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_projection() -> CornerCylindrical {
        CornerCylindrical::new(
            [
                LonLat::new(0.0, 0.0),
                LonLat::new(10.0, 0.0),
                LonLat::new(10.0, 10.0),
                LonLat::new(0.0, 10.0),
            ],
            101,
            101,
        )
        .unwrap()
    }

    #[test]
    fn test_corners() {
        let proj = box_projection();
        // Line 0 is the north edge; line 100 the south.
        let nw = proj.forward(0.0, 0.0);
        assert!((nw.lon - 0.0).abs() < 1e-9 && (nw.lat - 10.0).abs() < 1e-9);
        let se = proj.forward(100.0, 100.0);
        assert!((se.lon - 10.0).abs() < 1e-9 && (se.lat - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_center() {
        let proj = box_projection();
        let c = proj.forward(50.0, 50.0);
        assert!((c.lon - 5.0).abs() < 1e-9);
        assert!((c.lat - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_antimeridian_unwrap() {
        let proj = CornerCylindrical::new(
            [
                LonLat::new(170.0, 0.0),
                LonLat::new(-170.0, 0.0),
                LonLat::new(-170.0, 10.0),
                LonLat::new(170.0, 10.0),
            ],
            11,
            11,
        )
        .unwrap();
        // The east corners unwrap to 190°, so the midpoint interpolates
        // through 180° instead of jumping across the world.
        let c = proj.forward(10.0, 5.0);
        assert!((c.lon - 180.0).abs() < 1e-9, "lon = {}", c.lon);
    }

    #[test]
    fn test_rejects_empty_raster() {
        assert!(CornerCylindrical::new(
            [LonLat::new(0.0, 0.0); 4],
            0,
            10
        )
        .is_none());
    }
}
