//! Geodetic coordinates and unit-vector conversions.

use nalgebra::Vector3;

/// A geodetic coordinate in degrees.
///
/// Longitude is unbounded here; wrap handling belongs to the tiling layer,
/// which translates extents by multiples of 360°.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    /// Create a new coordinate.
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convert to a unit vector on the sphere.
    ///
    /// X points at (lon 0, lat 0), Y at (lon 90, lat 0), Z at the north pole.
    pub fn to_vector(&self) -> Vector3<f64> {
        let lon = self.lon.to_radians();
        let lat = self.lat.to_radians();
        Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
    }

    /// Recover a geodetic coordinate from a unit vector.
    ///
    /// Longitude comes back in [-180, 180).
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        let lat = v.z.clamp(-1.0, 1.0).asin().to_degrees();
        let lon = v.y.atan2(v.x).to_degrees();
        Self { lon, lat }
    }

    /// Normalize longitude into [-180, 180).
    pub fn normalized(&self) -> Self {
        let mut lon = self.lon;
        while lon >= 180.0 {
            lon -= 360.0;
        }
        while lon < -180.0 {
            lon += 360.0;
        }
        Self { lon, lat: self.lat }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes() {
        let origin = LonLat::new(0.0, 0.0).to_vector();
        assert!((origin - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);

        let east = LonLat::new(90.0, 0.0).to_vector();
        assert!((east - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);

        let pole = LonLat::new(45.0, 90.0).to_vector();
        assert!((pole - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_roundtrip() {
        for &(lon, lat) in &[(0.0, 0.0), (10.0, 45.0), (-120.0, -33.5), (179.5, 88.0)] {
            let p = LonLat::new(lon, lat);
            let back = LonLat::from_vector(&p.to_vector());
            assert!(
                (back.lon - lon).abs() < 1e-9 && (back.lat - lat).abs() < 1e-9,
                "roundtrip failed for ({}, {}): got ({}, {})",
                lon,
                lat,
                back.lon,
                back.lat
            );
        }
    }

    #[test]
    fn test_normalized() {
        assert_eq!(LonLat::new(370.0, 0.0).normalized().lon, 10.0);
        assert_eq!(LonLat::new(-190.0, 0.0).normalized().lon, 170.0);
        assert_eq!(LonLat::new(180.0, 0.0).normalized().lon, -180.0);
    }
}
