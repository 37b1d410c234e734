//! Equirectangular (simple cylindrical) source projection.
//!
//! Lines map linearly to latitude and samples to longitude, with the
//! longitude scale taken at the projection's center latitude.

use geometry::LonLat;

/// Equirectangular projection parameters.
#[derive(Debug, Clone)]
pub struct Equirectangular {
    /// Center longitude in degrees.
    pub center_lon: f64,
    /// Center latitude in degrees; sets the longitude pixel scale.
    pub center_lat: f64,
    /// Pixels per degree of latitude.
    pub scale: f64,
    /// Line coordinate of the center latitude.
    pub line_offset: f64,
    /// Sample coordinate of the center longitude.
    pub sample_offset: f64,
    /// Cosine of the center latitude, cached at construction.
    cos_center_lat: f64,
}

impl Equirectangular {
    /// Create the projection. Returns None when the scale is not positive
    /// or the center latitude sits on a pole (degenerate longitude scale).
    pub fn new(
        center_lon: f64,
        center_lat: f64,
        scale: f64,
        line_offset: f64,
        sample_offset: f64,
    ) -> Option<Self> {
        let cos_center_lat = center_lat.to_radians().cos();
        if !(scale > 0.0) || cos_center_lat < 1e-9 {
            return None;
        }
        Some(Self {
            center_lon,
            center_lat,
            scale,
            line_offset,
            sample_offset,
            cos_center_lat,
        })
    }

    /// Map a source pixel to geodetic coordinates.
    pub fn forward(&self, line: f64, sample: f64) -> LonLat {
        let lat = self.center_lat + (self.line_offset - line) / self.scale;
        let lon =
            self.center_lon + (sample - self.sample_offset) / (self.scale * self.cos_center_lat);
        LonLat::new(lon, lat)
    }

    /// Map geodetic coordinates to a source pixel. The longitude
    /// difference is normalized into [-180, 180) so requests from any
    /// wrap repetition resolve to the same pixel.
    pub fn inverse(&self, lon: f64, lat: f64) -> (f64, f64) {
        let mut dlon = lon - self.center_lon;
        while dlon >= 180.0 {
            dlon -= 360.0;
        }
        while dlon < -180.0 {
            dlon += 360.0;
        }
        let sample = self.sample_offset + dlon * self.scale * self.cos_center_lat;
        let line = self.line_offset - (lat - self.center_lat) * self.scale;
        (line, sample)
    }
}
