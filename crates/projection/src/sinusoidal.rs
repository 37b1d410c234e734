//! Sinusoidal (equal-area) source projection.
//!
//! Lines map linearly to latitude; samples map to longitude scaled by
//! the cosine of the latitude, so rows shrink toward the poles.

use geometry::LonLat;

/// Sinusoidal projection parameters.
#[derive(Debug, Clone)]
pub struct Sinusoidal {
    /// Center longitude in degrees.
    pub center_lon: f64,
    /// Pixels per degree of latitude.
    pub scale: f64,
    /// Line coordinate of the equator.
    pub line_offset: f64,
    /// Sample coordinate of the center longitude.
    pub sample_offset: f64,
    /// Native sample count, when known. Enables the antimeridian
    /// re-derivation in [`Sinusoidal::inverse`].
    pub samples: Option<usize>,
}

impl Sinusoidal {
    /// Create the projection. Returns None for a non-positive scale.
    pub fn new(
        center_lon: f64,
        scale: f64,
        line_offset: f64,
        sample_offset: f64,
        samples: Option<usize>,
    ) -> Option<Self> {
        if !(scale > 0.0) {
            return None;
        }
        Some(Self {
            center_lon,
            scale,
            line_offset,
            sample_offset,
            samples,
        })
    }

    /// Map a source pixel to geodetic coordinates.
    pub fn forward(&self, line: f64, sample: f64) -> LonLat {
        let lat = (self.line_offset - line) / self.scale;
        let cos_lat = lat.to_radians().cos();
        if cos_lat < 1e-9 {
            // Polar row: every sample collapses onto the center meridian.
            return LonLat::new(self.center_lon, lat);
        }
        let lon = self.center_lon + (sample - self.sample_offset) / (self.scale * cos_lat);
        LonLat::new(lon, lat)
    }

    /// Map geodetic coordinates to a source pixel.
    ///
    /// Near the antimeridian a normalized longitude difference can land
    /// the sample a whole world-width outside the raster even though the
    /// pixel exists; such requests are re-derived with the center
    /// longitude shifted by ±360° and the candidate inside the raster
    /// wins.
    pub fn inverse(&self, lon: f64, lat: f64) -> (f64, f64) {
        let line = self.line_offset - lat * self.scale;
        let cos_lat = lat.to_radians().cos();
        if cos_lat < 1e-9 {
            return (line, self.sample_offset);
        }

        let mut dlon = lon - self.center_lon;
        while dlon >= 180.0 {
            dlon -= 360.0;
        }
        while dlon < -180.0 {
            dlon += 360.0;
        }

        let sample_at = |d: f64| self.sample_offset + d * self.scale * cos_lat;
        let sample = sample_at(dlon);

        if let Some(samples) = self.samples {
            let width = samples as f64;
            if sample < 0.0 || sample >= width {
                // Re-derive with a shifted center before declaring the
                // request out of bounds.
                for shifted in [dlon + 360.0, dlon - 360.0] {
                    let candidate = sample_at(shifted);
                    if candidate >= 0.0 && candidate < width {
                        return (line, candidate);
                    }
                }
            }
        }

        (line, sample)
    }
}
