//! Polar stereographic source projection.
//!
//! Pixels are laid out on the stereographic plane tangent at a pole. The
//! center-longitude meridian runs toward the bottom of a north-polar
//! image and toward the top of a south-polar one.

use geometry::LonLat;

/// Radial distance below which a pixel is treated as sitting on the pole.
const POLE_EPS: f64 = 1e-9;

/// Polar stereographic projection parameters.
#[derive(Debug, Clone)]
pub struct PolarStereographic {
    /// Longitude of the oriented meridian, degrees.
    pub center_lon: f64,
    /// True for the north pole, false for the south.
    pub north: bool,
    /// Pixels per degree of arc at the pole.
    pub scale: f64,
    /// Line coordinate of the pole.
    pub line_offset: f64,
    /// Sample coordinate of the pole.
    pub sample_offset: f64,
    /// Radial constant: pixels = k·tan(colatitude / 2).
    k: f64,
}

impl PolarStereographic {
    /// Create the projection. Returns None for a non-positive scale.
    pub fn new(
        center_lon: f64,
        north: bool,
        scale: f64,
        line_offset: f64,
        sample_offset: f64,
    ) -> Option<Self> {
        if !(scale > 0.0) {
            return None;
        }
        // Near the pole r ≈ scale · colatitude_degrees.
        let k = 2.0 * scale * 180.0 / std::f64::consts::PI;
        Some(Self {
            center_lon,
            north,
            scale,
            line_offset,
            sample_offset,
            k,
        })
    }

    /// Map a source pixel to geodetic coordinates.
    ///
    /// A sample at the exact pole has no defined longitude; the center
    /// longitude is returned rather than dividing by a zero radius.
    pub fn forward(&self, line: f64, sample: f64) -> LonLat {
        let x = sample - self.sample_offset;
        let y = self.line_offset - line;

        let r = x.hypot(y);
        if r < POLE_EPS {
            let lat = if self.north { 90.0 } else { -90.0 };
            return LonLat::new(self.center_lon, lat);
        }

        let colat = 2.0 * (r / self.k).atan().to_degrees();
        if self.north {
            let theta = x.atan2(-y).to_degrees();
            LonLat::new(self.center_lon + theta, 90.0 - colat)
        } else {
            let theta = x.atan2(y).to_degrees();
            LonLat::new(self.center_lon + theta, -90.0 + colat)
        }
    }

    /// Map geodetic coordinates to a source pixel.
    ///
    /// Returns None for points on or beyond the opposite hemisphere's
    /// pole, where the radial term diverges.
    pub fn inverse(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let colat = if self.north { 90.0 - lat } else { 90.0 + lat };
        if colat >= 180.0 - POLE_EPS {
            return None;
        }

        let r = self.k * (colat.to_radians() / 2.0).tan();
        let theta = (lon - self.center_lon).to_radians();
        let (x, y) = if self.north {
            (r * theta.sin(), -r * theta.cos())
        } else {
            (r * theta.sin(), r * theta.cos())
        };

        Some((self.line_offset - y, self.sample_offset + x))
    }
}
