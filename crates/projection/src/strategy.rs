//! Source projection dispatch.
//!
//! One stamp carries one strategy, built once from its parsed parameters
//! and the whole-image geometry. Kinds whose parameters turn out to be
//! insufficient degrade to `Unprojected` with a diagnostic instead of
//! failing the stamp.

use geometry::LonLat;
use tracing::warn;

use crate::cylindrical::CornerCylindrical;
use crate::equirectangular::Equirectangular;
use crate::params::{ProjectionKind, ProjectionParams};
use crate::polar::PolarStereographic;
use crate::sinusoidal::Sinusoidal;

/// The projection strategy of one source raster.
#[derive(Debug, Clone)]
pub enum SourceProjection {
    /// Corner-interpolated on the sphere: the geometry cell's inverse
    /// mapping is the only available path to source pixels.
    Unprojected,
    Cylindrical(CornerCylindrical),
    Equirectangular(Equirectangular),
    PolarStereographic(PolarStereographic),
    Sinusoidal(Sinusoidal),
}

impl SourceProjection {
    /// Build a strategy from parsed parameters, the whole-image corner
    /// coordinates (SW, SE, NE, NW), and the native raster size.
    ///
    /// Malformed or incomplete parameters for the declared kind fall
    /// back to `Unprojected` rather than aborting the stamp.
    pub fn from_params(
        params: &ProjectionParams,
        corners: [LonLat; 4],
        lines: usize,
        samples: usize,
    ) -> Self {
        let built = match params.kind {
            ProjectionKind::Unprojected => Some(Self::Unprojected),
            ProjectionKind::Cylindrical => {
                CornerCylindrical::new(corners, lines, samples).map(Self::Cylindrical)
            }
            ProjectionKind::Equirectangular => Equirectangular::new(
                params.center_lon,
                params.center_lat,
                params.scale,
                params.line_offset,
                params.sample_offset,
            )
            .map(Self::Equirectangular),
            ProjectionKind::PolarStereographic => PolarStereographic::new(
                params.center_lon,
                params.center_lat >= 0.0,
                params.scale,
                params.line_offset,
                params.sample_offset,
            )
            .map(Self::PolarStereographic),
            ProjectionKind::Sinusoidal => Sinusoidal::new(
                params.center_lon,
                params.scale,
                params.line_offset,
                params.sample_offset,
                Some(samples),
            )
            .map(Self::Sinusoidal),
        };

        built.unwrap_or_else(|| {
            warn!(
                kind = %params.kind,
                scale = params.scale,
                "incomplete projection parameters, falling back to unprojected"
            );
            Self::Unprojected
        })
    }

    /// The kind this strategy implements.
    pub fn kind(&self) -> ProjectionKind {
        match self {
            Self::Unprojected => ProjectionKind::Unprojected,
            Self::Cylindrical(_) => ProjectionKind::Cylindrical,
            Self::Equirectangular(_) => ProjectionKind::Equirectangular,
            Self::PolarStereographic(_) => ProjectionKind::PolarStereographic,
            Self::Sinusoidal(_) => ProjectionKind::Sinusoidal,
        }
    }

    /// Map a source pixel to geodetic coordinates. None for strategies
    /// without a closed-form forward mapping.
    pub fn forward(&self, line: f64, sample: f64) -> Option<LonLat> {
        match self {
            Self::Unprojected => None,
            Self::Cylindrical(p) => Some(p.forward(line, sample)),
            Self::Equirectangular(p) => Some(p.forward(line, sample)),
            Self::PolarStereographic(p) => Some(p.forward(line, sample)),
            Self::Sinusoidal(p) => Some(p.forward(line, sample)),
        }
    }

    /// Map geodetic coordinates directly to a source pixel. None when
    /// the strategy has no closed-form inverse (the caller then goes
    /// through the geometry cell) or the point is not representable.
    pub fn inverse(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match self {
            Self::Unprojected | Self::Cylindrical(_) => None,
            Self::Equirectangular(p) => Some(p.inverse(lon, lat)),
            Self::PolarStereographic(p) => p.inverse(lon, lat),
            Self::Sinusoidal(p) => Some(p.inverse(lon, lat)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_corners() -> [LonLat; 4] {
        [
            LonLat::new(0.0, 0.0),
            LonLat::new(10.0, 0.0),
            LonLat::new(10.0, 10.0),
            LonLat::new(0.0, 10.0),
        ]
    }

    #[test]
    fn test_incomplete_params_fall_back() {
        // Equirectangular declared but scale missing (0.0 default).
        let params = ProjectionParams {
            kind: ProjectionKind::Equirectangular,
            ..Default::default()
        };
        let strategy = SourceProjection::from_params(&params, box_corners(), 100, 100);
        assert_eq!(strategy.kind(), ProjectionKind::Unprojected);
    }

    #[test]
    fn test_valid_params_build_declared_kind() {
        let params = ProjectionParams {
            kind: ProjectionKind::PolarStereographic,
            center_lat: 90.0,
            scale: 10.0,
            line_offset: 500.0,
            sample_offset: 500.0,
            ..Default::default()
        };
        let strategy = SourceProjection::from_params(&params, box_corners(), 1000, 1000);
        assert_eq!(strategy.kind(), ProjectionKind::PolarStereographic);
        assert!(strategy.inverse(0.0, 89.0).is_some());
    }

    #[test]
    fn test_unprojected_has_no_closed_forms() {
        let strategy =
            SourceProjection::from_params(&ProjectionParams::default(), box_corners(), 10, 10);
        assert!(strategy.forward(0.0, 0.0).is_none());
        assert!(strategy.inverse(5.0, 5.0).is_none());
    }

    #[test]
    fn test_cylindrical_forward_only() {
        let params = ProjectionParams {
            kind: ProjectionKind::Cylindrical,
            ..Default::default()
        };
        let strategy = SourceProjection::from_params(&params, box_corners(), 11, 11);
        assert_eq!(strategy.kind(), ProjectionKind::Cylindrical);
        assert!(strategy.forward(5.0, 5.0).is_some());
        assert!(strategy.inverse(5.0, 5.0).is_none());
    }
}
