//! Projection parameters as declared by a pixel provider.
//!
//! Providers describe a stamp's projection as a flat key/value map. The
//! parse here is forgiving: anything missing or malformed degrades to the
//! unprojected corner-interpolated strategy rather than failing the
//! stamp.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use stamp_common::PixelSemantics;
use tracing::warn;

/// The map-projection kinds a provider can declare for a source raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Corner-interpolated on the sphere; no closed-form mapping.
    #[default]
    Unprojected,
    /// Corner-interpolated in lon/lat space.
    Cylindrical,
    Equirectangular,
    PolarStereographic,
    Sinusoidal,
}

impl ProjectionKind {
    /// Parse from a provider string (case-insensitive). Unknown kinds
    /// fall back to Unprojected.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cylindrical" => Self::Cylindrical,
            "equirectangular" | "simple_cylindrical" => Self::Equirectangular,
            "polar_stereographic" | "polar" => Self::PolarStereographic,
            "sinusoidal" => Self::Sinusoidal,
            "unprojected" => Self::Unprojected,
            other => {
                warn!(kind = other, "unknown projection kind, treating as unprojected");
                Self::Unprojected
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprojected => "unprojected",
            Self::Cylindrical => "cylindrical",
            Self::Equirectangular => "equirectangular",
            Self::PolarStereographic => "polar_stereographic",
            Self::Sinusoidal => "sinusoidal",
        }
    }
}

impl std::fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed projection parameters for one stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    /// Declared projection kind.
    pub kind: ProjectionKind,
    /// Center longitude, degrees.
    pub center_lon: f64,
    /// Center latitude, degrees. Sign selects the pole for
    /// polar-stereographic sources.
    pub center_lat: f64,
    /// Pixels per degree of the native raster.
    pub scale: f64,
    /// Body radius in kilometers (metadata; the mappings work in
    /// angular units).
    pub radius: f64,
    /// Line coordinate of the projection center.
    pub line_offset: f64,
    /// Sample coordinate of the projection center.
    pub sample_offset: f64,
    /// Reserved "no data" sample value.
    pub ignore_value: Option<f32>,
    /// Samples are numeric values rather than brightness.
    pub numeric: bool,
    /// Physical units for numeric samples.
    pub units: String,
    /// Server-suggested autoscale bounds.
    pub min_hint: Option<f32>,
    pub max_hint: Option<f32>,
    /// Server-declared full-resolution pixel density override.
    pub max_ppd: Option<f64>,
    /// Clip rendering to the stamp's outline polygon.
    pub clip_to_path: bool,
    /// False when the provider regenerates pixels non-deterministically;
    /// disables both cache read and write for this stamp.
    pub cacheable: bool,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            kind: ProjectionKind::Unprojected,
            center_lon: 0.0,
            center_lat: 0.0,
            scale: 0.0,
            radius: 0.0,
            line_offset: 0.0,
            sample_offset: 0.0,
            ignore_value: None,
            numeric: false,
            units: String::new(),
            min_hint: None,
            max_hint: None,
            max_ppd: None,
            clip_to_path: false,
            cacheable: true,
        }
    }
}

impl ProjectionParams {
    /// Parse parameters from a provider key/value map.
    ///
    /// Every field is optional; missing or malformed values take the
    /// defaults above, and strategy construction later decides whether
    /// the surviving numbers are sufficient for the declared kind.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut params = Self::default();

        if let Some(kind) = map.get("projection") {
            params.kind = ProjectionKind::from_str(kind);
        }
        params.center_lon = get_f64(map, "center_longitude").unwrap_or(params.center_lon);
        params.center_lat = get_f64(map, "center_latitude").unwrap_or(params.center_lat);
        params.scale = get_f64(map, "map_scale").unwrap_or(params.scale);
        params.radius = get_f64(map, "radius").unwrap_or(params.radius);
        params.line_offset = get_f64(map, "line_offset").unwrap_or(params.line_offset);
        params.sample_offset = get_f64(map, "sample_offset").unwrap_or(params.sample_offset);
        params.ignore_value = get_f64(map, "ignore_value").map(|v| v as f32);
        params.numeric = get_bool(map, "numeric");
        params.units = map.get("units").cloned().unwrap_or_default();
        params.min_hint = get_f64(map, "min_value").map(|v| v as f32);
        params.max_hint = get_f64(map, "max_value").map(|v| v as f32);
        params.max_ppd = get_f64(map, "max_ppd").filter(|v| *v > 0.0);
        params.clip_to_path = get_bool(map, "clip_to_path");
        params.cacheable = !get_bool(map, "no_cache");

        params
    }

    /// The pixel semantics this stamp renders under, decided once here
    /// and carried explicitly on the image aggregate.
    pub fn semantics(&self) -> PixelSemantics {
        if self.numeric {
            PixelSemantics::Numeric {
                ignore_value: self.ignore_value,
                units: self.units.clone(),
            }
        } else {
            PixelSemantics::Visual
        }
    }
}

fn get_f64(map: &HashMap<String, String>, key: &str) -> Option<f64> {
    let raw = map.get(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = raw.as_str(), "unparseable projection parameter");
            None
        }
    }
}

fn get_bool(map: &HashMap<String, String>, key: &str) -> bool {
    map.get(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}
