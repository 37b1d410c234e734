//! Pixel semantics: visual imagery vs numeric sample planes.

use serde::{Deserialize, Serialize};

/// How a stamp's samples are interpreted, decided once when the stamp's
/// projection parameters are read and carried explicitly from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PixelSemantics {
    /// Visual imagery: samples are brightness levels. Pure black is
    /// treated as transparent when compositing.
    Visual,
    /// Numeric data: samples are physical values routed through a
    /// value-to-color mapping with autoscaled bounds.
    Numeric {
        /// Reserved sentinel meaning "no data"; rendered transparent.
        ignore_value: Option<f32>,
        /// Physical units, e.g. "K" or "m/s".
        units: String,
    },
}

impl PixelSemantics {
    /// Whether samples carry numeric values rather than brightness.
    pub fn is_numeric(&self) -> bool {
        matches!(self, PixelSemantics::Numeric { .. })
    }

    /// Whether a sample should be treated as "no data" under these
    /// semantics. NaN is always no-data; numeric stamps additionally
    /// reserve their ignore value.
    pub fn is_no_data(&self, value: f32) -> bool {
        if value.is_nan() {
            return true;
        }
        match self {
            PixelSemantics::Visual => false,
            PixelSemantics::Numeric { ignore_value, .. } => {
                ignore_value.map(|iv| value == iv).unwrap_or(false)
            }
        }
    }

    /// Short tag used in cache keys so visual and numeric renderings of
    /// the same source never collide.
    pub fn cache_tag(&self) -> &'static str {
        match self {
            PixelSemantics::Visual => "vis",
            PixelSemantics::Numeric { .. } => "num",
        }
    }
}

impl Default for PixelSemantics {
    fn default() -> Self {
        PixelSemantics::Visual
    }
}
