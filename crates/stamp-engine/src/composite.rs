//! Compositing projected tiles onto caller-owned targets.
//!
//! Two target kinds exist: a color [`Surface`] (RGBA, what the view
//! layer displays) and a raw [`SampleTarget`] (f32 samples, used by
//! investigate/chart tooling). Visual stamps composite with ignore-black
//! transparency; numeric stamps route samples through the gradient with
//! autoscale bounds, treating the ignore value and NaN as transparent.

use stamp_common::{PixelSemantics, WorldExtent};

use crate::colormap::{numeric_color, visual_color, Color};

/// A caller-owned RGBA drawing target covering a world extent.
#[derive(Debug, Clone)]
pub struct Surface {
    pub width: usize,
    pub height: usize,
    pub extent: WorldExtent,
    pixels: Vec<u8>,
}

impl Surface {
    /// Allocate a transparent surface covering `extent` at the given
    /// pixel density.
    pub fn new(extent: WorldExtent, ppd: f64) -> Self {
        let (width, height) = extent.pixel_size(ppd);
        Self {
            width,
            height,
            extent,
            pixels: vec![0; width * height * 4],
        }
    }

    /// World coordinate of a pixel center.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.extent.min_x + (col as f64 + 0.5) * self.extent.width() / self.width as f64;
        let y = self.extent.max_y - (row as f64 + 0.5) * self.extent.height() / self.height as f64;
        (x, y)
    }

    /// Pixel column range intersecting a world X range.
    pub fn col_range(&self, min_x: f64, max_x: f64) -> std::ops::Range<usize> {
        let scale = self.width as f64 / self.extent.width();
        let lo = ((min_x - self.extent.min_x) * scale).floor().max(0.0) as usize;
        let hi = ((max_x - self.extent.min_x) * scale).ceil().min(self.width as f64) as usize;
        lo..hi.max(lo)
    }

    /// Pixel row range intersecting a world Y range.
    pub fn row_range(&self, min_y: f64, max_y: f64) -> std::ops::Range<usize> {
        let scale = self.height as f64 / self.extent.height();
        let lo = ((self.extent.max_y - max_y) * scale).floor().max(0.0) as usize;
        let hi = ((self.extent.max_y - min_y) * scale).ceil().min(self.height as f64) as usize;
        lo..hi.max(lo)
    }

    /// Write one pixel.
    pub fn put(&mut self, col: usize, row: usize, color: Color) {
        if col >= self.width || row >= self.height {
            return;
        }
        let idx = (row * self.width + col) * 4;
        self.pixels[idx] = color.r;
        self.pixels[idx + 1] = color.g;
        self.pixels[idx + 2] = color.b;
        self.pixels[idx + 3] = color.a;
    }

    /// Read one pixel back.
    pub fn get(&self, col: usize, row: usize) -> Option<Color> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let idx = (row * self.width + col) * 4;
        Some(Color::new(
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ))
    }

    /// Whether a pixel has been drawn opaque.
    pub fn is_opaque(&self, col: usize, row: usize) -> bool {
        self.get(col, row).map(|c| c.a > 0).unwrap_or(false)
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }
}

/// Composite one sample onto a surface pixel under the given semantics.
///
/// No-data samples (NaN, the numeric ignore value, visual pure black)
/// leave the destination untouched.
pub fn composite_sample(
    surface: &mut Surface,
    col: usize,
    row: usize,
    value: f32,
    semantics: &PixelSemantics,
    bounds: (f32, f32),
) {
    if semantics.is_no_data(value) {
        return;
    }
    let color = match semantics {
        PixelSemantics::Visual => {
            // Ignore-black: pure black composites as transparent.
            if value == 0.0 {
                return;
            }
            visual_color(value)
        }
        PixelSemantics::Numeric { .. } => numeric_color(value, bounds.0, bounds.1),
    };
    surface.put(col, row, color);
}

/// A caller-supplied raw sample target.
///
/// Destination samples start as NaN. A previously-written valid value is
/// never overwritten: first valid wins across overlapping stamps, and an
/// ignore value never replaces data.
#[derive(Debug, Clone)]
pub struct SampleTarget {
    pub width: usize,
    pub height: usize,
    pub extent: WorldExtent,
    pub data: Vec<f32>,
}

impl SampleTarget {
    /// Allocate an all-NaN target covering `extent` at the given density.
    pub fn new(extent: WorldExtent, ppd: f64) -> Self {
        let (width, height) = extent.pixel_size(ppd);
        Self {
            width,
            height,
            extent,
            data: vec![f32::NAN; width * height],
        }
    }

    /// Write a sample under first-valid-wins rules. Out-of-range
    /// coordinates are skipped per-pixel rather than failing the tile.
    pub fn write(&mut self, col: usize, row: usize, value: f32, semantics: &PixelSemantics) {
        if col >= self.width || row >= self.height {
            return;
        }
        if semantics.is_no_data(value) {
            return;
        }
        let slot = &mut self.data[row * self.width + col];
        if slot.is_nan() {
            *slot = value;
        }
    }

    /// Read a sample back.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(self.data[row * self.width + col])
    }
}

/// Even-odd point-in-polygon test in world coordinates.
///
/// The polygon is the stamp outline, already translated by the wrap
/// offset in effect for the frame being drawn.
pub fn point_in_polygon(x: f64, y: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > y) != (yj > y) {
            let x_cross = xi + (y - yi) / (yj - yi) * (xj - xi);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
