//! Source raster rectangles and sample buffers.

use serde::{Deserialize, Serialize};

/// A rectangular sub-region of the native source raster.
///
/// Lines run top-to-bottom, samples left-to-right, matching the raster's
/// native pixel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    /// First line (row) of the region within the full raster.
    pub line_offset: usize,
    /// First sample (column) of the region within the full raster.
    pub sample_offset: usize,
    /// Number of lines in the region.
    pub lines: usize,
    /// Number of samples in the region.
    pub samples: usize,
}

impl PixelRect {
    /// Create a new pixel rectangle.
    pub fn new(line_offset: usize, sample_offset: usize, lines: usize, samples: usize) -> Self {
        Self {
            line_offset,
            sample_offset,
            lines,
            samples,
        }
    }

    /// A rectangle covering a full raster of the given size.
    pub fn whole(lines: usize, samples: usize) -> Self {
        Self::new(0, 0, lines, samples)
    }

    /// Total pixel count.
    pub fn len(&self) -> usize {
        self.lines * self.samples
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.lines == 0 || self.samples == 0
    }

    /// One line past the last line of the region.
    pub fn line_end(&self) -> usize {
        self.line_offset + self.lines
    }

    /// One sample past the last sample of the region.
    pub fn sample_end(&self) -> usize {
        self.sample_offset + self.samples
    }

    /// Check if a full-raster (line, sample) coordinate falls inside.
    pub fn contains(&self, line: usize, sample: usize) -> bool {
        line >= self.line_offset
            && line < self.line_end()
            && sample >= self.sample_offset
            && sample < self.sample_end()
    }
}

/// A rectangular buffer of f32 samples in row-major order.
///
/// NaN marks pixels with no data; consumers treat them as transparent.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl PixelBuffer {
    /// Create a buffer filled with NaN (no data).
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![f32::NAN; width * height],
        }
    }

    /// Create a buffer from existing data.
    ///
    /// Returns None if the data length does not match the dimensions.
    pub fn from_data(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Get the sample at (col, row).
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Set the sample at (col, row). Out-of-range writes are ignored.
    pub fn set(&mut self, col: usize, row: usize, value: f32) {
        if col < self.width && row < self.height {
            if let Some(slot) = self.data.get_mut(row * self.width + col) {
                *slot = value;
            }
        }
    }

    /// Whether every sample is NaN.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|v| v.is_nan())
    }
}
