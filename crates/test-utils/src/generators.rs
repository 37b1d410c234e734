//! Test data generators for creating synthetic stamp-like data.
//!
//! These generators create predictable, verifiable sample patterns that
//! can be used across the test suite.

use stamp_common::PixelBuffer;

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written
/// correctly by checking that grid[row][col] == col * 1000 + row.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a test grid as a [`PixelBuffer`].
pub fn create_test_buffer(width: usize, height: usize) -> PixelBuffer {
    PixelBuffer::from_data(width, height, create_test_grid(width, height))
        .expect("generator dimensions always match")
}

/// Creates a temperature-like numeric grid in Kelvin.
///
/// Values run from about 250K (top-left) to 310K (bottom-right),
/// a gradient similar to real remotely-sensed data.
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f32 / width.max(1) as f32;
            let y_factor = row as f32 / height.max(1) as f32;
            let temp = 250.0 + (x_factor * 30.0) + (y_factor * 30.0);
            data.push(temp);
        }
    }
    data
}

/// Creates a grid of constant brightness with a sprinkling of no-data
/// holes: every `hole_stride`-th sample is the given sentinel.
pub fn create_holed_grid(
    width: usize,
    height: usize,
    brightness: f32,
    sentinel: f32,
    hole_stride: usize,
) -> Vec<f32> {
    (0..width * height)
        .map(|i| {
            if hole_stride > 0 && i % hole_stride == 0 {
                sentinel
            } else {
                brightness
            }
        })
        .collect()
}
