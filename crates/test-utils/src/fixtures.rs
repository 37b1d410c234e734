//! Scripted in-memory pixel provider for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use geometry::LonLat;
use stamp_common::{PixelBuffer, PixelRect, StampError, StampResult};
use stamp_engine::{GeometrySpec, PixelProvider};

/// An in-memory provider serving a synthetic full-resolution raster.
///
/// Counts pixel fetches so tests can assert cache behavior, and can be
/// scripted to fail or stall to exercise the soft-failure paths.
pub struct SyntheticProvider {
    corners: [LonLat; 4],
    tile_geometry: Option<(usize, usize, Vec<[LonLat; 4]>)>,
    lines: usize,
    samples: usize,
    params: Mutex<HashMap<String, String>>,
    data: Vec<f32>,
    fetch_count: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Duration>,
}

impl SyntheticProvider {
    /// Create a provider for a raster with the given whole-image corners
    /// (SW, SE, NE, NW as (lon, lat) degrees) and full-resolution data in
    /// row-major order, line 0 first.
    pub fn new(corners: [(f64, f64); 4], lines: usize, samples: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), lines * samples, "data must be lines × samples");
        Self {
            corners: [
                LonLat::new(corners[0].0, corners[0].1),
                LonLat::new(corners[1].0, corners[1].1),
                LonLat::new(corners[2].0, corners[2].1),
                LonLat::new(corners[3].0, corners[3].1),
            ],
            tile_geometry: None,
            lines,
            samples,
            params: Mutex::new(HashMap::new()),
            data,
            fetch_count: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Add a projection parameter.
    pub fn with_param(self, key: &str, value: &str) -> Self {
        self.params
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Declare the stamp numeric with an ignore value and units.
    pub fn with_numeric(self, ignore_value: f32, units: &str) -> Self {
        self.with_param("numeric", "true")
            .with_param("ignore_value", &ignore_value.to_string())
            .with_param("units", units)
    }

    /// Supply exact per-tile corner geometry.
    pub fn with_tile_geometry(mut self, rows: usize, cols: usize, corners: Vec<[LonLat; 4]>) -> Self {
        self.tile_geometry = Some((rows, cols, corners));
        self
    }

    /// Script subsequent fetches to fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Script subsequent fetches to stall for the given duration.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Number of pixel fetches served (or attempted) so far.
    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PixelProvider for SyntheticProvider {
    async fn geometry(&self, _id: &str) -> StampResult<GeometrySpec> {
        if let Some((rows, cols, corners)) = &self.tile_geometry {
            return Ok(GeometrySpec::PerTile {
                rows: *rows,
                cols: *cols,
                corners: corners.clone(),
            });
        }
        Ok(GeometrySpec::WholeImage(self.corners))
    }

    async fn native_size(&self, _id: &str) -> StampResult<(usize, usize)> {
        Ok((self.lines, self.samples))
    }

    async fn projection_params(&self, _id: &str) -> StampResult<HashMap<String, String>> {
        Ok(self.params.lock().unwrap().clone())
    }

    async fn read_pixels(&self, id: &str, rect: PixelRect, _ppd: f64) -> StampResult<PixelBuffer> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StampError::ProviderUnavailable(id.to_string()));
        }

        // Serve the crop at native resolution; the engine handles any
        // buffer density.
        let lines = rect.lines.min(self.lines.saturating_sub(rect.line_offset));
        let samples = rect
            .samples
            .min(self.samples.saturating_sub(rect.sample_offset));
        if lines == 0 || samples == 0 {
            return Err(StampError::ProviderUnavailable(format!(
                "rect outside raster: {:?}",
                rect
            )));
        }

        let mut data = Vec::with_capacity(lines * samples);
        for line in rect.line_offset..rect.line_offset + lines {
            let start = line * self.samples + rect.sample_offset;
            data.extend_from_slice(&self.data[start..start + samples]);
        }
        Ok(PixelBuffer::from_data(samples, lines, data).expect("crop dimensions match"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_corners() -> [(f64, f64); 4] {
        [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]
    }

    #[tokio::test]
    async fn test_serves_crops() {
        let data = crate::create_test_grid(10, 10);
        let provider = SyntheticProvider::new(unit_corners(), 10, 10, data);

        let buf = provider
            .read_pixels("s", PixelRect::new(2, 3, 4, 5), 0.0)
            .await
            .unwrap();
        assert_eq!((buf.width, buf.height), (5, 4));
        // col=3, row=2 of the full raster is the crop origin.
        assert_eq!(buf.get(0, 0), Some(3002.0));
        assert_eq!(provider.fetches(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let data = crate::create_test_grid(4, 4);
        let provider = SyntheticProvider::new(unit_corners(), 4, 4, data);
        provider.set_failing(true);
        assert!(provider
            .read_pixels("s", PixelRect::whole(4, 4), 0.0)
            .await
            .is_err());
        assert_eq!(provider.fetches(), 1);
    }
}
