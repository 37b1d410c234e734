//! The stamp image aggregate: tiling strategy and render orchestration.
//!
//! A `StampImage` owns an ordered array of frames tiling the source
//! raster, rebuilt whenever the render resolution or the working
//! projection changes. Rendering selects the frames visible under any
//! world-wrap repetition of the requested extent, projects them, and
//! composites onto a caller-owned target, running the bounded autoscale
//! convergence loop for numeric stamps.

use std::sync::Arc;

use geometry::{GeometryCell, LonLat};
use nalgebra::Vector3;
use projection::{ProjectionParams, SourceProjection, WorkProjection};
use stamp_common::{PixelRect, PixelSemantics, StampError, StampResult, WorldExtent};
use storage::{RenderPool, SourceCache, TileStore};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autoscale::Autoscale;
use crate::composite::{composite_sample, point_in_polygon, SampleTarget, Surface};
use crate::config::EngineConfig;
use crate::frame::{Frame, RenderContext};
use crate::provider::{GeometrySpec, PixelProvider};

/// A single numeric lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct PointValue {
    pub value: f32,
    /// Physical units for numeric stamps; empty for visual imagery.
    pub units: String,
}

/// Frame array and the configuration it was built for.
struct ImageState {
    work: WorkProjection,
    built_ppd: Option<f64>,
    frames: Vec<Arc<Frame>>,
}

/// One remotely-sensed image and its tiling.
pub struct StampImage {
    id: String,
    provider: Arc<dyn PixelProvider>,
    store: Arc<TileStore>,
    source_cache: Arc<SourceCache>,
    pool: RenderPool,
    config: EngineConfig,

    native_lines: usize,
    native_samples: usize,
    params: ProjectionParams,
    semantics: PixelSemantics,
    strategy: Arc<SourceProjection>,
    geometry: GeometrySpec,
    whole_cell: GeometryCell,
    max_ppd: f64,

    /// Frame array + projection configuration. Renders hold a read
    /// guard for a whole pass; rebuilds and invalidation take the write
    /// guard, so the two never interleave.
    state: RwLock<ImageState>,
    /// Serializes render passes: the autoscale convergence loop is not
    /// safe under concurrent mutation.
    render_lock: Mutex<()>,
    autoscale: Mutex<Autoscale>,
    /// Handles of deferred cache writes, awaitable by tests.
    pending_writes: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl StampImage {
    /// Load a stamp's metadata from the provider and build the image.
    ///
    /// Geometry and size failures are fatal for this image only; missing
    /// or malformed projection parameters degrade to the unprojected
    /// strategy.
    pub async fn open(
        id: impl Into<String>,
        provider: Arc<dyn PixelProvider>,
        store: Arc<TileStore>,
        source_cache: Arc<SourceCache>,
        pool: RenderPool,
        config: EngineConfig,
        work: WorkProjection,
    ) -> StampResult<Self> {
        let id = id.into();

        let geometry = provider.geometry(&id).await?;
        let (native_lines, native_samples) = provider.native_size(&id).await?;
        if native_lines == 0 || native_samples == 0 {
            return Err(StampError::NoSize(id));
        }

        let params = match provider.projection_params(&id).await {
            Ok(map) => ProjectionParams::from_map(&map),
            Err(e) => {
                warn!(id = %id, error = %e, "projection parameters unavailable, using defaults");
                ProjectionParams::default()
            }
        };

        let corners = geometry
            .whole_corners()
            .ok_or_else(|| StampError::NoGeometry(id.clone()))?;
        let whole_cell = GeometryCell::new([
            corners[0].to_vector(),
            corners[1].to_vector(),
            corners[2].to_vector(),
            corners[3].to_vector(),
        ]);

        let strategy = Arc::new(SourceProjection::from_params(
            &params,
            corners,
            native_lines,
            native_samples,
        ));
        let semantics = params.semantics();
        let max_ppd = params
            .max_ppd
            .unwrap_or_else(|| derive_max_ppd(&whole_cell, native_lines));

        let hint = match (params.min_hint, params.max_hint) {
            (Some(lo), Some(hi)) if lo < hi => Some((lo, hi)),
            _ => None,
        };

        info!(
            id = %id,
            lines = native_lines,
            samples = native_samples,
            kind = %strategy.kind(),
            max_ppd,
            "stamp opened"
        );

        Ok(Self {
            id,
            provider,
            store,
            source_cache,
            pool,
            config,
            native_lines,
            native_samples,
            params,
            semantics,
            strategy,
            geometry,
            whole_cell,
            max_ppd,
            state: RwLock::new(ImageState {
                work,
                built_ppd: None,
                frames: Vec::new(),
            }),
            render_lock: Mutex::new(()),
            autoscale: Mutex::new(Autoscale::new(hint)),
            pending_writes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Stamp identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Pixel semantics decided at construction.
    pub fn semantics(&self) -> &PixelSemantics {
        &self.semantics
    }

    /// Full-resolution-equivalent pixel density of the source.
    pub fn max_ppd(&self) -> f64 {
        self.max_ppd
    }

    /// Render the stamp onto a color surface.
    ///
    /// `cancelled` is checked between frame draws; once true the pass
    /// stops issuing further work. Frames whose pixels are not yet
    /// available render as absent and are retried on the next pass.
    pub async fn render(
        &self,
        surface: &mut Surface,
        ppd: f64,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> StampResult<()> {
        let _pass = self.render_lock.lock().await;
        self.ensure_built(ppd).await;

        let state = self.state.read().await;
        let ctx = self.context(state.work);

        let visible = Self::visible_in(&state, &surface.extent).await;
        if visible.is_empty() {
            return Ok(());
        }
        for (frame, _) in &visible {
            frame.clear_prefetch_marker().await;
        }

        let clip = if self.params.clip_to_path {
            Some(self.path_in(&state.work))
        } else {
            None
        };

        // Numeric stamps rerun the whole pass when a frame widens the
        // autoscale bounds: earlier frames were colored against stale
        // bounds. The restart count is bounded by visible + 1.
        let attempts = if self.semantics.is_numeric() {
            visible.len() + 1
        } else {
            1
        };

        for attempt in 0..attempts {
            let mut bounds_changed = false;
            for (frame, offset) in &visible {
                if cancelled() {
                    debug!(id = %self.id, "render cancelled between frames");
                    return Ok(());
                }
                bounds_changed |= self
                    .draw_frame(&ctx, frame, *offset, surface, ppd, clip.as_deref())
                    .await;
            }
            if !bounds_changed {
                break;
            }
            if attempt == attempts - 1 {
                warn!(
                    id = %self.id,
                    attempts,
                    "autoscale did not converge, proceeding with last bounds"
                );
            }
        }

        Ok(())
    }

    /// Render raw samples into a caller-supplied target under
    /// first-valid-wins rules. Used by investigate/chart tooling.
    pub async fn render_samples(
        &self,
        target: &mut SampleTarget,
        ppd: f64,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> StampResult<()> {
        let _pass = self.render_lock.lock().await;
        self.ensure_built(ppd).await;

        let state = self.state.read().await;
        let ctx = self.context(state.work);
        let visible = Self::visible_in(&state, &target.extent).await;

        for (frame, offset) in &visible {
            if cancelled() {
                return Ok(());
            }
            let Some((tile, tile_extent)) = frame.projected_tile(&ctx, ppd).await else {
                continue;
            };
            let draw = tile_extent.translated_x(*offset);
            let Some(vis) = draw.intersection(&target.extent) else {
                continue;
            };

            let x_scale = target.width as f64 / target.extent.width();
            let y_scale = target.height as f64 / target.extent.height();
            let col_lo = ((vis.min_x - target.extent.min_x) * x_scale).floor().max(0.0) as usize;
            let col_hi =
                (((vis.max_x - target.extent.min_x) * x_scale).ceil() as usize).min(target.width);
            let row_lo = ((target.extent.max_y - vis.max_y) * y_scale).floor().max(0.0) as usize;
            let row_hi =
                (((target.extent.max_y - vis.min_y) * y_scale).ceil() as usize).min(target.height);

            for row in row_lo..row_hi {
                for col in col_lo..col_hi {
                    let x = target.extent.min_x
                        + (col as f64 + 0.5) * target.extent.width() / target.width as f64;
                    let y = target.extent.max_y
                        - (row as f64 + 0.5) * target.extent.height() / target.height as f64;
                    if x < draw.min_x || x > draw.max_x || y < draw.min_y || y > draw.max_y {
                        continue;
                    }
                    let tcol = (((x - draw.min_x) / draw.width()) * tile.width as f64) as usize;
                    let trow = (((draw.max_y - y) / draw.height()) * tile.height as f64) as usize;
                    if let Some(value) = tile.get(tcol.min(tile.width - 1), trow.min(tile.height - 1))
                    {
                        target.write(col, row, value, &self.semantics);
                    }
                }
            }
        }

        Ok(())
    }

    /// Sample the stamp under a single world coordinate. Never cached.
    pub async fn sample_value(&self, x: f64, y: f64) -> Option<PointValue> {
        {
            let state = self.state.read().await;
            if state.built_ppd.is_none() {
                drop(state);
                self.ensure_built(self.max_ppd).await;
            }
        }

        let state = self.state.read().await;
        let ctx = self.context(state.work);
        let point = state.work.inverse(x, y);

        for frame in &state.frames {
            if let Some(value) = frame.sample_value(&ctx, point).await {
                if self.semantics.is_no_data(value) {
                    continue;
                }
                let units = match &self.semantics {
                    PixelSemantics::Numeric { units, .. } => units.clone(),
                    PixelSemantics::Visual => String::new(),
                };
                return Some(PointValue { value, units });
            }
        }
        None
    }

    /// The whole-image outline in world coordinates, continuity
    /// normalized across the ±360° seam. Used for hit-testing and clip
    /// computation.
    pub async fn path(&self) -> Vec<(f64, f64)> {
        let state = self.state.read().await;
        self.path_in(&state.work)
    }

    /// Switch to a new working projection. Projected tiles, frame
    /// bounds, and autoscale state all invalidate together; an in-flight
    /// render completes against the old state first (write guard).
    pub async fn invalidate_projection(&self, work: WorkProjection) {
        let mut state = self.state.write().await;
        state.work = work;
        state.built_ppd = None;
        for frame in &state.frames {
            frame.invalidate().await;
        }
        self.autoscale.lock().await.reset();
        debug!(id = %self.id, "projection invalidated");
    }

    /// Force a rebuild of the frame array for a new render resolution.
    pub async fn invalidate_resolution(&self, new_ppd: f64) {
        let mut state = self.state.write().await;
        for frame in &state.frames {
            frame.invalidate().await;
        }
        state.frames = self.build_frames(new_ppd);
        state.built_ppd = Some(new_ppd);
        self.autoscale.lock().await.reset();
        debug!(id = %self.id, ppd = new_ppd, "frame array rebuilt for new resolution");
    }

    /// Await every deferred cache write issued so far. Test hook; the
    /// render path never calls this.
    pub async fn flush_writes(&self) {
        let handles: Vec<_> = self.pending_writes.lock().await.drain(..).collect();
        let _ = futures::future::join_all(handles).await;
    }

    /// Source rectangles of the current frame array (row-major).
    pub async fn frame_layout(&self, ppd: f64) -> Vec<PixelRect> {
        self.ensure_built(ppd).await;
        let state = self.state.read().await;
        state.frames.iter().map(|f| f.rect()).collect()
    }

    /// Indices of frames visible under the extent, across wrap
    /// repetitions, deduplicated.
    pub async fn visible_frame_indices(&self, extent: &WorldExtent, ppd: f64) -> Vec<usize> {
        self.ensure_built(ppd).await;
        let state = self.state.read().await;
        let mut indices: Vec<usize> = Self::visible_in(&state, extent)
            .await
            .into_iter()
            .map(|(f, _)| f.index())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    fn context(&self, work: WorkProjection) -> RenderContext {
        RenderContext {
            provider: Arc::clone(&self.provider),
            source_id: self.id.clone(),
            store: Arc::clone(&self.store),
            source_cache: Arc::clone(&self.source_cache),
            pool: self.pool.clone(),
            work,
            strategy: Arc::clone(&self.strategy),
            semantics: self.semantics.clone(),
            cacheable: self.params.cacheable,
            fetch_timeout: self.config.fetch_timeout(),
            pending_writes: Arc::clone(&self.pending_writes),
        }
    }

    async fn ensure_built(&self, ppd: f64) {
        {
            let state = self.state.read().await;
            if state.built_ppd == Some(ppd) {
                return;
            }
        }
        let mut state = self.state.write().await;
        if state.built_ppd == Some(ppd) {
            return;
        }
        state.frames = self.build_frames(ppd);
        state.built_ppd = Some(ppd);
        debug!(id = %self.id, frames = state.frames.len(), ppd, "frame array built");
    }

    /// Frames visible under any wrap repetition of the extent, paired
    /// with the X offset that places them there.
    async fn visible_in(state: &ImageState, extent: &WorldExtent) -> Vec<(Arc<Frame>, f64)> {
        let mut visible = Vec::new();
        for offset in extent.wrap_offsets() {
            for frame in &state.frames {
                if let Some(bounds) = frame.bounds(&state.work).await {
                    if bounds.translated_x(offset).intersects(extent) {
                        visible.push((Arc::clone(frame), offset));
                    }
                }
            }
        }
        visible
    }

    /// Draw one frame at one wrap offset. Returns whether the autoscale
    /// bounds widened (numeric stamps only).
    async fn draw_frame(
        &self,
        ctx: &RenderContext,
        frame: &Arc<Frame>,
        offset: f64,
        surface: &mut Surface,
        ppd: f64,
        clip: Option<&[(f64, f64)]>,
    ) -> bool {
        let Some(natural) = frame.bounds(&ctx.work).await else {
            return false;
        };
        let shifted = natural.translated_x(offset);
        let Some(vis) = shifted.intersection(&surface.extent) else {
            return false;
        };

        // A tile dwarfing the viewport projects just the visible part
        // directly instead of building (and caching) an oversized whole
        // tile.
        let oversize = natural.width() * natural.height()
            > self.config.oversize_extent_factor
                * surface.extent.width()
                * surface.extent.height();

        let (tile, tile_extent) = if oversize {
            match frame.project_extent(ctx, vis.translated_x(-offset), ppd).await {
                Some(buffer) => (Arc::new(buffer), vis.translated_x(-offset)),
                None => return false,
            }
        } else {
            match frame.projected_tile(ctx, ppd).await {
                Some(pair) => pair,
                None => return false,
            }
        };

        let draw = tile_extent.translated_x(offset);
        let bounds = self.autoscale.lock().await.bounds();

        let mut observed_min = f32::INFINITY;
        let mut observed_max = f32::NEG_INFINITY;

        let cols = surface.col_range(vis.min_x, vis.max_x);
        let rows = surface.row_range(vis.min_y, vis.max_y);
        for row in rows {
            for col in cols.clone() {
                let (x, y) = surface.pixel_center(col, row);
                if x < draw.min_x || x > draw.max_x || y < draw.min_y || y > draw.max_y {
                    continue;
                }
                if let Some(polygon) = clip {
                    if !point_in_polygon(x - offset, y, polygon) {
                        continue;
                    }
                }

                let tcol = (((x - draw.min_x) / draw.width()) * tile.width as f64) as usize;
                let trow = (((draw.max_y - y) / draw.height()) * tile.height as f64) as usize;
                let Some(value) =
                    tile.get(tcol.min(tile.width - 1), trow.min(tile.height - 1))
                else {
                    continue;
                };

                if self.semantics.is_numeric() && !self.semantics.is_no_data(value) {
                    observed_min = observed_min.min(value);
                    observed_max = observed_max.max(value);
                }
                composite_sample(surface, col, row, value, &self.semantics, bounds);
            }
        }

        if self.semantics.is_numeric() && observed_min.is_finite() {
            let mut scale = self.autoscale.lock().await;
            let low_changed = scale.observe(observed_min);
            let high_changed = scale.observe(observed_max);
            return low_changed || high_changed;
        }
        false
    }

    fn path_in(&self, work: &WorkProjection) -> Vec<(f64, f64)> {
        let corners = match self.geometry.whole_corners() {
            Some(corners) => corners,
            None => return Vec::new(),
        };
        let mut path = Vec::with_capacity(4);
        for corner in corners {
            let (mut x, y) = work.forward(corner);
            if let Some(&(prev_x, _)) = path.last() {
                // Keep the outline continuous across the seam.
                while x - prev_x > 180.0 {
                    x -= 360.0;
                }
                while x - prev_x < -180.0 {
                    x += 360.0;
                }
            }
            path.push((x, y));
        }
        path
    }

    /// Build the frame array for a render resolution.
    ///
    /// Sources with real per-tile geometry keep their native grid; all
    /// others split by a target tile edge that grows as the view zooms
    /// out, keeping per-tile pixel counts roughly constant.
    fn build_frames(&self, ppd: f64) -> Vec<Arc<Frame>> {
        match &self.geometry {
            GeometrySpec::PerTile { rows, cols, corners }
                if *rows > 0 && *cols > 0 && corners.len() == rows * cols =>
            {
                self.build_real_frames(*rows, *cols, corners)
            }
            _ => self.build_interpolated_frames(ppd),
        }
    }

    fn split_counts(&self, ppd: f64) -> (usize, usize) {
        let target = self.config.target_tile_lines;
        let lines_per_frame = if ppd >= self.max_ppd || ppd <= 0.0 {
            target
        } else {
            (target as f64 * (self.max_ppd / ppd)).ceil() as usize
        };
        (lines_per_frame.max(1), lines_per_frame.max(1))
    }

    fn build_interpolated_frames(&self, ppd: f64) -> Vec<Arc<Frame>> {
        let (lpf, spf) = self.split_counts(ppd);
        let rows = self.native_lines.div_ceil(lpf);
        let cols = self.native_samples.div_ceil(spf);

        // One shared grid of boundary points: adjacent tiles take
        // identical vectors for their shared edge, so no seams can come
        // from independent rounding.
        let fx: Vec<f64> = (0..=cols)
            .map(|c| (c * spf).min(self.native_samples) as f64 / self.native_samples as f64)
            .collect();
        let fy: Vec<f64> = (0..=rows)
            .map(|r| (r * lpf).min(self.native_lines) as f64 / self.native_lines as f64)
            .collect();

        let grid: Vec<Vec<Vector3<f64>>> = fy
            .iter()
            .map(|&line_frac| {
                fx.iter()
                    .map(|&sample_frac| self.whole_cell.point_at(sample_frac, 1.0 - line_frac))
                    .collect()
            })
            .collect();

        let mut frames = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            let line_offset = r * lpf;
            let lines = lpf.min(self.native_lines - line_offset);
            for c in 0..cols {
                let sample_offset = c * spf;
                let samples = spf.min(self.native_samples - sample_offset);

                // Grid row 0 is the north edge (line 0).
                let cell = GeometryCell::new([
                    grid[r + 1][c],
                    grid[r + 1][c + 1],
                    grid[r][c + 1],
                    grid[r][c],
                ]);
                frames.push(Arc::new(Frame::new(
                    frames.len(),
                    PixelRect::new(line_offset, sample_offset, lines, samples),
                    cell,
                )));
            }
        }
        frames
    }

    fn build_real_frames(&self, rows: usize, cols: usize, corners: &[[LonLat; 4]]) -> Vec<Arc<Frame>> {
        // Convert to unit vectors first, then blend the shared edges:
        // adjacent tiles' independently-rounded boundaries are replaced
        // by their midpoint average so neighbors agree exactly.
        let mut tiles: Vec<[Vector3<f64>; 4]> = corners
            .iter()
            .map(|c| [c[0].to_vector(), c[1].to_vector(), c[2].to_vector(), c[3].to_vector()])
            .collect();

        let blend = |a: Vector3<f64>, b: Vector3<f64>| {
            let mid = (a + b) * 0.5;
            if mid.norm() < 1e-12 {
                a
            } else {
                mid.normalize()
            }
        };

        // Vertical boundaries: east edge of (r, c) with west edge of
        // (r, c+1). Corner order is SW, SE, NE, NW.
        for r in 0..rows {
            for c in 0..cols - 1 {
                let left = r * cols + c;
                let right = left + 1;
                let low = blend(tiles[left][1], tiles[right][0]);
                let high = blend(tiles[left][2], tiles[right][3]);
                tiles[left][1] = low;
                tiles[right][0] = low;
                tiles[left][2] = high;
                tiles[right][3] = high;
            }
        }
        // Horizontal boundaries: south edge of (r, c) with north edge
        // of (r+1, c); row 0 is the north of the raster.
        for r in 0..rows - 1 {
            for c in 0..cols {
                let upper = r * cols + c;
                let lower = (r + 1) * cols + c;
                let west = blend(tiles[upper][0], tiles[lower][3]);
                let east = blend(tiles[upper][1], tiles[lower][2]);
                tiles[upper][0] = west;
                tiles[lower][3] = west;
                tiles[upper][1] = east;
                tiles[lower][2] = east;
            }
        }

        let lpf = self.native_lines.div_ceil(rows);
        let spf = self.native_samples.div_ceil(cols);

        let mut frames = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            let line_offset = r * lpf;
            let lines = lpf.min(self.native_lines.saturating_sub(line_offset)).max(1);
            for c in 0..cols {
                let sample_offset = c * spf;
                let samples = spf
                    .min(self.native_samples.saturating_sub(sample_offset))
                    .max(1);
                let cell = GeometryCell::new(tiles[r * cols + c]);
                frames.push(Arc::new(Frame::new(
                    frames.len(),
                    PixelRect::new(line_offset, sample_offset, lines, samples),
                    cell,
                )));
            }
        }
        frames
    }
}

/// Full-resolution pixel density derived from the native line count and
/// the angular height of the whole-image cell.
fn derive_max_ppd(cell: &GeometryCell, native_lines: usize) -> f64 {
    if cell.is_dead() {
        return 1.0;
    }
    let [sw, se, ne, nw] = *cell.corners();
    let mid_south = sw + se;
    let mid_north = nw + ne;
    if mid_south.norm() < 1e-12 || mid_north.norm() < 1e-12 {
        return 1.0;
    }
    let angle = mid_south
        .normalize()
        .dot(&mid_north.normalize())
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees();
    if angle < 1e-9 {
        return 1.0;
    }
    native_lines as f64 / angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry::LonLat;

    fn cell_for(corners: [(f64, f64); 4]) -> GeometryCell {
        GeometryCell::new([
            LonLat::new(corners[0].0, corners[0].1).to_vector(),
            LonLat::new(corners[1].0, corners[1].1).to_vector(),
            LonLat::new(corners[2].0, corners[2].1).to_vector(),
            LonLat::new(corners[3].0, corners[3].1).to_vector(),
        ])
    }

    #[test]
    fn test_derive_max_ppd_square_cell() {
        // 10° tall cell with 10 native lines: one pixel per degree.
        let cell = cell_for([(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let ppd = derive_max_ppd(&cell, 10);
        assert!((ppd - 1.0).abs() < 0.01, "expected ~1 ppd, got {}", ppd);

        let ppd = derive_max_ppd(&cell, 2000);
        assert!((ppd - 200.0).abs() < 2.0, "expected ~200 ppd, got {}", ppd);
    }

    #[test]
    fn test_derive_max_ppd_dead_cell() {
        let cell = GeometryCell::new([nalgebra::Vector3::zeros(); 4]);
        assert_eq!(derive_max_ppd(&cell, 100), 1.0);
    }
}
