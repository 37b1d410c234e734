//! One tile of a stamp: a source rectangle plus its sky quadrilateral.
//!
//! A frame lazily produces a projected pixel buffer for its natural
//! extent (cacheable) or for an arbitrary caller extent (never cached).
//! Population runs under a per-frame lock so concurrent render passes
//! never race to build the same tile twice.

use std::sync::Arc;
use std::time::Duration;

use geometry::{GeometryCell, LonLat};
use projection::{SourceProjection, WorkProjection};
use stamp_common::{Memo, PixelBuffer, PixelRect, PixelSemantics, WorldExtent};
use storage::{RenderPool, SourceCache, TileKey, TileStore};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::provider::PixelProvider;

/// Shared collaborators handed to frames by the owning image for the
/// duration of one operation.
#[derive(Clone)]
pub(crate) struct RenderContext {
    pub provider: Arc<dyn PixelProvider>,
    pub source_id: String,
    pub store: Arc<TileStore>,
    pub source_cache: Arc<SourceCache>,
    pub pool: RenderPool,
    pub work: WorkProjection,
    pub strategy: Arc<SourceProjection>,
    pub semantics: PixelSemantics,
    pub cacheable: bool,
    pub fetch_timeout: Duration,
    pub pending_writes: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RenderContext {
    fn tile_key(&self, frame_index: usize, ppd: f64) -> TileKey {
        TileKey {
            source_id: self.source_id.clone(),
            frame_index,
            projection_hash: self.work.projection_hash(),
            ppd,
            semantics: self.semantics.cache_tag(),
        }
    }
}

/// Mutable per-frame state, all behind the frame lock.
#[derive(Default)]
struct FrameState {
    /// World extent of the cell, canonicalized to the working
    /// projection. Invalidated when corners or projection change.
    bounds: Memo<Option<WorldExtent>>,
    /// Decoded source pixels for this frame's rectangle.
    source: Option<Arc<PixelBuffer>>,
    /// Projected tile for the natural extent, with its build markers.
    projected: Option<Arc<PixelBuffer>>,
    projected_ppd: Option<f64>,
    projected_hash: Option<u64>,
    /// A background prefetch for this frame's source is in flight.
    prefetch_pending: bool,
}

/// One rectangular piece of a source raster plus its geometry cell.
///
/// Exclusively owned by one image aggregate; rebuilt (not mutated) when
/// the tiling changes.
pub struct Frame {
    index: usize,
    rect: PixelRect,
    cell: GeometryCell,
    state: Mutex<FrameState>,
}

impl Frame {
    pub fn new(index: usize, rect: PixelRect, cell: GeometryCell) -> Self {
        Self {
            index,
            rect,
            cell,
            state: Mutex::new(FrameState::default()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    pub fn cell(&self) -> &GeometryCell {
        &self.cell
    }

    /// The frame's world extent under the working projection, memoized.
    /// None for a dead cell.
    pub async fn bounds(&self, work: &WorkProjection) -> Option<WorldExtent> {
        let mut state = self.state.lock().await;
        let cell = &self.cell;
        *state.bounds.get_or_compute(|| {
            cell.geographic_bounds()
                .map(|b| work.canonical_extent(b.min_lon, b.min_lat, b.max_lon, b.max_lat))
        })
    }

    /// Drop cached buffers and the bounds memo. Called when the working
    /// projection or render resolution changes; disk entries for the old
    /// configuration are left behind (they key on the old hash).
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.bounds.invalidate();
        state.source = None;
        state.projected = None;
        state.projected_ppd = None;
        state.projected_hash = None;
    }

    /// Produce the projected tile for the frame's natural extent.
    ///
    /// Consults the in-memory copy, then the disk cache, then projects
    /// from source pixels (fetching them if needed). The result is
    /// persisted in the background unless the stamp is uncacheable.
    /// None means temporarily unavailable; the caller retries on the
    /// next render pass.
    pub(crate) async fn projected_tile(
        &self,
        ctx: &RenderContext,
        ppd: f64,
    ) -> Option<(Arc<PixelBuffer>, WorldExtent)> {
        if self.cell.is_dead() {
            return None;
        }

        let mut state = self.state.lock().await;

        let cell = &self.cell;
        let work = ctx.work;
        let extent = (*state.bounds.get_or_compute(|| {
            cell.geographic_bounds()
                .map(|b| work.canonical_extent(b.min_lon, b.min_lat, b.max_lon, b.max_lat))
        }))?;

        let hash = ctx.work.projection_hash();
        if state.projected_ppd == Some(ppd) && state.projected_hash == Some(hash) {
            if let Some(tile) = &state.projected {
                return Some((Arc::clone(tile), extent));
            }
        }

        let key = ctx.tile_key(self.index, ppd);
        if ctx.cacheable {
            if let Some(buffer) = ctx.store.read_projected(&key).await {
                let tile = Arc::new(buffer);
                state.projected = Some(Arc::clone(&tile));
                state.projected_ppd = Some(ppd);
                state.projected_hash = Some(hash);
                return Some((tile, extent));
            }
        }

        let source = self.source_buffer(&mut state, ctx, ppd).await?;
        let dims = extent.pixel_size(ppd);
        let buffer = project_region(
            &self.cell,
            &ctx.strategy,
            &ctx.work,
            &source,
            self.rect,
            extent,
            dims,
        );

        let tile = Arc::new(buffer);
        state.projected = Some(Arc::clone(&tile));
        state.projected_ppd = Some(ppd);
        state.projected_hash = Some(hash);

        if ctx.cacheable {
            // Deferred write: the render path moves on immediately.
            let store = Arc::clone(&ctx.store);
            let write_tile = Arc::clone(&tile);
            let handle = ctx.pool.spawn(async move {
                if let Err(e) = store.write_projected(&key, &write_tile).await {
                    warn!(error = %e, "background tile write failed");
                }
            });
            ctx.pending_writes.lock().await.push(handle);
        }

        Some((tile, extent))
    }

    /// Project an arbitrary caller-supplied extent. Used when the
    /// natural tile would be excessively large relative to the visible
    /// screen, and for single-point sampling. Never cached.
    pub(crate) async fn project_extent(
        &self,
        ctx: &RenderContext,
        extent: WorldExtent,
        ppd: f64,
    ) -> Option<PixelBuffer> {
        if self.cell.is_dead() {
            return None;
        }
        let mut state = self.state.lock().await;
        let source = self.source_buffer(&mut state, ctx, ppd).await?;
        let dims = extent.pixel_size(ppd);
        Some(project_region(
            &self.cell,
            &ctx.strategy,
            &ctx.work,
            &source,
            self.rect,
            extent,
            dims,
        ))
    }

    /// Sample the source value under one geodetic point, or None when
    /// the point misses this frame or the source is unavailable.
    pub(crate) async fn sample_value(&self, ctx: &RenderContext, point: LonLat) -> Option<f32> {
        if self.cell.is_dead() {
            return None;
        }
        let mut state = self.state.lock().await;
        let source = self.source_buffer(&mut state, ctx, 0.0).await?;
        sample_source(
            &self.cell,
            &ctx.strategy,
            &source,
            self.rect,
            point,
        )
    }

    /// Obtain the frame's decoded source pixels: in-memory state, then
    /// the shared LRU, then disk, then a bounded provider fetch. A fetch
    /// timeout enqueues a background prefetch and reports unavailable.
    ///
    /// `ppd` of 0 requests native resolution.
    async fn source_buffer(
        &self,
        state: &mut FrameState,
        ctx: &RenderContext,
        ppd: f64,
    ) -> Option<Arc<PixelBuffer>> {
        if let Some(source) = &state.source {
            return Some(Arc::clone(source));
        }

        let key = ctx.tile_key(self.index, ppd);
        let cache_name = key.source_name();

        if ctx.cacheable {
            if let Some(buffer) = ctx.source_cache.get(&cache_name).await {
                state.source = Some(Arc::clone(&buffer));
                return Some(buffer);
            }

            if let Some(buffer) = ctx.store.read_source(&key).await {
                let buffer = Arc::new(buffer);
                ctx.source_cache
                    .put(cache_name.clone(), Arc::clone(&buffer))
                    .await;
                state.source = Some(Arc::clone(&buffer));
                return Some(buffer);
            }
        }

        // Bounded inline fetch; a slow provider must not stall the
        // render pass beyond the configured timeout.
        let fetch = ctx
            .provider
            .read_pixels(&ctx.source_id, self.rect, ppd);
        match tokio::time::timeout(ctx.fetch_timeout, fetch).await {
            Ok(Ok(buffer)) => {
                let buffer = Arc::new(buffer);
                state.source = Some(Arc::clone(&buffer));

                if ctx.cacheable {
                    ctx.source_cache
                        .put(cache_name, Arc::clone(&buffer))
                        .await;
                    let store = Arc::clone(&ctx.store);
                    let write_buffer = Arc::clone(&buffer);
                    let handle = ctx.pool.spawn(async move {
                        if let Err(e) = store.write_source(&key, &write_buffer).await {
                            warn!(error = %e, "background source write failed");
                        }
                    });
                    ctx.pending_writes.lock().await.push(handle);
                }

                Some(buffer)
            }
            Ok(Err(e)) => {
                debug!(frame = self.index, error = %e, "source fetch failed, tile unavailable");
                None
            }
            Err(_) => {
                warn!(frame = self.index, "source fetch timed out, scheduling prefetch");
                // A prefetch for an uncacheable stamp would have nowhere
                // to land; those retry inline on the next pass instead.
                if ctx.cacheable && !state.prefetch_pending {
                    state.prefetch_pending = true;
                    let handle = self.spawn_prefetch(ctx, ppd);
                    ctx.pending_writes.lock().await.push(handle);
                }
                None
            }
        }
    }

    /// Fetch this frame's source in the background so a later render
    /// pass finds it in the cache. Only scheduled for cacheable stamps;
    /// the handle joins the image's pending set so completion stays
    /// observable.
    fn spawn_prefetch(&self, ctx: &RenderContext, ppd: f64) -> JoinHandle<()> {
        let provider = Arc::clone(&ctx.provider);
        let source_id = ctx.source_id.clone();
        let rect = self.rect;
        let key = ctx.tile_key(self.index, ppd);
        let cache_name = key.source_name();
        let store = Arc::clone(&ctx.store);
        let source_cache = Arc::clone(&ctx.source_cache);

        ctx.pool.spawn(async move {
            match provider.read_pixels(&source_id, rect, ppd).await {
                Ok(buffer) => {
                    let buffer = Arc::new(buffer);
                    source_cache.put(cache_name, Arc::clone(&buffer)).await;
                    if let Err(e) = store.write_source(&key, &buffer).await {
                        warn!(error = %e, "prefetch source write failed");
                    }
                }
                Err(e) => {
                    debug!(error = %e, "background prefetch failed");
                }
            }
        })
    }

    /// Clear the prefetch marker so a later pass may schedule again.
    pub(crate) async fn clear_prefetch_marker(&self) {
        self.state.lock().await.prefetch_pending = false;
    }
}

/// Project source pixels into an output buffer covering `extent`.
///
/// For each destination pixel the working projection is inverted to a
/// geodetic coordinate, then mapped to a source pixel either through the
/// strategy's closed-form inverse or through the cell's inverse mapping
/// with linear interpolation to the rectangle. The nearest source sample
/// wins; destination pixels whose mapping misses the frame (beyond a
/// half-pixel tolerance band) stay NaN.
pub(crate) fn project_region(
    cell: &GeometryCell,
    strategy: &SourceProjection,
    work: &WorkProjection,
    source: &PixelBuffer,
    rect: PixelRect,
    extent: WorldExtent,
    dims: (usize, usize),
) -> PixelBuffer {
    let (width, height) = dims;
    let mut out = PixelBuffer::empty(width, height);

    let step_x = extent.width() / width as f64;
    let step_y = extent.height() / height as f64;
    let tol_u = 0.5 / rect.samples.max(1) as f64;
    let tol_v = 0.5 / rect.lines.max(1) as f64;

    for row in 0..height {
        let y = extent.max_y - (row as f64 + 0.5) * step_y;
        for col in 0..width {
            let x = extent.min_x + (col as f64 + 0.5) * step_x;
            let geo = work.inverse(x, y);

            let picked = if let Some((line, sample)) = strategy.inverse(geo.lon, geo.lat) {
                // Closed-form path: native raster coordinates, bounded
                // to this frame's rectangle with half-pixel tolerance.
                let rel_line = line - rect.line_offset as f64;
                let rel_sample = sample - rect.sample_offset as f64;
                if rel_line < -0.5
                    || rel_line > rect.lines as f64 - 0.5
                    || rel_sample < -0.5
                    || rel_sample > rect.samples as f64 - 0.5
                {
                    None
                } else {
                    Some(nearest(
                        rel_sample / rect.samples as f64,
                        rel_line / rect.lines as f64,
                        source,
                    ))
                }
            } else {
                // Generic path: invert the cell and interpolate linearly
                // into the rectangle.
                let (u, v) = cell.uninterpolate_fast(&geo.to_vector());
                if !cell.contains_coords(u, v, tol_u, tol_v) {
                    None
                } else {
                    // v runs south to north; lines run north to south.
                    Some(nearest(u, 1.0 - v, source))
                }
            };

            if let Some(value) = picked {
                out.set(col, row, value);
            }
        }
    }

    out
}

/// Nearest-neighbor sample at fractional buffer coordinates in [0,1].
fn nearest(fx: f64, fy: f64, source: &PixelBuffer) -> f32 {
    let col = ((fx * source.width as f64).floor() as i64)
        .clamp(0, source.width.saturating_sub(1) as i64) as usize;
    let row = ((fy * source.height as f64).floor() as i64)
        .clamp(0, source.height.saturating_sub(1) as i64) as usize;
    source.get(col, row).unwrap_or(f32::NAN)
}

/// Sample the source under a single geodetic point.
fn sample_source(
    cell: &GeometryCell,
    strategy: &SourceProjection,
    source: &PixelBuffer,
    rect: PixelRect,
    point: LonLat,
) -> Option<f32> {
    if let Some((line, sample)) = strategy.inverse(point.lon, point.lat) {
        let rel_line = line - rect.line_offset as f64;
        let rel_sample = sample - rect.sample_offset as f64;
        if rel_line < -0.5
            || rel_line > rect.lines as f64 - 0.5
            || rel_sample < -0.5
            || rel_sample > rect.samples as f64 - 0.5
        {
            return None;
        }
        Some(nearest(
            rel_sample / rect.samples as f64,
            rel_line / rect.lines as f64,
            source,
        ))
    } else {
        let (u, v) = cell.uninterpolate_fast(&point.to_vector());
        if !cell.contains_coords(u, v, 0.0, 0.0) {
            return None;
        }
        Some(nearest(u, 1.0 - v, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry::LonLat;
    use projection::ProjectionParams;

    fn unit_cell() -> GeometryCell {
        GeometryCell::new([
            LonLat::new(0.0, 0.0).to_vector(),
            LonLat::new(10.0, 0.0).to_vector(),
            LonLat::new(10.0, 10.0).to_vector(),
            LonLat::new(0.0, 10.0).to_vector(),
        ])
    }

    fn gradient_source(width: usize, height: usize) -> PixelBuffer {
        // Value encodes position: col * 1000 + row.
        let data = (0..height)
            .flat_map(|r| (0..width).map(move |c| (c * 1000 + r) as f32))
            .collect();
        PixelBuffer::from_data(width, height, data).unwrap()
    }

    fn unprojected() -> SourceProjection {
        SourceProjection::from_params(
            &ProjectionParams::default(),
            [
                LonLat::new(0.0, 0.0),
                LonLat::new(10.0, 0.0),
                LonLat::new(10.0, 10.0),
                LonLat::new(0.0, 10.0),
            ],
            10,
            10,
        )
    }

    #[test]
    fn test_project_region_orientation() {
        let cell = unit_cell();
        let source = gradient_source(10, 10);
        let rect = PixelRect::whole(10, 10);
        let extent = WorldExtent::new(0.0, 0.0, 10.0, 10.0);

        let out = project_region(
            &cell,
            &unprojected(),
            &WorkProjection::default(),
            &source,
            rect,
            extent,
            (10, 10),
        );

        // Destination row 0 is the north edge, which maps to source line
        // 0; destination row 9 maps to the last line.
        let top = out.get(5, 0).unwrap();
        let bottom = out.get(5, 9).unwrap();
        assert_eq!(top as usize % 1000, 0, "top row should sample line 0");
        assert_eq!(bottom as usize % 1000, 9, "bottom row should sample line 9");

        // West column maps to sample 0.
        let west = out.get(0, 5).unwrap();
        assert_eq!(west as usize / 1000, 0);
        let east = out.get(9, 5).unwrap();
        assert_eq!(east as usize / 1000, 9);
    }

    #[test]
    fn test_project_region_outside_cell_is_nan() {
        let cell = unit_cell();
        let source = gradient_source(10, 10);
        let rect = PixelRect::whole(10, 10);
        // Output extent twice the cell: the outer ring misses the cell.
        let extent = WorldExtent::new(-5.0, -5.0, 15.0, 15.0);

        let out = project_region(
            &cell,
            &unprojected(),
            &WorkProjection::default(),
            &source,
            rect,
            extent,
            (20, 20),
        );

        assert!(out.get(0, 0).unwrap().is_nan(), "corner outside the cell");
        assert!(
            !out.get(10, 10).unwrap().is_nan(),
            "center inside the cell"
        );
    }

    #[test]
    fn test_degenerate_output_clamped_to_one_pixel() {
        let extent = WorldExtent::new(0.0, 0.0, 10.0, 10.0);
        // Extreme zoom-out yields zero raw pixels; pixel_size clamps.
        let dims = extent.pixel_size(0.0001);
        assert_eq!(dims, (1, 1));

        let cell = unit_cell();
        let out = project_region(
            &cell,
            &unprojected(),
            &WorkProjection::default(),
            &gradient_source(10, 10),
            PixelRect::whole(10, 10),
            extent,
            dims,
        );
        assert_eq!(out.width, 1);
        assert_eq!(out.height, 1);
    }

    #[test]
    fn test_sample_source_inside_and_outside() {
        let cell = unit_cell();
        let source = gradient_source(10, 10);
        let rect = PixelRect::whole(10, 10);
        let strategy = unprojected();

        let inside = sample_source(&cell, &strategy, &source, rect, LonLat::new(5.0, 5.0));
        assert!(inside.is_some());

        let outside = sample_source(&cell, &strategy, &source, rect, LonLat::new(25.0, 5.0));
        assert!(outside.is_none());
    }
}
