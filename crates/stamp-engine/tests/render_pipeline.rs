//! End-to-end tests of the tiling, render, and cache pipeline against a
//! scripted in-memory provider.

use std::sync::Arc;
use std::time::Duration;

use stamp_common::WorldExtent;
use stamp_engine::{EngineConfig, StampEngine, StampImage, Surface, SampleTarget};
use tempfile::TempDir;
use test_utils::{create_test_grid, create_temperature_grid, SyntheticProvider};

/// Corners of a 10°×10° stamp on the equator.
const UNIT_CORNERS: [(f64, f64); 4] = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];

fn never_cancelled() -> impl Fn() -> bool + Sync {
    || false
}

async fn engine_in(dir: &TempDir) -> StampEngine {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut config = EngineConfig::default();
    config.cache_root = dir.path().join("cache");
    config.pool_workers = 2;
    StampEngine::new(config).await.unwrap()
}

async fn open_unit_stamp(
    engine: &StampEngine,
    provider: Arc<SyntheticProvider>,
) -> StampImage {
    engine.open_stamp("unit", provider).await.unwrap()
}

// ============================================================================
// Tiling scenarios
// ============================================================================

#[tokio::test]
async fn test_small_stamp_is_single_frame_at_full_resolution() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        create_test_grid(10, 10),
    ));
    let image = open_unit_stamp(&engine, provider).await;

    // 10 native lines over ~10° is ~1 ppd; rendering at 1 ppd uses the
    // fixed 500-line target, so the whole raster fits one frame.
    let layout = image.frame_layout(1.0).await;
    assert_eq!(layout.len(), 1);
    assert_eq!((layout[0].lines, layout[0].samples), (10, 10));
    assert_eq!((layout[0].line_offset, layout[0].sample_offset), (0, 0));
}

#[tokio::test]
async fn test_zoomed_out_small_stamp_stays_single_frame() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        create_test_grid(10, 10),
    ));
    let image = open_unit_stamp(&engine, provider).await;

    // renderPPD far below maxPPD scales the target tile up; native size
    // is far below it.
    let layout = image.frame_layout(0.05).await;
    assert_eq!(layout.len(), 1);
}

#[tokio::test]
async fn test_tall_stamp_splits_into_exact_quarters() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    // 2000 lines over 20° of latitude: maxPPD ~100. Rendering at 100 ppd
    // gives 500-line tiles: four rows, zero remainder.
    let provider = Arc::new(SyntheticProvider::new(
        [(0.0, 0.0), (4.0, 0.0), (4.0, 20.0), (0.0, 20.0)],
        2000,
        400,
        vec![1.0; 2000 * 400],
    ));
    let image = engine.open_stamp("tall", provider).await.unwrap();

    let layout = image.frame_layout(100.0).await;
    assert_eq!(layout.len(), 4, "expected 4 vertical splits");
    for (i, rect) in layout.iter().enumerate() {
        assert_eq!(rect.lines, 500, "frame {} wrong height", i);
        assert_eq!(rect.line_offset, i * 500);
        assert_eq!(rect.samples, 400);
    }
}

#[tokio::test]
async fn test_tiling_covers_raster_exactly() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    // 1300×700 raster: splits at 500 leave remainders in both axes.
    let provider = Arc::new(SyntheticProvider::new(
        [(0.0, 0.0), (7.0, 0.0), (7.0, 13.0), (0.0, 13.0)],
        1300,
        700,
        vec![1.0; 1300 * 700],
    ));
    let image = engine.open_stamp("remainder", provider).await.unwrap();

    let layout = image.frame_layout(image.max_ppd()).await;
    assert_eq!(layout.len(), 3 * 2);

    // Union of the source rectangles covers every native pixel exactly
    // once: no gaps and no overlaps.
    let mut covered = vec![0u8; 1300 * 700];
    for rect in &layout {
        for line in rect.line_offset..rect.line_end() {
            for sample in rect.sample_offset..rect.sample_end() {
                covered[line * 700 + sample] += 1;
            }
        }
    }
    assert!(
        covered.iter().all(|&c| c == 1),
        "tiling must cover the raster with no gaps or overlaps"
    );
}

#[tokio::test]
async fn test_real_frame_points_keep_native_grid() {
    use geometry::LonLat;

    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let west = [
        LonLat::new(0.0, 0.0),
        LonLat::new(5.0, 0.0),
        LonLat::new(5.0, 10.0),
        LonLat::new(0.0, 10.0),
    ];
    let east = [
        LonLat::new(5.0, 0.0),
        LonLat::new(10.0, 0.0),
        LonLat::new(10.0, 10.0),
        LonLat::new(5.0, 10.0),
    ];
    let provider = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 20, create_test_grid(20, 10))
            .with_tile_geometry(1, 2, vec![west, east]),
    );
    let image = engine.open_stamp("tiled", provider).await.unwrap();

    // The provider's 1×2 grid wins over the adaptive split at any ppd.
    let layout = image.frame_layout(1.0).await;
    assert_eq!(layout.len(), 2);
    assert_eq!((layout[0].samples, layout[1].samples), (10, 10));
    assert_eq!(layout[1].sample_offset, 10);
}

// ============================================================================
// World wrap
// ============================================================================

#[tokio::test]
async fn test_world_wrap_idempotence() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        create_test_grid(10, 10),
    ));
    let image = open_unit_stamp(&engine, provider).await;

    let wrapped = WorldExtent::new(350.0, 0.0, 370.0, 10.0);
    let lower = WorldExtent::new(350.0, 0.0, 360.0, 10.0);
    let upper = WorldExtent::new(0.0, 0.0, 10.0, 10.0);

    let via_wrapped = image.visible_frame_indices(&wrapped, 1.0).await;
    let mut via_union = image.visible_frame_indices(&lower, 1.0).await;
    via_union.extend(image.visible_frame_indices(&upper, 1.0).await);
    via_union.sort_unstable();
    via_union.dedup();

    assert_eq!(
        via_wrapped, via_union,
        "a seam-spanning extent must see the same frames as the union of its halves"
    );
    assert!(!via_wrapped.is_empty(), "stamp should be visible through the wrap");
}

#[tokio::test]
async fn test_render_through_wrap_repetition() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        vec![128.0; 100],
    ));
    let image = open_unit_stamp(&engine, provider).await;

    // Viewport one world-period east of the stamp.
    let mut surface = Surface::new(WorldExtent::new(362.0, 2.0, 368.0, 8.0), 1.0);
    image
        .render(&mut surface, 1.0, &never_cancelled())
        .await
        .unwrap();

    assert!(
        surface.is_opaque(3, 3),
        "stamp must render through the +360 repetition"
    );
}

// ============================================================================
// Cache behavior
// ============================================================================

#[tokio::test]
async fn test_projected_cache_avoids_refetch() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        vec![200.0; 100],
    ));

    let extent = WorldExtent::new(0.0, 0.0, 10.0, 10.0);

    let image = engine
        .open_stamp("unit", Arc::clone(&provider) as Arc<dyn stamp_engine::PixelProvider>)
        .await
        .unwrap();
    let mut surface = Surface::new(extent, 1.0);
    image.render(&mut surface, 1.0, &never_cancelled()).await.unwrap();
    assert_eq!(provider.fetches(), 1, "first render fetches the frame once");
    image.flush_writes().await;

    // A fresh image over the same stamp: no in-memory state, so a cache
    // miss would fetch again. The disk tile must satisfy it instead.
    let image2 = engine
        .open_stamp("unit", Arc::clone(&provider) as Arc<dyn stamp_engine::PixelProvider>)
        .await
        .unwrap();
    let mut surface2 = Surface::new(extent, 1.0);
    image2
        .render(&mut surface2, 1.0, &never_cancelled())
        .await
        .unwrap();

    assert_eq!(
        provider.fetches(),
        1,
        "second render must be served from the projected cache"
    );
    assert_eq!(surface.as_rgba(), surface2.as_rgba());
}

#[tokio::test]
async fn test_uncacheable_stamp_bypasses_store() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 10, vec![200.0; 100])
            .with_param("no_cache", "true"),
    );

    let image = engine
        .open_stamp("volatile", Arc::clone(&provider) as Arc<dyn stamp_engine::PixelProvider>)
        .await
        .unwrap();
    let mut surface = Surface::new(WorldExtent::new(0.0, 0.0, 10.0, 10.0), 1.0);
    image.render(&mut surface, 1.0, &never_cancelled()).await.unwrap();
    image.flush_writes().await;

    assert_eq!(engine.store_stats().writes, 0, "no-cache stamps must not persist");
}

// ============================================================================
// Failure semantics
// ============================================================================

#[tokio::test]
async fn test_provider_failure_is_soft_and_retried() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        vec![99.0; 100],
    ));
    provider.set_failing(true);

    let image = engine
        .open_stamp("flaky", Arc::clone(&provider) as Arc<dyn stamp_engine::PixelProvider>)
        .await
        .unwrap();
    let extent = WorldExtent::new(0.0, 0.0, 10.0, 10.0);

    let mut surface = Surface::new(extent, 1.0);
    image.render(&mut surface, 1.0, &never_cancelled()).await.unwrap();
    assert!(
        surface.as_rgba().iter().all(|&b| b == 0),
        "failed fetch leaves the surface untouched, not an error"
    );

    // Next render pass succeeds once the provider recovers.
    provider.set_failing(false);
    let mut retry = Surface::new(extent, 1.0);
    image.render(&mut retry, 1.0, &never_cancelled()).await.unwrap();
    assert!(retry.is_opaque(5, 5), "recovered provider renders on retry");
}

#[tokio::test]
async fn test_fetch_timeout_prefetches_for_next_pass() {
    let dir = TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.cache_root = dir.path().join("cache");
    config.pool_workers = 2;
    config.fetch_timeout_ms = 25;
    let engine = StampEngine::new(config).await.unwrap();

    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        vec![77.0; 100],
    ));
    provider.set_delay(Duration::from_millis(100));

    let image = engine
        .open_stamp("slow", Arc::clone(&provider) as Arc<dyn stamp_engine::PixelProvider>)
        .await
        .unwrap();
    let extent = WorldExtent::new(0.0, 0.0, 10.0, 10.0);

    let mut surface = Surface::new(extent, 1.0);
    image.render(&mut surface, 1.0, &never_cancelled()).await.unwrap();
    assert!(
        surface.as_rgba().iter().all(|&b| b == 0),
        "timed-out fetch renders nothing this pass"
    );

    // The background prefetch keeps running past the timeout; once it
    // lands, the next pass renders from cache.
    image.flush_writes().await;
    let mut retry = Surface::new(extent, 1.0);
    image.render(&mut retry, 1.0, &never_cancelled()).await.unwrap();
    assert!(retry.is_opaque(5, 5), "prefetched source renders next pass");
    assert_eq!(provider.fetches(), 2, "inline attempt plus one prefetch");
}

#[tokio::test]
async fn test_cancellation_stops_before_any_fetch() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        vec![1.0; 100],
    ));

    let image = engine
        .open_stamp("cancelled", Arc::clone(&provider) as Arc<dyn stamp_engine::PixelProvider>)
        .await
        .unwrap();
    let mut surface = Surface::new(WorldExtent::new(0.0, 0.0, 10.0, 10.0), 1.0);
    image.render(&mut surface, 1.0, &(|| true)).await.unwrap();

    assert_eq!(provider.fetches(), 0, "cancelled render issues no tile work");
    assert!(surface.as_rgba().iter().all(|&b| b == 0));
}

// ============================================================================
// Numeric semantics
// ============================================================================

#[tokio::test]
async fn test_autoscale_converges_to_full_bounds() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 10, create_temperature_grid(10, 10))
            .with_numeric(-32768.0, "K"),
    );
    let image = open_unit_stamp(&engine, provider).await;

    let mut surface = Surface::new(WorldExtent::new(0.0, 0.0, 10.0, 10.0), 1.0);
    image.render(&mut surface, 1.0, &never_cancelled()).await.unwrap();

    // After convergence the coldest pixel maps to the gradient's low end
    // (blue) and the hottest to the high end (red). The coldest source
    // sample is line 0 / sample 0, the stamp's north-west pixel.
    let cold = surface.get(0, 0).unwrap();
    assert_eq!((cold.r, cold.b), (0, 255), "min value should be blue: {:?}", cold);
    let hot = surface.get(9, 9).unwrap();
    assert_eq!((hot.r, hot.b), (255, 0), "max value should be red: {:?}", hot);
}

#[tokio::test]
async fn test_autoscale_pass_count_is_bounded() {
    use geometry::LonLat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    // Four stacked tiles with exact geometry, so four frames are
    // visible at any resolution.
    let tiles: Vec<[LonLat; 4]> = (0..4)
        .map(|r| {
            let top = 10.0 - r as f64 * 2.5;
            let bottom = top - 2.5;
            [
                LonLat::new(0.0, bottom),
                LonLat::new(10.0, bottom),
                LonLat::new(10.0, top),
                LonLat::new(0.0, top),
            ]
        })
        .collect();
    let provider = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 20, 10, vec![5.0; 200])
            .with_numeric(-32768.0, "")
            .with_tile_geometry(4, 1, tiles),
    );
    let image = engine.open_stamp("stack", provider).await.unwrap();

    // The predicate runs once per frame draw per pass, so it counts
    // passes. Constant data converges after the first repaint: two
    // passes over four frames, comfortably under the N+1 bound.
    let calls = AtomicUsize::new(0);
    let counting = || {
        calls.fetch_add(1, Ordering::SeqCst);
        false
    };

    let mut surface = Surface::new(WorldExtent::new(0.0, 0.0, 10.0, 10.0), 1.0);
    image.render(&mut surface, 1.0, &counting).await.unwrap();

    let visible = 4;
    let draws = calls.load(Ordering::SeqCst);
    assert_eq!(draws % visible, 0, "whole passes only");
    let passes = draws / visible;
    assert_eq!(passes, 2, "constant data converges on the second pass");
    assert!(passes <= visible + 1, "pass count bounded by visible + 1");
}

#[tokio::test]
async fn test_ignore_value_and_nan_render_transparent() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    let mut data = create_temperature_grid(10, 10);
    // Poke holes at known source pixels: line 2 sample 3 (ignore) and
    // line 7 sample 6 (NaN).
    data[2 * 10 + 3] = -32768.0;
    data[7 * 10 + 6] = f32::NAN;

    let provider = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 10, data).with_numeric(-32768.0, "K"),
    );
    let image = open_unit_stamp(&engine, provider).await;

    let mut surface = Surface::new(WorldExtent::new(0.0, 0.0, 10.0, 10.0), 1.0);
    image.render(&mut surface, 1.0, &never_cancelled()).await.unwrap();

    // Surface row = source line at this 1:1 density.
    assert!(!surface.is_opaque(3, 2), "ignore value must stay transparent");
    assert!(!surface.is_opaque(6, 7), "NaN must stay transparent");
    assert!(surface.is_opaque(4, 2), "neighbors render normally");
}

#[tokio::test]
async fn test_sample_target_first_valid_wins_across_stamps() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;

    // First stamp has data everywhere except a hole; second stamp
    // overlaps with different values.
    let mut first_data = vec![10.0f32; 100];
    first_data[5 * 10 + 5] = -32768.0;
    let first = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 10, first_data).with_numeric(-32768.0, ""),
    );
    let second = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 10, vec![20.0f32; 100])
            .with_numeric(-32768.0, ""),
    );

    let image1 = engine.open_stamp("first", first).await.unwrap();
    let image2 = engine.open_stamp("second", second).await.unwrap();

    let extent = WorldExtent::new(0.0, 0.0, 10.0, 10.0);
    let mut target = SampleTarget::new(extent, 1.0);
    image1
        .render_samples(&mut target, 1.0, &never_cancelled())
        .await
        .unwrap();
    image2
        .render_samples(&mut target, 1.0, &never_cancelled())
        .await
        .unwrap();

    // Where the first stamp had data, its value wins; its hole is
    // filled by the second stamp.
    assert_eq!(target.get(2, 2), Some(10.0));
    assert_eq!(target.get(5, 5), Some(20.0), "hole filled by the later stamp");
}

// ============================================================================
// Point sampling and path
// ============================================================================

#[tokio::test]
async fn test_sample_value_inside_and_outside() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 10, create_test_grid(10, 10))
            .with_numeric(-32768.0, "K"),
    );
    let image = open_unit_stamp(&engine, provider).await;

    let inside = image.sample_value(5.5, 5.5).await.unwrap();
    // col 5, line 4 of the position-encoded grid.
    assert_eq!(inside.value, 5004.0);
    assert_eq!(inside.units, "K");

    assert!(image.sample_value(50.0, 5.0).await.is_none());
}

#[tokio::test]
async fn test_sample_value_no_data_on_ignore() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let mut data = create_test_grid(10, 10);
    data[4 * 10 + 5] = -32768.0;
    let provider = Arc::new(
        SyntheticProvider::new(UNIT_CORNERS, 10, 10, data).with_numeric(-32768.0, "K"),
    );
    let image = open_unit_stamp(&engine, provider).await;

    assert!(
        image.sample_value(5.5, 5.5).await.is_none(),
        "ignore value reads back as no-data"
    );
}

#[tokio::test]
async fn test_path_outline() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        vec![1.0; 100],
    ));
    let image = open_unit_stamp(&engine, provider).await;

    let path = image.path().await;
    assert_eq!(path.len(), 4);
    assert_eq!(path[0], (0.0, 0.0));
    assert_eq!(path[2], (10.0, 10.0));
}

// ============================================================================
// Invalidation
// ============================================================================

#[tokio::test]
async fn test_projection_change_invalidates_tiles_not_source() {
    use projection::WorkProjection;

    let dir = TempDir::new().unwrap();
    let engine = engine_in(&dir).await;
    let provider = Arc::new(SyntheticProvider::new(
        UNIT_CORNERS,
        10,
        10,
        vec![150.0; 100],
    ));
    let image = engine
        .open_stamp("proj", Arc::clone(&provider) as Arc<dyn stamp_engine::PixelProvider>)
        .await
        .unwrap();

    let extent = WorldExtent::new(0.0, 0.0, 10.0, 10.0);
    let mut surface = Surface::new(extent, 1.0);
    image.render(&mut surface, 1.0, &never_cancelled()).await.unwrap();
    image.flush_writes().await;
    assert_eq!(provider.fetches(), 1);

    // Recenter the world: projected tiles key on the new hash, but the
    // cached source pixels keep the provider out of the loop.
    image
        .invalidate_projection(WorkProjection::centered_on(180.0))
        .await;
    let mut surface2 = Surface::new(extent, 1.0);
    image.render(&mut surface2, 1.0, &never_cancelled()).await.unwrap();

    assert_eq!(
        provider.fetches(),
        1,
        "source pixels survive a projection change"
    );
    assert!(surface2.is_opaque(5, 5));
}
