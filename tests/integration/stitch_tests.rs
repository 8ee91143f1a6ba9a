//! End-to-end stitching tests against the mock tile source.

use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use pyramid_stitcher::{
    tile_url, Compositor, FetchError, Pyramid, PyramidError, SlotResolver, StitchConfig,
    StitchRequest, Stitcher, TileAddress,
};

use super::test_utils::{
    encode_png, expected_pixel, location, metadata, refreshed_color, solid_tile, tile_color,
    MockTileSource, BASE_URL,
};

fn stitcher(source: MockTileSource, cache: &TempDir) -> Stitcher<MockTileSource> {
    Stitcher::new(source, &StitchConfig::new(cache.path()))
}

/// Mock source serving every tile of the full-resolution level.
fn full_level_source(width: u32, height: u32, tile_size: u32) -> MockTileSource {
    let pyramid = Pyramid::new(metadata(width, height, tile_size)).unwrap();
    let source = MockTileSource::new();
    source.add_level(BASE_URL, &pyramid.grid(pyramid.max_level()).unwrap(), "png");
    source
}

// =============================================================================
// Composition
// =============================================================================

#[tokio::test]
async fn test_every_pixel_comes_from_its_tile() {
    let cache = TempDir::new().unwrap();
    let stitcher = stitcher(full_level_source(37, 23, 8), &cache);
    let request = StitchRequest::new(location(), metadata(37, 23, 8));

    let output = stitcher
        .stitch(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.image.dimensions(), (37, 23));
    for (x, y, pixel) in output.image.enumerate_pixels() {
        assert_eq!(*pixel, expected_pixel(x, y, 8), "pixel ({}, {})", x, y);
    }

    assert_eq!((output.report.columns, output.report.rows), (5, 3));
    assert_eq!(output.report.tiles, 15);
    assert_eq!(output.report.downloaded, 15);
}

#[tokio::test]
async fn test_thousand_pixel_scenario() {
    let cache = TempDir::new().unwrap();
    let stitcher = stitcher(full_level_source(1000, 1000, 512), &cache);
    let request = StitchRequest::new(location(), metadata(1000, 1000, 512));

    let output = stitcher
        .stitch(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.report.level, 9);
    assert_eq!((output.report.columns, output.report.rows), (2, 2));
    assert_eq!(output.image.dimensions(), (1000, 1000));
    assert_eq!(*output.image.get_pixel(512, 512), tile_color(1, 1));
    assert_eq!(*output.image.get_pixel(999, 999), tile_color(1, 1));
    assert_eq!(*output.image.get_pixel(511, 999), tile_color(0, 1));

    // Remote levels are 1-indexed: index 9 is served as level 10.
    let url = format!("{}/10/1_1.png", BASE_URL);
    assert_eq!(stitcher.source().hits(&url), 1);
}

#[tokio::test]
async fn test_lower_level_uses_its_own_grid() {
    let cache = TempDir::new().unwrap();
    let pyramid = Pyramid::new(metadata(37, 23, 8)).unwrap();
    let grid = pyramid.grid(3).unwrap();
    assert_eq!((grid.level().width, grid.level().height), (10, 6));

    let source = MockTileSource::new();
    source.add_level(BASE_URL, &grid, "png");
    let stitcher = stitcher(source, &cache);

    let request = StitchRequest::new(location(), metadata(37, 23, 8)).with_level(3);
    let output = stitcher
        .stitch(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.image.dimensions(), (10, 6));
    assert_eq!(*output.image.get_pixel(9, 5), tile_color(1, 0));
    assert_eq!(stitcher.source().hits(&format!("{}/4/1_0.png", BASE_URL)), 1);
}

#[tokio::test]
async fn test_single_pixel_pyramid() {
    let cache = TempDir::new().unwrap();
    // The lone 1×1 level keeps the `index + 1` rule and is requested at /1/.
    let source = MockTileSource::new();
    source.set_body(
        &format!("{}/1/0_0.png", BASE_URL),
        encode_png(&solid_tile(1, 1, tile_color(0, 0))),
    );
    let stitcher = stitcher(source, &cache);

    let output = stitcher
        .stitch(
            &StitchRequest::new(location(), metadata(1, 1, 254)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.report.level, 0);
    assert_eq!(output.image.dimensions(), (1, 1));
    assert_eq!(*output.image.get_pixel(0, 0), tile_color(0, 0));
}

#[tokio::test]
async fn test_oversized_edge_tiles_are_clipped() {
    let cache = TempDir::new().unwrap();
    let pyramid = Pyramid::new(metadata(20, 13, 8)).unwrap();
    let source = MockTileSource::new();
    source.add_level_with(
        BASE_URL,
        &pyramid.grid(pyramid.max_level()).unwrap(),
        "png",
        |address, _rect| solid_tile(8, 8, tile_color(address.column, address.row)),
    );
    let stitcher = stitcher(source, &cache);

    let output = stitcher
        .stitch(
            &StitchRequest::new(location(), metadata(20, 13, 8)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.image.dimensions(), (20, 13));
    for (x, y, pixel) in output.image.enumerate_pixels() {
        assert_eq!(*pixel, expected_pixel(x, y, 8), "pixel ({}, {})", x, y);
    }
}

#[tokio::test]
async fn test_undersized_edge_tiles_do_not_crash() {
    let cache = TempDir::new().unwrap();
    let pyramid = Pyramid::new(metadata(20, 16, 8)).unwrap();
    let source = MockTileSource::new();
    source.add_level_with(
        BASE_URL,
        &pyramid.grid(pyramid.max_level()).unwrap(),
        "png",
        |address, rect| {
            let width = if address.column == 2 { 1 } else { rect.width };
            solid_tile(width, rect.height, tile_color(address.column, address.row))
        },
    );
    let stitcher = stitcher(source, &cache);

    let output = stitcher
        .stitch(
            &StitchRequest::new(location(), metadata(20, 16, 8)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.image.dimensions(), (20, 16));
    assert_eq!(*output.image.get_pixel(16, 0), tile_color(2, 0));
    assert_eq!(*output.image.get_pixel(17, 0), Rgba([0, 0, 0, 0]));
    assert_eq!(*output.image.get_pixel(15, 15), tile_color(1, 1));
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_second_run_uses_cache() {
    let cache = TempDir::new().unwrap();
    let stitcher = stitcher(full_level_source(30, 20, 8), &cache);
    let request = StitchRequest::new(location(), metadata(30, 20, 8));
    let cancel = CancellationToken::new();

    let first = stitcher.stitch(&request, &cancel).await.unwrap();
    let requests = stitcher.source().request_count();
    assert_eq!(requests, 12);

    let second = stitcher.stitch(&request, &cancel).await.unwrap();
    assert_eq!(stitcher.source().request_count(), requests);
    assert_eq!(second.report.cache_hits, 12);
    assert_eq!(second.report.downloaded, 0);
    assert_eq!(first.image, second.image);
}

#[tokio::test]
async fn test_cache_survives_new_stitcher() {
    let cache = TempDir::new().unwrap();
    let request = StitchRequest::new(location(), metadata(16, 16, 8));

    let first = stitcher(full_level_source(16, 16, 8), &cache);
    first
        .stitch(&request, &CancellationToken::new())
        .await
        .unwrap();

    // An empty source proves nothing is fetched again.
    let second = stitcher(MockTileSource::new(), &cache);
    let output = second
        .stitch(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.source().request_count(), 0);
    assert_eq!(*output.image.get_pixel(15, 15), tile_color(1, 1));
}

#[tokio::test]
async fn test_force_refresh_refetches_and_overwrites() {
    let cache = TempDir::new().unwrap();
    let pyramid = Pyramid::new(metadata(16, 8, 8)).unwrap();
    let grid = pyramid.grid(pyramid.max_level()).unwrap();
    let stitcher = stitcher(full_level_source(16, 8, 8), &cache);
    let request = StitchRequest::new(location(), metadata(16, 8, 8));
    let cancel = CancellationToken::new();

    stitcher.stitch(&request, &cancel).await.unwrap();

    stitcher
        .source()
        .add_level_with(BASE_URL, &grid, "png", |address, rect| {
            solid_tile(rect.width, rect.height, refreshed_color(address.column, address.row))
        });

    let cached = stitcher.stitch(&request, &cancel).await.unwrap();
    assert_eq!(*cached.image.get_pixel(0, 0), tile_color(0, 0));

    let refreshed = stitcher
        .stitch(&request.clone().with_force_refresh(true), &cancel)
        .await
        .unwrap();
    assert_eq!(refreshed.report.downloaded, 2);
    assert_eq!(*refreshed.image.get_pixel(0, 0), refreshed_color(0, 0));
    assert_eq!(*refreshed.image.get_pixel(15, 7), refreshed_color(1, 0));
    assert_eq!(stitcher.source().request_count(), 4);

    let after = stitcher.stitch(&request, &cancel).await.unwrap();
    assert_eq!(*after.image.get_pixel(0, 0), refreshed_color(0, 0));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_tile_aborts_level() {
    let cache = TempDir::new().unwrap();
    let stitcher = stitcher(full_level_source(24, 16, 8), &cache);
    let missing = TileAddress::new(4, 2, 1);
    stitcher
        .source()
        .set_status(&tile_url(BASE_URL, &missing, "png"), 404);

    let result = stitcher
        .stitch(
            &StitchRequest::new(location(), metadata(24, 16, 8)),
            &CancellationToken::new(),
        )
        .await;

    match result {
        Err(PyramidError::Fetch(FetchError::Status {
            address, status, ..
        })) => {
            assert_eq!(address, missing);
            assert_eq!(status, 404);
        }
        other => panic!("Expected HTTP 404 fetch error, got {:?}", other.map(|o| o.report)),
    }
}

#[tokio::test]
async fn test_first_failure_cancels_in_flight_fetches() {
    let cache = TempDir::new().unwrap();
    let pyramid = Pyramid::new(metadata(64, 64, 8)).unwrap();
    let source = MockTileSource::with_delay(Duration::from_secs(30));
    source.add_level(BASE_URL, &pyramid.grid(pyramid.max_level()).unwrap(), "png");

    let failing = TileAddress::new(pyramid.max_level() as u32, 1, 0);
    source.set_status(&tile_url(BASE_URL, &failing, "png"), 500);

    let config = StitchConfig::new(cache.path()).with_max_concurrent_fetches(4);
    let stitcher = Stitcher::new(source, &config);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        stitcher.stitch(
            &StitchRequest::new(location(), metadata(64, 64, 8)),
            &CancellationToken::new(),
        ),
    )
    .await
    .expect("level should abort promptly");

    match result {
        Err(PyramidError::Fetch(FetchError::Status { address, status, .. })) => {
            assert_eq!(address, failing);
            assert_eq!(status, 500);
        }
        other => panic!("Expected HTTP 500 fetch error, got {:?}", other.map(|o| o.report)),
    }

    // Nothing beyond the first window was started.
    assert!(stitcher.source().request_count() <= 4);
    assert_eq!(stitcher.source().in_flight(), 0);
}

#[tokio::test]
async fn test_corrupt_tile_is_invalidated() {
    let cache = TempDir::new().unwrap();
    let stitcher = stitcher(full_level_source(16, 8, 8), &cache);
    let corrupt = TileAddress::new(3, 1, 0);
    let corrupt_url = tile_url(BASE_URL, &corrupt, "png");
    stitcher
        .source()
        .set_body(&corrupt_url, bytes::Bytes::from_static(b"<html>error</html>"));

    let request = StitchRequest::new(location(), metadata(16, 8, 8));
    let cancel = CancellationToken::new();

    let result = stitcher.stitch(&request, &cancel).await;
    match result {
        Err(PyramidError::Decode { address, .. }) => assert_eq!(address, corrupt),
        other => panic!("Expected decode error, got {:?}", other.map(|o| o.report)),
    }

    let slot = stitcher
        .store()
        .namespace(&location(), "png")
        .slot_path(&corrupt);
    assert!(!slot.exists());

    stitcher
        .source()
        .set_body(&corrupt_url, encode_png(&solid_tile(8, 8, tile_color(1, 0))));

    let output = stitcher.stitch(&request, &cancel).await.unwrap();
    assert_eq!(output.report.cache_hits, 1);
    assert_eq!(output.report.downloaded, 1);
    assert_eq!(stitcher.source().hits(&corrupt_url), 2);
}

#[tokio::test]
async fn test_compose_without_fetch_is_assembly_error() {
    let cache = TempDir::new().unwrap();
    let stitcher = stitcher(full_level_source(16, 8, 8), &cache);
    let pyramid = Pyramid::new(metadata(16, 8, 8)).unwrap();
    let grid = pyramid.grid(pyramid.max_level()).unwrap();

    let present = TileAddress::new(3, 0, 0);
    stitcher
        .store()
        .ensure(present, &location(), "png", false)
        .await
        .unwrap();

    let addresses: Vec<_> = grid.addresses().collect();
    let namespace = Arc::new(stitcher.store().namespace(&location(), "png"));
    let result = Compositor::default()
        .compose(&grid, &addresses, namespace)
        .await;

    match result {
        Err(PyramidError::Assembly { address, .. }) => {
            assert_eq!(address, TileAddress::new(3, 1, 0))
        }
        other => panic!("Expected assembly error, got {:?}", other.map(|i| i.dimensions())),
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_fetch_concurrency_is_bounded() {
    let cache = TempDir::new().unwrap();
    let pyramid = Pyramid::new(metadata(48, 40, 8)).unwrap();
    let source = MockTileSource::with_delay(Duration::from_millis(15));
    source.add_level(BASE_URL, &pyramid.grid(pyramid.max_level()).unwrap(), "png");

    let config = StitchConfig::new(cache.path()).with_max_concurrent_fetches(3);
    let stitcher = Stitcher::new(source, &config);

    let output = stitcher
        .stitch(
            &StitchRequest::new(location(), metadata(48, 40, 8)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.report.downloaded, 30);
    assert!(stitcher.source().max_in_flight() <= 3);
    assert!(stitcher.source().max_in_flight() >= 1);
}

#[tokio::test]
async fn test_caller_cancellation() {
    let cache = TempDir::new().unwrap();
    let pyramid = Pyramid::new(metadata(32, 32, 8)).unwrap();
    let source = MockTileSource::with_delay(Duration::from_secs(30));
    source.add_level(BASE_URL, &pyramid.grid(pyramid.max_level()).unwrap(), "png");
    let stitcher = stitcher(source, &cache);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        stitcher.stitch(&StitchRequest::new(location(), metadata(32, 32, 8)), &cancel),
    )
    .await
    .expect("cancellation should be prompt");

    match result {
        Err(PyramidError::Fetch(e)) => assert!(e.is_cancelled()),
        other => panic!("Expected cancellation, got {:?}", other.map(|o| o.report)),
    }
    assert_eq!(stitcher.source().in_flight(), 0);
}
