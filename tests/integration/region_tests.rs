//! End-to-end region read properties: rounding law, determinism, clipping,
//! plane handling and the full-image round trip.

use wsi_regions::{RegionRequest, ReadError, RequestError};

use super::test_utils::{pixel_value, sample_u8, World};

#[tokio::test]
async fn test_rounding_law_governs_output_size() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let cases = [
        // (downsample, width, height, expected dims)
        (1.0, 1000, 700, (1000, 700)),
        (3.0, 999, 600, (333, 200)),
        (3.0, 1000, 700, (334, 234)),
        (2.0, 5, 5, (3, 3)),
        (0.5, 100, 50, (200, 100)),
    ];
    for (ds, w, h, expected) in cases {
        let region = RegionRequest::new(source.id(), ds, 0, 0, w, h).unwrap();
        let raster = source.read(&region).await.unwrap();
        assert_eq!(
            raster.dimensions(),
            expected,
            "ds={ds} {w}x{h} should yield {expected:?}"
        );
    }
}

#[tokio::test]
async fn test_reads_are_deterministic() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    for ds in [1.0, 2.0, 4.0, 7.3, 16.0] {
        let region = RegionRequest::new(source.id(), ds, 37, 91, 500, 400).unwrap();
        let first = source.read(&region).await.unwrap();
        // Second read is cache-warm; bytes must not change
        let second = source.read(&region).await.unwrap();
        assert_eq!(first, second, "ds={ds} read must be reproducible");
    }
}

#[tokio::test]
async fn test_full_image_round_trip() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let region = source.full_region(1.0).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(raster.dimensions(), (1024, 768));

    // Tile-by-tile reconstruction through the grid must reproduce the
    // level-0 pixel function exactly
    for y in (0..768).step_by(97) {
        for x in (0..1024).step_by(89) {
            assert_eq!(
                sample_u8(&raster, x, y),
                pixel_value(0, x, y, 0, 0),
                "mismatch at ({x},{y})"
            );
        }
    }
    // Tile seams specifically
    for &x in &[255, 256, 511, 512, 1023] {
        assert_eq!(sample_u8(&raster, x, 300), pixel_value(0, x, 300, 0, 0));
    }
}

#[tokio::test]
async fn test_native_level_read_is_exact() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    // Downsample 4 matches level 1 exactly; an aligned in-tile rectangle is
    // a direct clipped view of level-1 data
    let region = RegionRequest::new(source.id(), 4.0, 0, 0, 512, 512).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(raster.dimensions(), (128, 128));
    for y in (0..128).step_by(13) {
        for x in (0..128).step_by(11) {
            assert_eq!(sample_u8(&raster, x, y), pixel_value(1, x, y, 0, 0));
        }
    }
}

#[tokio::test]
async fn test_overhanging_request_is_clipped() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    // Overhangs right and bottom: 1024-900=124 by 768-700=68 remain
    let region = RegionRequest::new(source.id(), 1.0, 900, 700, 400, 400).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(raster.dimensions(), (124, 68));
    assert_eq!(sample_u8(&raster, 0, 0), pixel_value(0, 900, 700, 0, 0));

    // Overhangs left and top
    let region = RegionRequest::new(source.id(), 1.0, -100, -50, 300, 300).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(raster.dimensions(), (200, 250));
    assert_eq!(sample_u8(&raster, 0, 0), pixel_value(0, 0, 0, 0, 0));
}

#[tokio::test]
async fn test_fully_outside_request_yields_empty_raster() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let region = RegionRequest::new(source.id(), 1.0, 5000, 5000, 100, 100).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert!(raster.is_empty());
    assert_eq!(raster.dimensions(), (0, 0));
    // Nothing was fetched for it
    assert_eq!(world.stats.count(), 0);
}

#[tokio::test]
async fn test_planes_are_independent() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let base = RegionRequest::new(source.id(), 1.0, 0, 0, 64, 64).unwrap();
    let r00 = source.read(&base).await.unwrap();
    let r10 = source.read(&base.clone().with_plane(1, 0)).await.unwrap();
    let r01 = source.read(&base.clone().with_plane(0, 1)).await.unwrap();

    assert_eq!(sample_u8(&r00, 3, 5), pixel_value(0, 3, 5, 0, 0));
    assert_eq!(sample_u8(&r10, 3, 5), pixel_value(0, 3, 5, 1, 0));
    assert_eq!(sample_u8(&r01, 3, 5), pixel_value(0, 3, 5, 0, 1));
    assert_ne!(r00, r10);
    assert_ne!(r00, r01);
}

#[tokio::test]
async fn test_plane_out_of_range_is_invalid_request() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let region = RegionRequest::new(source.id(), 1.0, 0, 0, 64, 64)
        .unwrap()
        .with_plane(2, 0);
    let err = source.read(&region).await.unwrap_err();
    assert!(matches!(
        err,
        ReadError::InvalidRequest(RequestError::PlaneOutOfRange { z: 2, .. })
    ));
    // Rejected before any I/O
    assert_eq!(world.stats.count(), 0);
}

#[tokio::test]
async fn test_downsample_coarser_than_every_level() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    // Coarsest native level is 4; the stitcher produces the rest
    let region = source.full_region(16.0).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(raster.dimensions(), (64, 48));

    // Served from level 1 (2x2 grid of 128px tiles), not an invented level
    assert_eq!(world.stats.count(), 4);
}

#[tokio::test]
async fn test_upsampling_uses_finest_level() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let region = RegionRequest::new(source.id(), 0.5, 0, 0, 100, 60).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(raster.dimensions(), (200, 120));
    // One level-0 tile covers the whole request
    assert_eq!(world.stats.count(), 1);
}

#[tokio::test]
async fn test_request_addressed_to_other_source_rejected() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let foreign = RegionRequest::new("synthetic://other", 1.0, 0, 0, 64, 64).unwrap();
    let err = source.read(&foreign).await.unwrap_err();
    assert!(matches!(
        err,
        ReadError::InvalidRequest(RequestError::SourceMismatch { .. })
    ));
}
