//! Cache behavior observed through whole region reads: dedup across
//! overlapping requests, single-flight under concurrency, failure
//! propagation and retry, eviction, and source-close purging.

use std::sync::Arc;

use tokio::time::Duration;

use wsi_regions::{ReadError, RegionRequest};

use super::test_utils::{pixel_value, sample_u8, World};

#[tokio::test]
async fn test_overlapping_reads_share_tiles() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    // Covers level-0 tiles (0..2)x(0..2)
    let first = RegionRequest::new(source.id(), 1.0, 0, 0, 512, 512).unwrap();
    source.read(&first).await.unwrap();
    assert_eq!(world.stats.count(), 4);

    // Fully inside the tiles the first read warmed: zero new fetches
    let second = RegionRequest::new(source.id(), 1.0, 100, 100, 300, 300).unwrap();
    source.read(&second).await.unwrap();
    assert_eq!(world.stats.count(), 4);

    // Slightly different downsample that still resolves to level 0 shares
    // the same tile identities
    let third = RegionRequest::new(source.id(), 1.0000001, 100, 100, 300, 300).unwrap();
    source.read(&third).await.unwrap();
    assert_eq!(world.stats.count(), 4);

    // Extending one tile column to the right fetches only the new tiles
    let fourth = RegionRequest::new(source.id(), 1.0, 200, 0, 500, 512).unwrap();
    source.read(&fourth).await.unwrap();
    assert_eq!(world.stats.count(), 6);
}

#[tokio::test]
async fn test_concurrent_reads_single_flight() {
    let world = World::with_latency(Duration::from_millis(20));
    let source = Arc::new(world.open("synthetic://slide").await);

    // All tasks read the same region while nothing is cached; every tile
    // must be fetched exactly once
    let region = RegionRequest::new(source.id(), 1.0, 0, 0, 512, 512).unwrap();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let source = Arc::clone(&source);
        let region = region.clone();
        tasks.push(tokio::spawn(async move {
            source.read(&region).await.unwrap()
        }));
    }

    let mut rasters = Vec::new();
    for task in tasks {
        rasters.push(task.await.unwrap());
    }
    assert_eq!(world.stats.count(), 4);
    for raster in &rasters[1..] {
        assert_eq!(raster, &rasters[0]);
    }
}

#[tokio::test]
async fn test_tile_failure_fails_whole_read() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    // Second tile of the first row fails
    world.fail.fail(0, 256, 0);

    let region = RegionRequest::new(source.id(), 1.0, 0, 0, 512, 512).unwrap();
    let err = source.read(&region).await.unwrap_err();
    let ReadError::Decode { tile, .. } = err else {
        panic!("expected decode failure");
    };
    assert_eq!((tile.level, tile.x, tile.y), (0, 256, 0));

    // Row-major order: the tile before the failing one was fetched, the
    // ones after were not attempted
    assert_eq!(world.stats.count(), 1);

    // The failure was not cached; clearing the fault lets a retry succeed
    world.fail.clear();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(raster.dimensions(), (512, 512));
    assert_eq!(sample_u8(&raster, 300, 10), pixel_value(0, 300, 10, 0, 0));
    // Retry refetched only the three tiles that never made it into cache
    assert_eq!(world.stats.count(), 4);
}

#[tokio::test]
async fn test_eviction_keeps_cache_within_budget() {
    // Budget fits three 256x256 gray8 tiles (65536 bytes each)
    let world = World::with_cache_budget(3 * 256 * 256);
    let source = world.open("synthetic://slide").await;

    // Touch all twelve level-0 tiles
    let region = source.full_region(1.0).unwrap();
    source.read(&region).await.unwrap();
    assert_eq!(world.stats.count(), 12);
    assert!(world.cache.total_bytes() <= 3 * 256 * 256);

    // A re-read now misses on the evicted tiles
    source.read(&region).await.unwrap();
    assert!(world.stats.count() > 12);
}

#[tokio::test]
async fn test_close_purges_and_blocks_reads() {
    let world = World::new();
    let a = world.open("synthetic://a").await;
    let b = world.open("synthetic://b").await;

    let region_a = RegionRequest::new(a.id(), 1.0, 0, 0, 512, 512).unwrap();
    let region_b = RegionRequest::new(b.id(), 1.0, 0, 0, 512, 512).unwrap();
    a.read(&region_a).await.unwrap();
    b.read(&region_b).await.unwrap();
    assert_eq!(world.cache.len(), 8);

    a.close().await;
    assert!(a.is_closed());
    // Only b's entries remain
    assert_eq!(world.cache.len(), 4);

    let err = a.read(&region_a).await.unwrap_err();
    assert!(matches!(err, ReadError::SourceClosed { .. }));

    // b is unaffected and still cache-warm
    let before = world.stats.count();
    b.read(&region_b).await.unwrap();
    assert_eq!(world.stats.count(), before);
}

#[tokio::test]
async fn test_reopen_after_close_refetches() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;
    let region = RegionRequest::new(source.id(), 1.0, 0, 0, 256, 256).unwrap();

    let first = source.read(&region).await.unwrap();
    source.close().await;
    assert_eq!(world.cache.len(), 0);

    // A fresh open of the same locator shares the id, so its reads rebuild
    // the same key space
    let reopened = world.open("synthetic://slide").await;
    assert_eq!(reopened.id(), "synthetic://slide");
    let second = reopened.read(&region).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(world.stats.count(), 2);
}

#[tokio::test]
async fn test_co_registered_sources_have_distinct_tile_spaces() {
    let world = World::new();
    let image = world.open("synthetic://image").await;
    let mask = world.open("synthetic://mask").await;

    let region = RegionRequest::new(image.id(), 1.0, 10, 10, 200, 200).unwrap();
    image.read(&region).await.unwrap();
    assert_eq!(world.stats.count(), 1);

    // Same geometry re-addressed to the co-registered source: same shape,
    // separate cache keys, so a real fetch happens
    let mask_region = region.with_source_id(mask.id());
    let mask_raster = mask.read(&mask_region).await.unwrap();
    assert_eq!(world.stats.count(), 2);
    assert_eq!(mask_raster.dimensions(), (200, 200));
}
