//! Opening sources: registry probing, descriptor persistence and reopen,
//! metadata validation, and pyramid level selection.

use std::collections::BTreeMap;
use std::sync::Arc;

use wsi_regions::pyramid::LevelInfo;
use wsi_regions::{OpenError, OpenOptions, SourceDescriptor};

use super::test_utils::{two_level_metadata, World};

#[tokio::test]
async fn test_unclaimed_locator_is_unsupported() {
    let world = World::new();
    let err = world
        .registry
        .open(
            "ftp://elsewhere/slide.bin",
            BTreeMap::new(),
            OpenOptions::new(Arc::clone(&world.cache)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpenError::UnsupportedSource { locator } if locator == "ftp://elsewhere/slide.bin"
    ));
}

#[tokio::test]
async fn test_descriptor_reopens_same_source() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let json = source.descriptor().to_json().unwrap();
    drop(source);

    let descriptor = SourceDescriptor::from_json(&json).unwrap();
    let reopened = world
        .registry
        .open_descriptor(&descriptor, OpenOptions::new(Arc::clone(&world.cache)))
        .await
        .unwrap();

    // Same identity, so cache keys from before the reopen still apply
    assert_eq!(reopened.id(), "synthetic://slide");
    assert_eq!(reopened.descriptor(), &descriptor);
}

#[tokio::test]
async fn test_descriptor_with_unknown_tag_rejected() {
    let world = World::new();
    let descriptor = SourceDescriptor::new("holographic", "synthetic://slide");
    let err = world
        .registry
        .open_descriptor(&descriptor, OpenOptions::new(Arc::clone(&world.cache)))
        .await
        .unwrap_err();
    assert!(matches!(err, OpenError::UnknownBackend { tag } if tag == "holographic"));
}

#[tokio::test]
async fn test_backend_with_inconsistent_pyramid_rejected() {
    // Downsamples must be strictly increasing from the finest level
    let mut metadata = two_level_metadata();
    metadata.levels = vec![
        LevelInfo::new(1.0, 1024, 768, 256, 256),
        LevelInfo::new(0.5, 2048, 1536, 256, 256),
    ];
    let world = World::build(metadata, wsi_regions::DEFAULT_CACHE_BYTES, None);

    let err = world
        .registry
        .open(
            "synthetic://bad",
            BTreeMap::new(),
            OpenOptions::new(Arc::clone(&world.cache)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpenError::InvalidMetadata { .. }));
}

#[tokio::test]
async fn test_level_selection_by_fetch_count() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    // Downsample 4 is native to level 1: its whole 2x2 grid serves the
    // full extent
    let region = source.full_region(4.0).unwrap();
    source.read(&region).await.unwrap();
    assert_eq!(world.stats.count(), 4);

    // Downsample 2 has no native level; the floor rule picks the finer
    // level 0 (4x3 grid) and downscales
    let region = source.full_region(2.0).unwrap();
    source.read(&region).await.unwrap();
    assert_eq!(world.stats.count(), 4 + 12);
}

#[tokio::test]
async fn test_near_native_downsample_snaps_to_level() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    // Just under the native factor, within tolerance: still level 1
    let region = source.full_region(4.0 - 1e-9).unwrap();
    let raster = source.read(&region).await.unwrap();
    assert_eq!(world.stats.count(), 4);
    assert_eq!(raster.dimensions(), (256, 192));
}

#[tokio::test]
async fn test_metadata_surfaces_through_source() {
    let world = World::new();
    let source = world.open("synthetic://slide").await;

    let md = source.metadata();
    assert_eq!((md.width, md.height), (1024, 768));
    assert_eq!((md.size_z, md.size_t), (2, 2));
    assert_eq!(md.pixel_size_um, Some((0.5, 0.5)));

    let grid = source.grid();
    assert_eq!(grid.levels().len(), 2);
    assert_eq!(grid.level(0).unwrap().tile_count(), 12);
    assert_eq!(grid.level(1).unwrap().tile_count(), 4);
}
