//! Shared test fixtures: a synthetic pyramid backend with deterministic
//! pixels, fetch counting, failure injection and optional latency.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Duration};

use wsi_regions::pyramid::LevelInfo;
use wsi_regions::{
    BackendBuilder, BackendRegistry, DecodeError, OpenError, OpenOptions, PixelLayout, Raster,
    Source, SourceMetadata, TileBackend, TileCache, TileKey,
};

/// Deterministic pixel function shared by the backend and the tests'
/// expectations.
pub fn pixel_value(level: u32, x: u32, y: u32, z: u32, t: u32) -> u8 {
    ((x * 7 + y * 13 + level * 31 + z * 101 + t * 151) % 251) as u8
}

/// One sample of a gray8 raster.
pub fn sample_u8(raster: &Raster, x: u32, y: u32) -> u8 {
    let stride = raster.width() as usize * raster.layout().bytes_per_pixel();
    raster.data()[y as usize * stride + x as usize]
}

// =============================================================================
// Synthetic Backend
// =============================================================================

#[derive(Default)]
pub struct FetchStats {
    fetches: AtomicUsize,
}

impl FetchStats {
    pub fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

/// Tiles (level, x, y) whose fetches fail with an injected I/O error.
#[derive(Default)]
pub struct FailSet {
    tiles: Mutex<HashSet<(u32, u32, u32)>>,
}

impl FailSet {
    pub fn fail(&self, level: u32, x: u32, y: u32) {
        self.tiles.lock().insert((level, x, y));
    }

    pub fn clear(&self) {
        self.tiles.lock().clear();
    }

    fn hit(&self, key: &TileKey) -> bool {
        self.tiles.lock().contains(&(key.level, key.x, key.y))
    }
}

struct SyntheticBackend {
    metadata: SourceMetadata,
    stats: Arc<FetchStats>,
    fail: Arc<FailSet>,
    latency: Option<Duration>,
}

#[async_trait]
impl TileBackend for SyntheticBackend {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn fetch_tile(&self, key: &TileKey) -> Result<Raster, DecodeError> {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        if self.fail.hit(key) {
            return Err(DecodeError::Io("injected failure".to_string()));
        }
        self.stats.fetches.fetch_add(1, Ordering::SeqCst);

        let channels = self.metadata.layout.channels as usize;
        let mut data = Vec::with_capacity((key.width * key.height) as usize * channels);
        for ty in 0..key.height {
            for tx in 0..key.width {
                let v = pixel_value(key.level, key.x + tx, key.y + ty, key.z, key.t);
                for _ in 0..channels {
                    data.push(v);
                }
            }
        }
        Raster::from_vec(self.metadata.layout, key.width, key.height, data)
    }
}

/// Builder claiming `synthetic://` locators.
pub struct SyntheticBuilder {
    pub metadata: SourceMetadata,
    pub stats: Arc<FetchStats>,
    pub fail: Arc<FailSet>,
    pub latency: Option<Duration>,
}

#[async_trait]
impl BackendBuilder for SyntheticBuilder {
    fn tag(&self) -> &'static str {
        "synthetic"
    }

    fn claims(&self, locator: &str) -> bool {
        locator.starts_with("synthetic://")
    }

    async fn open(
        &self,
        _locator: &str,
        _args: &BTreeMap<String, String>,
    ) -> Result<Box<dyn TileBackend>, OpenError> {
        Ok(Box::new(SyntheticBackend {
            metadata: self.metadata.clone(),
            stats: Arc::clone(&self.stats),
            fail: Arc::clone(&self.fail),
            latency: self.latency,
        }))
    }
}

// =============================================================================
// World
// =============================================================================

/// A registry + cache wired around one synthetic pyramid.
pub struct World {
    pub registry: BackendRegistry,
    pub cache: Arc<TileCache>,
    pub stats: Arc<FetchStats>,
    pub fail: Arc<FailSet>,
}

/// Two-level pyramid over a 1024x768 extent with 2 focal and 2 time planes:
/// level 0 at downsample 1 (256px tiles, 4x3 grid), level 1 at downsample 4
/// (256x192, 128px tiles, 2x2 grid).
pub fn two_level_metadata() -> SourceMetadata {
    SourceMetadata {
        width: 1024,
        height: 768,
        size_z: 2,
        size_t: 2,
        levels: vec![
            LevelInfo::new(1.0, 1024, 768, 256, 256),
            LevelInfo::new(4.0, 256, 192, 128, 128),
        ],
        layout: PixelLayout::gray8(),
        pixel_size_um: Some((0.5, 0.5)),
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_cache_budget(wsi_regions::DEFAULT_CACHE_BYTES)
    }

    pub fn with_cache_budget(budget: usize) -> Self {
        Self::build(two_level_metadata(), budget, None)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self::build(
            two_level_metadata(),
            wsi_regions::DEFAULT_CACHE_BYTES,
            Some(latency),
        )
    }

    pub fn build(metadata: SourceMetadata, budget: usize, latency: Option<Duration>) -> Self {
        let stats = Arc::new(FetchStats::default());
        let fail = Arc::new(FailSet::default());
        let mut registry = BackendRegistry::empty();
        registry.register(Arc::new(SyntheticBuilder {
            metadata,
            stats: Arc::clone(&stats),
            fail: Arc::clone(&fail),
            latency,
        }));
        Self {
            registry,
            cache: Arc::new(TileCache::with_budget(budget)),
            stats,
            fail,
        }
    }

    pub async fn open(&self, locator: &str) -> Source {
        self.registry
            .open(
                locator,
                BTreeMap::new(),
                OpenOptions::new(Arc::clone(&self.cache)),
            )
            .await
            .expect("synthetic source should open")
    }
}
