//! # wsi-regions
//!
//! Region-addressed random access to arbitrarily large pyramidal images:
//! give it a bounding box, a downsample factor and a focal/time plane, get
//! back a pixel raster, with the underlying storage tiles fetched at most
//! once and cached across requests.
//!
//! ## Architecture
//!
//! - [`region`] - Region request descriptors (rectangle, plane, downsample)
//! - [`pyramid`] - Tile grids, level selection, region-to-tile resolution
//! - [`tile`] - Shared tile cache (single-flight, byte-budget LRU) and the
//!   stitcher/resampler
//! - [`source`] - Reader backends, the probing registry, open sources
//! - [`raster`] - Pixel buffer value type
//! - [`config`] - CLI and configuration types
//!
//! Control flow of one read: request → grid resolver (region → tile set at
//! one chosen level) → tile cache (tile → raster, fetching on miss) →
//! stitcher (tiles → output raster).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use wsi_regions::{BackendRegistry, OpenOptions, RegionRequest, TileCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // One cache, shared by every source opened against it
//!     let cache = Arc::new(TileCache::with_budget(256 * 1024 * 1024));
//!     let registry = BackendRegistry::new();
//!
//!     let source = registry
//!         .open("slide.png", BTreeMap::new(), OpenOptions::new(cache))
//!         .await?;
//!
//!     // 2000x2000 full-resolution pixels at quarter resolution: 500x500 out
//!     let region = RegionRequest::new(source.id(), 4.0, 10_000, 8_000, 2_000, 2_000)?;
//!     let raster = source.read(&region).await?;
//!     assert_eq!(raster.dimensions(), (500, 500));
//!
//!     source.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pyramid;
pub mod raster;
pub mod region;
pub mod source;
pub mod tile;

pub use error::{DecodeError, OpenError, ReadError, RequestError};
pub use pyramid::{TileGrid, TileKey};
pub use raster::{PixelLayout, PixelType, Raster};
pub use region::RegionRequest;
pub use source::{
    BackendBuilder, BackendRegistry, OpenOptions, Source, SourceDescriptor, SourceMetadata,
    TileBackend,
};
pub use tile::{CacheStats, Resampling, TileCache, TileHandle, DEFAULT_CACHE_BYTES};
