//! Tile caching and stitching.
//!
//! The read pipeline between the grid resolver and the caller:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Source::read               │
//! └────────────────────┬────────────────────┘
//!                      │ TileKeys (row-major)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileCache                 │
//! │   single-flight fetch, byte-budget LRU, │
//! │   pinned TileHandles                    │
//! └────────────────────┬────────────────────┘
//!                      │ tile rasters
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            stitch / resample            │
//! │   nearest · bilinear · area average     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! - [`TileCache`]: process-wide cache of decoded tiles, shared by all open
//!   sources, with at-most-one in-flight fetch per tile identity
//! - [`TileHandle`]: pinned view of one cached tile
//! - [`Resampling`]: per-source scaling policy applied during stitching

mod cache;
mod stitch;

pub use cache::{CacheStats, TileCache, TileHandle, DEFAULT_CACHE_BYTES};
pub use stitch::Resampling;

pub(crate) use stitch::{assemble, Frame};
