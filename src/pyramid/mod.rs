//! Pyramid grid resolution.
//!
//! A pyramidal image declares a list of native resolution levels, each with
//! its own downsample factor, pixel extent and tile size. This module
//! partitions every level into a fixed row-major tile grid and maps region
//! requests onto canonical tile identities at one chosen level.
//!
//! The grid is the deduplication mechanism: distinct but overlapping region
//! requests that select the same level necessarily resolve to overlapping
//! sets of [`TileKey`]s, so the cache collapses their storage reads.
//!
//! ```text
//!   RegionRequest ──▶ level selection ──▶ level-space rect ──▶ TileKeys
//!                     (floor rule)        (divide by ds)       (row-major)
//! ```

pub mod grid;
pub mod key;

pub use grid::{LevelGrid, LevelInfo, ResolvedRegion, TileGrid, DOWNSAMPLE_TOLERANCE};
pub use key::TileKey;
