//! Tile grids and region resolution.
//!
//! Each pyramid level is partitioned into a row-major grid of nominally
//! fixed-size tiles, the final row/column clipped to the level extent. The
//! grid is closed-form arithmetic over the level's declared geometry; tile
//! identities are materialized only when a region resolves to them.

use std::ops::Range;
use std::sync::Arc;

use crate::pyramid::TileKey;
use crate::region::RegionRequest;

/// Relative tolerance when comparing a requested downsample against native
/// level downsamples, absorbing float fuzz in declared metadata.
pub const DOWNSAMPLE_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Level Geometry
// =============================================================================

/// Declared geometry of one native pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelInfo {
    /// Downsample factor relative to full resolution (1.0 = native)
    pub downsample: f64,

    /// Level extent in level pixels
    pub width: u32,
    pub height: u32,

    /// Nominal tile size; the last row/column of tiles may be smaller
    pub tile_width: u32,
    pub tile_height: u32,
}

impl LevelInfo {
    pub fn new(downsample: f64, width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            downsample,
            width,
            height,
            tile_width,
            tile_height,
        }
    }

    /// Derive a level's extent from the full-resolution extent.
    pub fn for_extent(
        downsample: f64,
        full_width: u32,
        full_height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Self {
        let width = (full_width as f64 / downsample).ceil() as u32;
        let height = (full_height as f64 / downsample).ceil() as u32;
        Self::new(downsample, width, height, tile_width, tile_height)
    }
}

/// One level's tile grid.
#[derive(Debug, Clone)]
pub struct LevelGrid {
    /// Level index in the pyramid (0 = finest)
    pub level: u32,

    /// Declared level geometry
    pub info: LevelInfo,

    /// Number of tile columns: `ceil(width / tile_width)`
    pub tiles_x: u32,

    /// Number of tile rows: `ceil(height / tile_height)`
    pub tiles_y: u32,
}

impl LevelGrid {
    fn new(level: u32, info: LevelInfo) -> Self {
        let tiles_x = info.width.div_ceil(info.tile_width);
        let tiles_y = info.height.div_ceil(info.tile_height);
        Self {
            level,
            info,
            tiles_x,
            tiles_y,
        }
    }

    pub fn downsample(&self) -> f64 {
        self.info.downsample
    }

    /// Total number of tiles at this level (per plane).
    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }

    /// Pixel bounds `(x, y, width, height)` of a grid cell, in level
    /// coordinates. Edge tiles are clipped to the level extent.
    ///
    /// Returns `None` if the coordinates are outside the grid.
    pub fn tile_bounds(&self, col: u32, row: u32) -> Option<(u32, u32, u32, u32)> {
        if col >= self.tiles_x || row >= self.tiles_y {
            return None;
        }
        let x = col * self.info.tile_width;
        let y = row * self.info.tile_height;
        let w = (x + self.info.tile_width).min(self.info.width) - x;
        let h = (y + self.info.tile_height).min(self.info.height) - y;
        Some((x, y, w, h))
    }

    /// Canonical identity of a grid cell for the given source and plane.
    pub fn key(&self, source_id: &Arc<str>, col: u32, row: u32, z: u32, t: u32) -> Option<TileKey> {
        let (x, y, w, h) = self.tile_bounds(col, row)?;
        Some(TileKey {
            source_id: source_id.clone(),
            level: self.level,
            downsample: self.info.downsample,
            x,
            y,
            width: w,
            height: h,
            z,
            t,
        })
    }

    /// Columns whose tiles intersect the half-open level-space span `[x0, x1)`.
    fn cols_intersecting(&self, x0: f64, x1: f64) -> Range<u32> {
        span_to_cells(x0, x1, self.info.tile_width, self.tiles_x)
    }

    /// Rows whose tiles intersect the half-open level-space span `[y0, y1)`.
    fn rows_intersecting(&self, y0: f64, y1: f64) -> Range<u32> {
        span_to_cells(y0, y1, self.info.tile_height, self.tiles_y)
    }
}

/// Map a fractional span onto the grid cells it touches.
fn span_to_cells(a0: f64, a1: f64, cell: u32, cells: u32) -> Range<u32> {
    if a1 <= a0 {
        return 0..0;
    }
    let start = ((a0 / cell as f64).floor().max(0.0) as u32).min(cells);
    let end = ((a1 / cell as f64).ceil().max(0.0) as u32).clamp(start, cells);
    start..end
}

// =============================================================================
// Tile Grid
// =============================================================================

/// All level grids of one source, plus its plane counts.
///
/// Built once per source (lazily, on first metadata or read access) from the
/// declared level list, which must be non-empty and sorted by strictly
/// increasing downsample; the source validates this at open.
#[derive(Debug, Clone)]
pub struct TileGrid {
    source_id: Arc<str>,
    size_z: u32,
    size_t: u32,
    levels: Vec<LevelGrid>,
}

impl TileGrid {
    pub fn new(source_id: impl Into<Arc<str>>, levels: &[LevelInfo], size_z: u32, size_t: u32) -> Self {
        let levels = levels
            .iter()
            .enumerate()
            .map(|(i, info)| LevelGrid::new(i as u32, info.clone()))
            .collect();
        Self {
            source_id: source_id.into(),
            size_z,
            size_t,
            levels,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: u32) -> Option<&LevelGrid> {
        self.levels.get(index as usize)
    }

    pub fn levels(&self) -> &[LevelGrid] {
        &self.levels
    }

    pub fn size_z(&self) -> u32 {
        self.size_z
    }

    pub fn size_t(&self) -> u32 {
        self.size_t
    }

    /// Select the level serving a requested downsample: the largest native
    /// downsample not exceeding the request (floor rule, within
    /// [`DOWNSAMPLE_TOLERANCE`]). Upsampling requests get the finest level;
    /// requests coarser than every level get the coarsest. The stitcher does
    /// any residual scaling, so a coarser level is never invented.
    pub fn level_for_downsample(&self, downsample: f64) -> &LevelGrid {
        let limit = downsample * (1.0 + DOWNSAMPLE_TOLERANCE);
        self.levels
            .iter()
            .filter(|l| l.info.downsample <= limit)
            .max_by(|a, b| a.info.downsample.partial_cmp(&b.info.downsample).unwrap())
            .unwrap_or(&self.levels[0])
    }

    /// Map a region onto the tiles covering it at the chosen level.
    ///
    /// The region is expected to be clipped to the image extent already;
    /// spans falling outside the level grid resolve to no tiles. Keys are
    /// emitted in row-major order.
    pub fn resolve(&self, region: &RegionRequest) -> ResolvedRegion {
        let level = self.level_for_downsample(region.downsample());
        let ds = level.info.downsample;

        let x0 = region.x() as f64 / ds;
        let y0 = region.y() as f64 / ds;
        let x1 = (region.x() + region.width() as i64) as f64 / ds;
        let y1 = (region.y() + region.height() as i64) as f64 / ds;

        let cols = level.cols_intersecting(x0, x1);
        let rows = level.rows_intersecting(y0, y1);

        let mut keys =
            Vec::with_capacity((cols.end - cols.start) as usize * (rows.end - rows.start) as usize);
        for row in rows.clone() {
            for col in cols.clone() {
                keys.extend(level.key(&self.source_id, col, row, region.z(), region.t()));
            }
        }

        ResolvedRegion {
            level: level.level,
            downsample: ds,
            level_width: level.info.width,
            level_height: level.info.height,
            tile_width: level.info.tile_width,
            tile_height: level.info.tile_height,
            cols,
            rows,
            keys,
        }
    }
}

/// Result of resolving one region: the chosen level and the covering tiles.
#[derive(Debug, Clone)]
pub struct ResolvedRegion {
    /// Chosen level index
    pub level: u32,

    /// Chosen level's downsample
    pub downsample: f64,

    /// Chosen level's extent, for clamping sample coordinates
    pub level_width: u32,
    pub level_height: u32,

    /// Chosen level's nominal tile size, for locating a tile by coordinate
    pub tile_width: u32,
    pub tile_height: u32,

    /// Covered grid column/row ranges
    pub cols: Range<u32>,
    pub rows: Range<u32>,

    /// Covering tiles in row-major order, one per (row, col) pair
    pub keys: Vec<TileKey>,
}

impl ResolvedRegion {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn tile_count(&self) -> usize {
        self.keys.len()
    }

    /// Index into `keys` for a grid cell, if it is part of this resolution.
    pub fn index_of(&self, col: u32, row: u32) -> Option<usize> {
        if !self.cols.contains(&col) || !self.rows.contains(&row) {
            return None;
        }
        let width = (self.cols.end - self.cols.start) as usize;
        Some((row - self.rows.start) as usize * width + (col - self.cols.start) as usize)
    }
}

// =============================================================================
// Tests
// =============================================================================
