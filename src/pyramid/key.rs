//! Canonical tile identity.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of one storage tile: the unit of fetching and caching.
///
/// The bounding box is expressed in the tile's own level coordinates, not
/// full resolution; the equivalent full-resolution rectangle is recovered by
/// multiplying by `downsample`. For a fixed (source, level, plane) the set of
/// all keys partitions the level extent exactly: no gaps, no overlaps, and
/// only the last row/column may be smaller than the nominal tile size.
#[derive(Debug, Clone)]
pub struct TileKey {
    /// Source image identifier; prevents collisions in the shared cache
    pub source_id: Arc<str>,

    /// Pyramid level index (0 = finest)
    pub level: u32,

    /// The level's downsample factor
    pub downsample: f64,

    /// Tile origin in level coordinates
    pub x: u32,
    pub y: u32,

    /// Tile size in level pixels (edge tiles may be clipped)
    pub width: u32,
    pub height: u32,

    /// Focal plane index
    pub z: u32,

    /// Time plane index
    pub t: u32,
}

impl TileKey {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: impl Into<Arc<str>>,
        level: u32,
        downsample: f64,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        z: u32,
        t: u32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            level,
            downsample,
            x,
            y,
            width,
            height,
            z,
            t,
        }
    }

    /// The tile's rectangle in full-resolution coordinates, `(x, y, width,
    /// height)`. Width and height are computed from the scaled edges so that
    /// adjacent tiles stay adjacent after rounding.
    pub fn full_res_bounds(&self) -> (i64, i64, u32, u32) {
        let x0 = (self.x as f64 * self.downsample).round() as i64;
        let y0 = (self.y as f64 * self.downsample).round() as i64;
        let x1 = ((self.x + self.width) as f64 * self.downsample).round() as i64;
        let y1 = ((self.y + self.height) as f64 * self.downsample).round() as i64;
        (x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    /// Approximate decoded size in bytes for the given bytes-per-pixel.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// Same bitwise treatment of the f64 field as RegionRequest: downsamples come
// from validated metadata (finite, positive), so bit equality is value
// equality and stays consistent with Hash.
impl PartialEq for TileKey {
    fn eq(&self, other: &Self) -> bool {
        self.source_id == other.source_id
            && self.level == other.level
            && self.downsample.to_bits() == other.downsample.to_bits()
            && self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.z == other.z
            && self.t == other.t
    }
}

impl Eq for TileKey {}

impl Hash for TileKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_id.hash(state);
        self.level.hash(state);
        self.downsample.to_bits().hash(state);
        self.x.hash(state);
        self.y.hash(state);
        self.width.hash(state);
        self.height.hash(state);
        self.z.hash(state);
        self.t.hash(state);
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} L{} [{},{} {}x{}] z={} t={}",
            self.source_id, self.level, self.x, self.y, self.width, self.height, self.z, self.t
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
