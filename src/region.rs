//! Region request descriptor.
//!
//! A [`RegionRequest`] describes one rectangle of pixels to read from one
//! source: bounding box and plane in full-resolution coordinates plus the
//! requested downsample factor. It is an immutable value with structural
//! equality and hashing, so callers can use requests directly as map keys.
//!
//! # Coordinates
//!
//! All geometry is expressed at full resolution (downsample = 1) regardless
//! of the requested downsample. The bounding box may extend beyond the image
//! extent, or lie entirely outside it: out-of-range requests are clipped at
//! read time, never rejected at construction.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::RequestError;

/// An immutable region read request.
#[derive(Debug, Clone)]
pub struct RegionRequest {
    source_id: Arc<str>,
    downsample: f64,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    z: u32,
    t: u32,
}

impl RegionRequest {
    /// Create a request for a rectangle at plane (0, 0).
    ///
    /// Validates `width > 0`, `height > 0` and `downsample` positive and
    /// finite. The rectangle itself is not checked against any extent.
    pub fn new(
        source_id: impl Into<Arc<str>>,
        downsample: f64,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    ) -> Result<Self, RequestError> {
        if width == 0 || height == 0 {
            return Err(RequestError::EmptyRegion { width, height });
        }
        if !downsample.is_finite() || downsample <= 0.0 {
            return Err(RequestError::InvalidDownsample { downsample });
        }
        Ok(Self {
            source_id: source_id.into(),
            downsample,
            x,
            y,
            width,
            height,
            z: 0,
            t: 0,
        })
    }

    /// Create a request covering the full image extent at the given downsample.
    pub fn full_extent(
        source_id: impl Into<Arc<str>>,
        downsample: f64,
        extent_width: u32,
        extent_height: u32,
    ) -> Result<Self, RequestError> {
        Self::new(source_id, downsample, 0, 0, extent_width, extent_height)
    }

    /// Create a request from the axis-aligned bounding box of a point set
    /// (e.g. a polygon's vertices). Minima are floored, maxima are ceiled.
    ///
    /// Degenerate point sets (empty, or collapsing to a zero-area box on
    /// integer coordinates) are rejected like any other empty region.
    pub fn from_points(
        source_id: impl Into<Arc<str>>,
        downsample: f64,
        points: impl IntoIterator<Item = (f64, f64)>,
    ) -> Result<Self, RequestError> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut any = false;
        for (px, py) in points {
            any = true;
            min_x = min_x.min(px);
            min_y = min_y.min(py);
            max_x = max_x.max(px);
            max_y = max_y.max(py);
        }
        if !any {
            return Err(RequestError::NoPoints);
        }
        let x = min_x.floor() as i64;
        let y = min_y.floor() as i64;
        let width = (max_x.ceil() as i64 - x).max(0) as u32;
        let height = (max_y.ceil() as i64 - y).max(0) as u32;
        Self::new(source_id, downsample, x, y, width, height)
    }

    /// Set the (z, t) plane. Plane indices are validated against the
    /// source's declared plane counts at read time.
    pub fn with_plane(mut self, z: u32, t: u32) -> Self {
        self.z = z;
        self.t = t;
        self
    }

    /// Same geometry, different source. For reuse across co-registered
    /// images (e.g. a raw image and a derived mask).
    pub fn with_source_id(&self, source_id: impl Into<Arc<str>>) -> Self {
        Self {
            source_id: source_id.into(),
            ..self.clone()
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn downsample(&self) -> f64 {
        self.downsample
    }

    pub fn x(&self) -> i64 {
        self.x
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn z(&self) -> u32 {
        self.z
    }

    pub fn t(&self) -> u32 {
        self.t
    }

    /// Output raster dimensions under the rounding law
    /// `(ceil(width / downsample), ceil(height / downsample))`.
    ///
    /// Computed from the request's own fields, never from the pyramid level
    /// that ends up serving it, so identical nominal requests always produce
    /// identically-sized output.
    pub fn output_size(&self) -> (u32, u32) {
        let w = (self.width as f64 / self.downsample).ceil() as u32;
        let h = (self.height as f64 / self.downsample).ceil() as u32;
        (w, h)
    }

    /// Intersect the rectangle with the image extent `[0, width) x [0, height)`.
    ///
    /// Returns `None` when nothing remains; a read then yields a 0x0 raster.
    pub fn clipped_to(&self, extent_width: u32, extent_height: u32) -> Option<Self> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i64).min(extent_width as i64);
        let y1 = (self.y + self.height as i64).min(extent_height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            source_id: self.source_id.clone(),
            downsample: self.downsample,
            x: x0,
            y: y0,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            z: self.z,
            t: self.t,
        })
    }
}

// Structural equality: downsample compares by bit pattern. Construction
// rejects NaN and non-positive values, so bitwise equality matches value
// equality and stays consistent with Hash.
impl PartialEq for RegionRequest {
    fn eq(&self, other: &Self) -> bool {
        self.source_id == other.source_id
            && self.downsample.to_bits() == other.downsample.to_bits()
            && self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.z == other.z
            && self.t == other.t
    }
}

impl Eq for RegionRequest {}

impl Hash for RegionRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_id.hash(state);
        self.downsample.to_bits().hash(state);
        self.x.hash(state);
        self.y.hash(state);
        self.width.hash(state);
        self.height.hash(state);
        self.z.hash(state);
        self.t.hash(state);
    }
}

impl std::fmt::Display for RegionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ds={} [{},{} {}x{}] z={} t={}",
            self.source_id, self.downsample, self.x, self.y, self.width, self.height, self.z, self.t
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
