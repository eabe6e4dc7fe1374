//! Reader backend contract.
//!
//! A backend is the per-format decoder that produces pixel bytes for one
//! canonical tile. Backends are selected capability-style at open time: the
//! registry probes every registered [`BackendBuilder`] and the first one
//! claiming a locator opens it. Each open backend exposes metadata, tile
//! fetching and close, nothing else; grid resolution, caching and stitching
//! live outside it.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{DecodeError, OpenError};
use crate::pyramid::grid::LevelInfo;
use crate::pyramid::TileKey;
use crate::raster::{PixelLayout, Raster};

// =============================================================================
// Source Metadata
// =============================================================================

/// Immutable description of one open image: full extent, plane counts,
/// native pyramid levels and pixel layout. Fixed at open time.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    /// Full-resolution extent in pixels
    pub width: u32,
    pub height: u32,

    /// Plane counts in the two independent plane dimensions; both at least 1
    pub size_z: u32,
    pub size_t: u32,

    /// Native levels, sorted by strictly increasing downsample; level 0 must
    /// be the finest
    pub levels: Vec<LevelInfo>,

    /// Channel count and sample depth, fixed for every tile of the source
    pub layout: PixelLayout,

    /// Physical size of one full-resolution pixel in micrometers, when known
    pub pixel_size_um: Option<(f64, f64)>,
}

impl SourceMetadata {
    /// Check the declared pyramid for consistency.
    ///
    /// Backends can declare arbitrary geometry; everything downstream (grid
    /// construction, level selection) assumes these invariants, so they are
    /// enforced once at open.
    pub fn validate(&self) -> Result<(), OpenError> {
        let fail = |reason: String| Err(OpenError::InvalidMetadata { reason });

        if self.width == 0 || self.height == 0 {
            return fail(format!("empty extent {}x{}", self.width, self.height));
        }
        if self.size_z == 0 || self.size_t == 0 {
            return fail(format!(
                "plane counts must be at least 1, got z={} t={}",
                self.size_z, self.size_t
            ));
        }
        if self.levels.is_empty() {
            return fail("no pyramid levels declared".to_string());
        }
        if self.layout.channels == 0 {
            return fail("zero channels".to_string());
        }

        let mut previous = 0.0f64;
        for (index, level) in self.levels.iter().enumerate() {
            if !level.downsample.is_finite() || level.downsample <= 0.0 {
                return fail(format!(
                    "level {} has invalid downsample {}",
                    index, level.downsample
                ));
            }
            if level.downsample <= previous {
                return fail(format!(
                    "level {} downsample {} does not increase over {}",
                    index, level.downsample, previous
                ));
            }
            if level.width == 0 || level.height == 0 {
                return fail(format!(
                    "level {} has empty extent {}x{}",
                    index, level.width, level.height
                ));
            }
            if level.tile_width == 0 || level.tile_height == 0 {
                return fail(format!(
                    "level {} has zero tile size {}x{}",
                    index, level.tile_width, level.tile_height
                ));
            }
            previous = level.downsample;
        }
        if (self.levels[0].downsample - 1.0).abs() > 1e-6 {
            return fail(format!(
                "finest level must have downsample 1.0, got {}",
                self.levels[0].downsample
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Backend Traits
// =============================================================================

/// One open image behind a format-specific decoder.
///
/// `fetch_tile` is the only operation expected to block on I/O or
/// decompression; it must produce a raster matching the key's bounds and the
/// declared layout exactly. Implementations are owned by their source and
/// never shared across sources.
#[async_trait]
pub trait TileBackend: Send + Sync {
    /// The immutable image description. Must not change after open.
    fn metadata(&self) -> &SourceMetadata;

    /// Decode the pixels of one canonical tile.
    async fn fetch_tile(&self, key: &TileKey) -> Result<Raster, DecodeError>;

    /// Release decoder resources. Fetches after close fail.
    async fn close(&self) {}
}

impl std::fmt::Debug for dyn TileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileBackend").finish_non_exhaustive()
    }
}

/// Capability probe and constructor for one backend kind.
///
/// Builders are registered with a [`crate::source::BackendRegistry`] and
/// probed in registration order at open time.
#[async_trait]
pub trait BackendBuilder: Send + Sync {
    /// Stable tag identifying this backend in serialized descriptors.
    fn tag(&self) -> &'static str;

    /// Whether this backend can handle the locator. Cheap, no I/O.
    fn claims(&self, locator: &str) -> bool;

    /// Open the locator.
    async fn open(
        &self,
        locator: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<Box<dyn TileBackend>, OpenError>;
}

// =============================================================================
// Tests
// =============================================================================
