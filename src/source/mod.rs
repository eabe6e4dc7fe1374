//! Open sources and the region-read pipeline.
//!
//! A [`Source`] is one open pyramidal image: a reader backend bound to the
//! shared tile cache and a lazily built tile grid. Its lifecycle is
//! open → (grid built on first access) → serving reads → closed; a closed
//! source never reopens.
//!
//! `read` is the crate's central operation:
//!
//! 1. validate the request against the source's metadata
//! 2. clip the rectangle to the image extent
//! 3. resolve the clipped region to canonical tiles at one pyramid level
//! 4. fetch each tile through the cache (single-flight, row-major order)
//! 5. stitch and resample the tiles into the output raster
//!
//! Any number of reads may run concurrently across any number of sources;
//! the only shared mutable state is the tile cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{info, trace};

use crate::error::{DecodeError, ReadError, RequestError};
use crate::pyramid::grid::TileGrid;
use crate::raster::Raster;
use crate::region::RegionRequest;
use crate::tile::{assemble, Frame, Resampling, TileCache, TileHandle};

mod backend;
mod descriptor;
mod image_file;
mod registry;

pub use backend::{BackendBuilder, SourceMetadata, TileBackend};
pub use descriptor::SourceDescriptor;
pub use image_file::{ImageFileBackend, ImageFileBuilder};
pub use registry::BackendRegistry;

// =============================================================================
// Open Options
// =============================================================================

/// Per-source configuration supplied at open time.
#[derive(Clone)]
pub struct OpenOptions {
    /// The shared tile cache this source fetches through
    pub cache: Arc<TileCache>,

    /// Scaling policy when the requested downsample does not match a native
    /// level
    pub resampling: Resampling,
}

impl OpenOptions {
    pub fn new(cache: Arc<TileCache>) -> Self {
        Self {
            cache,
            resampling: Resampling::default(),
        }
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }
}

// =============================================================================
// Source
// =============================================================================

/// One open image, serving region reads until closed.
pub struct Source {
    id: Arc<str>,
    descriptor: SourceDescriptor,
    backend: Arc<dyn TileBackend>,
    cache: Arc<TileCache>,
    resampling: Resampling,
    grid: OnceLock<TileGrid>,
    closed: AtomicBool,
}

impl Source {
    pub(crate) fn new(
        descriptor: SourceDescriptor,
        backend: Arc<dyn TileBackend>,
        options: OpenOptions,
    ) -> Self {
        Self {
            id: Arc::from(descriptor.source_id().as_str()),
            descriptor,
            backend,
            cache: options.cache,
            resampling: options.resampling,
            grid: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Stable identity of this source; the `source_id` component of every
    /// request and tile key it serves.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The descriptor this source can be reopened from.
    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// The backend's immutable image description.
    pub fn metadata(&self) -> &SourceMetadata {
        self.backend.metadata()
    }

    pub fn resampling(&self) -> Resampling {
        self.resampling
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The source's tile grid, built on first access and reused for the
    /// source's lifetime.
    pub fn grid(&self) -> &TileGrid {
        self.grid.get_or_init(|| {
            let md = self.backend.metadata();
            TileGrid::new(self.id.clone(), &md.levels, md.size_z, md.size_t)
        })
    }

    /// A request covering the full image extent, addressed to this source.
    pub fn full_region(&self, downsample: f64) -> Result<RegionRequest, RequestError> {
        let md = self.metadata();
        RegionRequest::full_extent(self.id.clone(), downsample, md.width, md.height)
    }

    /// Read the pixels of one region.
    ///
    /// The output raster is sized by the request's own rounding law,
    /// `(ceil(width / downsample), ceil(height / downsample))`, after
    /// clipping to the image extent; a fully clipped request yields a 0x0
    /// raster. Any single tile failure fails the whole read with that tile's
    /// identity, and no partial raster escapes.
    pub async fn read(&self, region: &RegionRequest) -> Result<Raster, ReadError> {
        if self.is_closed() {
            return Err(ReadError::SourceClosed {
                source_id: self.id.to_string(),
            });
        }
        let md = self.backend.metadata();
        if region.source_id() != &*self.id {
            return Err(RequestError::SourceMismatch {
                requested: region.source_id().to_string(),
                actual: self.id.to_string(),
            }
            .into());
        }
        if region.z() >= md.size_z || region.t() >= md.size_t {
            return Err(RequestError::PlaneOutOfRange {
                z: region.z(),
                t: region.t(),
                size_z: md.size_z,
                size_t: md.size_t,
            }
            .into());
        }

        let Some(clipped) = region.clipped_to(md.width, md.height) else {
            return Ok(Raster::empty(md.layout));
        };

        let resolved = self.grid().resolve(&clipped);
        let (out_width, out_height) = clipped.output_size();
        trace!(
            region = %clipped,
            level = resolved.level,
            tiles = resolved.tile_count(),
            out_width,
            out_height,
            "region read"
        );

        let frame = Frame::new(
            clipped.x(),
            clipped.y(),
            clipped.width(),
            clipped.height(),
            clipped.downsample(),
            &resolved,
            out_width,
            out_height,
        );

        // Row-major, one at a time: deterministic first-failure reporting
        let mut handles: Vec<TileHandle> = Vec::with_capacity(resolved.keys.len());
        for key in &resolved.keys {
            let handle = self
                .cache
                .get_or_fetch(key, {
                    let backend = Arc::clone(&self.backend);
                    let key = key.clone();
                    let layout = md.layout;
                    move || async move {
                        let raster = backend.fetch_tile(&key).await?;
                        if raster.dimensions() != (key.width, key.height)
                            || raster.layout() != layout
                        {
                            return Err(DecodeError::Corrupt(format!(
                                "backend produced {}x{} {} for a {}x{} {} tile",
                                raster.width(),
                                raster.height(),
                                raster.layout(),
                                key.width,
                                key.height,
                                layout
                            )));
                        }
                        Ok(raster)
                    }
                })
                .await
                .map_err(|source| ReadError::Decode {
                    tile: key.clone(),
                    source,
                })?;
            handles.push(handle);
        }

        // Fast path: exact level match, integer-aligned, fully inside one
        // tile. Hand back a clipped view of the tile raster.
        if frame.is_direct_copy() && handles.len() == 1 {
            let key = &resolved.keys[0];
            let (lx, ly) = (frame.x0 as u32, frame.y0 as u32);
            if lx >= key.x && ly >= key.y {
                if let Some(view) =
                    handles[0]
                        .raster()
                        .crop(lx - key.x, ly - key.y, out_width, out_height)
                {
                    return Ok(view);
                }
            }
        }

        let tiles: Vec<Raster> = handles.iter().map(|h| h.raster().clone()).collect();
        assemble(&frame, md.layout, &resolved, &tiles, self.resampling)
    }

    /// Close the source: release the backend and invalidate this source's
    /// cache entries. Idempotent; reads after close fail with
    /// [`ReadError::SourceClosed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.backend.close().await;
        let purged = self.cache.purge_source(&self.id);
        info!(source_id = %self.id, purged, "closed source");
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("closed", &self.is_closed())
            .finish()
    }
}
