//! Flat-image backend for ordinary png/jpeg files.
//!
//! Presents a single-resolution image as a one-level pyramid, virtually
//! tiled at 256 pixels: the file is decoded once at open (off the async
//! runtime) and tile fetches are crops of the resident raster. Besides being
//! the default backend for everyday files, a single-level source exercises
//! the coarse end of level selection: any downsample beyond 1 is produced by
//! the stitcher, never by an invented level.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{DecodeError, OpenError};
use crate::pyramid::grid::LevelInfo;
use crate::pyramid::TileKey;
use crate::raster::{PixelLayout, Raster};
use crate::source::backend::{BackendBuilder, SourceMetadata, TileBackend};

/// Nominal tile size of the virtual grid.
pub const VIRTUAL_TILE_SIZE: u32 = 256;

const TAG: &str = "image-file";

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

// =============================================================================
// Backend
// =============================================================================

/// One decoded flat image serving virtual tiles.
pub struct ImageFileBackend {
    metadata: SourceMetadata,
    /// Dropped at close; fetches then fail
    pixels: RwLock<Option<Raster>>,
}

impl ImageFileBackend {
    fn new(raster: Raster) -> Self {
        let (width, height) = raster.dimensions();
        let metadata = SourceMetadata {
            width,
            height,
            size_z: 1,
            size_t: 1,
            levels: vec![LevelInfo::new(
                1.0,
                width,
                height,
                VIRTUAL_TILE_SIZE.min(width),
                VIRTUAL_TILE_SIZE.min(height),
            )],
            layout: raster.layout(),
            pixel_size_um: None,
        };
        Self {
            metadata,
            pixels: RwLock::new(Some(raster)),
        }
    }
}

#[async_trait]
impl TileBackend for ImageFileBackend {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn fetch_tile(&self, key: &TileKey) -> Result<Raster, DecodeError> {
        if key.level != 0 {
            return Err(DecodeError::Corrupt(format!(
                "flat image has no level {}",
                key.level
            )));
        }
        let pixels = self.pixels.read();
        let raster = pixels
            .as_ref()
            .ok_or_else(|| DecodeError::Io("backend is closed".to_string()))?;
        raster
            .crop(key.x, key.y, key.width, key.height)
            .ok_or_else(|| {
                DecodeError::Corrupt(format!(
                    "tile [{},{} {}x{}] outside image {}x{}",
                    key.x,
                    key.y,
                    key.width,
                    key.height,
                    raster.width(),
                    raster.height()
                ))
            })
    }

    async fn close(&self) {
        *self.pixels.write() = None;
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Claims locators by file extension and decodes them with the `image`
/// crate.
pub struct ImageFileBuilder;

#[async_trait]
impl BackendBuilder for ImageFileBuilder {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn claims(&self, locator: &str) -> bool {
        Path::new(locator)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
    }

    async fn open(
        &self,
        locator: &str,
        _args: &BTreeMap<String, String>,
    ) -> Result<Box<dyn TileBackend>, OpenError> {
        let path = locator.to_string();
        let backend_err = |source: DecodeError| OpenError::Backend {
            backend: TAG.to_string(),
            locator: path.clone(),
            source,
        };

        let decode_path = path.clone();
        let raster = tokio::task::spawn_blocking(move || decode_file(&decode_path))
            .await
            .map_err(|join| backend_err(DecodeError::TaskFailed(join.to_string())))?
            .map_err(backend_err)?;

        Ok(Box::new(ImageFileBackend::new(raster)))
    }
}

/// Decode a whole image file into an interleaved raster.
///
/// Runs on the blocking pool; large jpegs take real time to decode.
fn decode_file(path: &str) -> Result<Raster, DecodeError> {
    use image::DynamicImage;

    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) => DecodeError::Io(io.to_string()),
        other => DecodeError::Corrupt(other.to_string()),
    })?;

    let (layout, width, height, data) = match img {
        DynamicImage::ImageLuma8(buf) => {
            let (w, h) = buf.dimensions();
            (PixelLayout::gray8(), w, h, buf.into_raw())
        }
        DynamicImage::ImageRgb8(buf) => {
            let (w, h) = buf.dimensions();
            (PixelLayout::rgb8(), w, h, buf.into_raw())
        }
        DynamicImage::ImageRgba8(buf) => {
            let (w, h) = buf.dimensions();
            (PixelLayout::rgba8(), w, h, buf.into_raw())
        }
        DynamicImage::ImageLuma16(buf) => {
            let (w, h) = buf.dimensions();
            let bytes: Vec<u8> = buf
                .into_raw()
                .into_iter()
                .flat_map(u16::to_ne_bytes)
                .collect();
            (PixelLayout::gray16(), w, h, bytes)
        }
        // Everything else (palettes, luma+alpha, 16-bit color) flattens
        // to 8-bit RGB
        other => {
            let buf = other.to_rgb8();
            let (w, h) = buf.dimensions();
            (PixelLayout::rgb8(), w, h, buf.into_raw())
        }
    };

    Raster::from_vec(layout, width, height, data)
}

// =============================================================================
// Tests
// =============================================================================
