//! Stitching and resampling of fetched tiles into the output raster.
//!
//! The grid resolver picks one pyramid level and the tiles covering the
//! request there; this module maps those tiles into the caller's output
//! raster, scaling by `requested_downsample / level_downsample` when the two
//! differ. Output size always follows the request's own rounding law, never
//! the chosen level.
//!
//! # Kernels
//!
//! - **Nearest**: each output pixel takes the one level pixel under its
//!   center. Exact when the scale is 1, so tile-aligned reads reproduce
//!   source bytes verbatim.
//! - **Bilinear**: level tiles are blitted into a level-space mosaic, then
//!   each output pixel interpolates its four neighbors. Chosen for
//!   upsampling, where the mosaic is no larger than the output.
//! - **Area average**: every level pixel splats its fractional footprint
//!   into the output with f64 accumulation, per tile, so no mosaic is
//!   materialized and tile seams carry no bias. Chosen for downsampling,
//!   where it suppresses aliasing.

use crate::error::{DecodeError, ReadError};
use crate::pyramid::grid::ResolvedRegion;
use crate::raster::{PixelLayout, PixelType, Raster, Sample};

/// Scales within this tolerance of 1.0 are treated as an exact copy.
const SCALE_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Resampling Policy
// =============================================================================

/// Resampling strategy for scaling between the chosen level and the output.
///
/// Set per source at open time. `Auto` picks area averaging when the level
/// data must shrink and bilinear when it must grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resampling {
    /// Area average when downscaling, bilinear when upscaling, straight
    /// copy when the scale is 1
    #[default]
    Auto,
    Nearest,
    Bilinear,
    AreaAverage,
}

impl Resampling {
    /// `scale` is level pixels per output pixel.
    fn kernel(self, scale: f64) -> Kernel {
        match self {
            Resampling::Auto => {
                if scale > 1.0 + SCALE_TOLERANCE {
                    Kernel::AreaAverage
                } else if scale < 1.0 - SCALE_TOLERANCE {
                    Kernel::Bilinear
                } else {
                    Kernel::Nearest
                }
            }
            Resampling::Nearest => Kernel::Nearest,
            Resampling::Bilinear => Kernel::Bilinear,
            Resampling::AreaAverage => Kernel::AreaAverage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Nearest,
    Bilinear,
    AreaAverage,
}

// =============================================================================
// Frame
// =============================================================================

/// Geometry of one stitch: the request rectangle in the chosen level's
/// coordinate space, and the output it maps to.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    /// Request rectangle in level coordinates (fractional when the request
    /// is not aligned to the level grid)
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,

    /// Level pixels per output pixel: `requested_downsample / level_downsample`
    pub scale: f64,

    pub out_width: u32,
    pub out_height: u32,
}

impl Frame {
    /// Build the frame for a clipped request resolved at `resolved`.
    ///
    /// `(x, y, width, height)` is the clipped rectangle in full-resolution
    /// coordinates; `(out_width, out_height)` comes from the request's own
    /// rounding law.
    pub fn new(
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        downsample: f64,
        resolved: &ResolvedRegion,
        out_width: u32,
        out_height: u32,
    ) -> Self {
        let ds = resolved.downsample;
        Self {
            x0: x as f64 / ds,
            y0: y as f64 / ds,
            x1: (x + width as i64) as f64 / ds,
            y1: (y + height as i64) as f64 / ds,
            scale: downsample / ds,
            out_width,
            out_height,
        }
    }

    /// Whether this stitch is a plain copy from a single tile: scale 1 and
    /// an integer-aligned rectangle. The caller can then return a clipped
    /// view of the tile raster without touching pixels.
    pub fn is_direct_copy(&self) -> bool {
        (self.scale - 1.0).abs() <= SCALE_TOLERANCE
            && self.x0.fract() == 0.0
            && self.y0.fract() == 0.0
            && (self.x1 - self.x0).round() as u32 == self.out_width
            && (self.y1 - self.y0).round() as u32 == self.out_height
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Compose `tiles` (parallel to `resolved.keys`, row-major) into the output
/// raster described by `frame`.
pub(crate) fn assemble(
    frame: &Frame,
    layout: PixelLayout,
    resolved: &ResolvedRegion,
    tiles: &[Raster],
    resampling: Resampling,
) -> Result<Raster, ReadError> {
    debug_assert_eq!(tiles.len(), resolved.keys.len());
    for (key, tile) in resolved.keys.iter().zip(tiles) {
        if tile.dimensions() != (key.width, key.height) || tile.layout() != layout {
            return Err(ReadError::Decode {
                tile: key.clone(),
                source: DecodeError::Corrupt(format!(
                    "tile decoded as {}x{} {}, expected {}x{} {}",
                    tile.width(),
                    tile.height(),
                    tile.layout(),
                    key.width,
                    key.height,
                    layout
                )),
            });
        }
    }

    let raster = match layout.pixel_type {
        PixelType::U8 => assemble_typed::<u8>(frame, layout, resolved, tiles, resampling),
        PixelType::U16 => assemble_typed::<u16>(frame, layout, resolved, tiles, resampling),
    };
    Ok(raster)
}

fn assemble_typed<S: Sample>(
    frame: &Frame,
    layout: PixelLayout,
    resolved: &ResolvedRegion,
    tiles: &[Raster],
    resampling: Resampling,
) -> Raster {
    let channels = layout.channels as usize;
    let mut out = vec![0u8; frame.out_width as usize * frame.out_height as usize * channels * S::BYTES];

    match resampling.kernel(frame.scale) {
        Kernel::Nearest => nearest::<S>(frame, channels, resolved, tiles, &mut out),
        Kernel::Bilinear => bilinear::<S>(frame, channels, resolved, tiles, &mut out),
        Kernel::AreaAverage => area_average::<S>(frame, channels, resolved, tiles, &mut out),
    }

    Raster::from_vec(layout, frame.out_width, frame.out_height, out)
        .unwrap_or_else(|_| Raster::empty(layout))
}

/// Clamp a fractional level coordinate into the covered span `[lo, hi)`.
fn clamp_coord(v: f64, lo: f64, hi: f64) -> u32 {
    let max = (hi.ceil() - 1.0).max(lo.floor());
    v.floor().clamp(lo.floor(), max).max(0.0) as u32
}

// -----------------------------------------------------------------------------
// Nearest
// -----------------------------------------------------------------------------

fn nearest<S: Sample>(
    frame: &Frame,
    channels: usize,
    resolved: &ResolvedRegion,
    tiles: &[Raster],
    out: &mut [u8],
) {
    let px_bytes = channels * S::BYTES;
    let out_stride = frame.out_width as usize * px_bytes;
    let hi_x = frame.x1.min(resolved.level_width as f64);
    let hi_y = frame.y1.min(resolved.level_height as f64);

    for oy in 0..frame.out_height {
        let ly = clamp_coord(frame.y0 + (oy as f64 + 0.5) * frame.scale, frame.y0, hi_y);
        let row = ly / resolved.tile_height;
        let out_row = &mut out[oy as usize * out_stride..(oy as usize + 1) * out_stride];

        for ox in 0..frame.out_width {
            let lx = clamp_coord(frame.x0 + (ox as f64 + 0.5) * frame.scale, frame.x0, hi_x);
            let col = lx / resolved.tile_width;
            let Some(index) = resolved.index_of(col, row) else {
                continue;
            };
            let key = &resolved.keys[index];
            let tile = &tiles[index];
            let tx = (lx - key.x) as usize;
            let ty = (ly - key.y) as usize;
            let src = &tile.data()[(ty * tile.width() as usize + tx) * px_bytes..][..px_bytes];
            out_row[ox as usize * px_bytes..][..px_bytes].copy_from_slice(src);
        }
    }
}

// -----------------------------------------------------------------------------
// Bilinear
// -----------------------------------------------------------------------------

fn bilinear<S: Sample>(
    frame: &Frame,
    channels: usize,
    resolved: &ResolvedRegion,
    tiles: &[Raster],
    out: &mut [u8],
) {
    let px_bytes = channels * S::BYTES;

    // Level-space mosaic of the covered tiles. Bilinear is picked for
    // upsampling, so the mosaic never exceeds the output in size.
    let mx0 = resolved.cols.start * resolved.tile_width;
    let my0 = resolved.rows.start * resolved.tile_height;
    let mx1 = (resolved.cols.end * resolved.tile_width).min(resolved.level_width);
    let my1 = (resolved.rows.end * resolved.tile_height).min(resolved.level_height);
    let mw = (mx1 - mx0) as usize;
    let mh = (my1 - my0) as usize;
    if mw == 0 || mh == 0 {
        return;
    }

    let mut mosaic = vec![0u8; mw * mh * px_bytes];
    let mosaic_stride = mw * px_bytes;
    for (key, tile) in resolved.keys.iter().zip(tiles) {
        let dx = (key.x - mx0) as usize * px_bytes;
        for ty in 0..key.height as usize {
            let dst_off = ((key.y - my0) as usize + ty) * mosaic_stride + dx;
            let src = tile.row(ty as u32);
            mosaic[dst_off..dst_off + src.len()].copy_from_slice(src);
        }
    }

    let sample_at = |ix: usize, iy: usize, c: usize| -> f64 {
        S::load(&mosaic[(iy * mw + ix) * px_bytes + c * S::BYTES..]).to_f64()
    };

    let out_stride = frame.out_width as usize * px_bytes;
    for oy in 0..frame.out_height as usize {
        let ly = (frame.y0 + (oy as f64 + 0.5) * frame.scale - 0.5 - my0 as f64)
            .clamp(0.0, (mh - 1) as f64);
        let iy0 = ly.floor() as usize;
        let iy1 = (iy0 + 1).min(mh - 1);
        let fy = ly - iy0 as f64;

        for ox in 0..frame.out_width as usize {
            let lx = (frame.x0 + (ox as f64 + 0.5) * frame.scale - 0.5 - mx0 as f64)
                .clamp(0.0, (mw - 1) as f64);
            let ix0 = lx.floor() as usize;
            let ix1 = (ix0 + 1).min(mw - 1);
            let fx = lx - ix0 as f64;

            for c in 0..channels {
                let top = sample_at(ix0, iy0, c) * (1.0 - fx) + sample_at(ix1, iy0, c) * fx;
                let bottom = sample_at(ix0, iy1, c) * (1.0 - fx) + sample_at(ix1, iy1, c) * fx;
                let value = S::from_f64(top * (1.0 - fy) + bottom * fy);
                value.store(&mut out[oy * out_stride + (ox * channels + c) * S::BYTES..]);
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Area Average
// -----------------------------------------------------------------------------

/// Output pixels a clipped level-pixel footprint `[f0, f1)` (already shifted
/// into output space) overlaps, with overlap lengths.
fn footprint_weights(f0: f64, f1: f64, limit: u32) -> Vec<(u32, f64)> {
    let mut weights = Vec::with_capacity(2);
    let start = f0.floor().max(0.0) as u32;
    let end = (f1.ceil() as u32).min(limit);
    for o in start..end {
        let w = f1.min((o + 1) as f64) - f0.max(o as f64);
        if w > 0.0 {
            weights.push((o, w));
        }
    }
    weights
}

fn area_average<S: Sample>(
    frame: &Frame,
    channels: usize,
    resolved: &ResolvedRegion,
    tiles: &[Raster],
    out: &mut [u8],
) {
    let out_w = frame.out_width as usize;
    let pixels = out_w * frame.out_height as usize;
    let mut acc = vec![0.0f64; pixels * channels];
    let mut weight_sum = vec![0.0f64; pixels];
    let inv = 1.0 / frame.scale;

    for (key, tile) in resolved.keys.iter().zip(tiles) {
        // Tile overlap with the request, in level coordinates
        let ox0 = frame.x0.max(key.x as f64);
        let ox1 = frame.x1.min((key.x + key.width) as f64);
        let oy0 = frame.y0.max(key.y as f64);
        let oy1 = frame.y1.min((key.y + key.height) as f64);
        if ox1 <= ox0 || oy1 <= oy0 {
            continue;
        }
        let px_range = ox0.floor() as u32..(ox1.ceil() as u32).min(key.x + key.width);
        let py_range = oy0.floor() as u32..(oy1.ceil() as u32).min(key.y + key.height);

        // Per-column output spans, computed once per tile
        let x_weights: Vec<Vec<(u32, f64)>> = px_range
            .clone()
            .map(|px| {
                let fx0 = (px as f64).max(ox0);
                let fx1 = ((px + 1) as f64).min(ox1);
                footprint_weights(
                    (fx0 - frame.x0) * inv,
                    (fx1 - frame.x0) * inv,
                    frame.out_width,
                )
            })
            .collect();

        for py in py_range {
            let fy0 = (py as f64).max(oy0);
            let fy1 = ((py + 1) as f64).min(oy1);
            let y_weights = footprint_weights(
                (fy0 - frame.y0) * inv,
                (fy1 - frame.y0) * inv,
                frame.out_height,
            );
            if y_weights.is_empty() {
                continue;
            }

            let src_row = tile.row(py - key.y);
            for (px, x_spans) in x_weights.iter().enumerate() {
                let src_px = &src_row[(px_range.start + px as u32 - key.x) as usize
                    * channels
                    * S::BYTES..];
                for &(oy, wy) in &y_weights {
                    for &(ox, wx) in x_spans {
                        let w = wx * wy;
                        let idx = oy as usize * out_w + ox as usize;
                        weight_sum[idx] += w;
                        for c in 0..channels {
                            acc[idx * channels + c] +=
                                S::load(&src_px[c * S::BYTES..]).to_f64() * w;
                        }
                    }
                }
            }
        }
    }

    for (idx, &wsum) in weight_sum.iter().enumerate() {
        if wsum <= 0.0 {
            continue;
        }
        for c in 0..channels {
            let value = S::from_f64(acc[idx * channels + c] / wsum);
            value.store(&mut out[(idx * channels + c) * S::BYTES..]);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
