//! Pixel raster value type.
//!
//! A [`Raster`] is a rectangle of decoded pixels: contiguous, interleaved
//! samples backed by [`Bytes`]. Cloning is cheap (the buffer is shared), so
//! rasters can be handed between the cache, the stitcher and callers without
//! copying pixel data.
//!
//! Sample depth is 8 or 16 bits per channel; 16-bit samples are stored in
//! native byte order since rasters never leave process memory.

use bytes::Bytes;

use crate::error::DecodeError;

// =============================================================================
// Pixel Layout
// =============================================================================

/// Sample depth of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    /// 8 bits per sample
    U8,
    /// 16 bits per sample, native byte order
    U16,
}

impl PixelType {
    /// Size of one sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
        }
    }
}

/// Channel count and sample depth of a raster.
///
/// Samples are interleaved: a pixel's channels are adjacent in memory.
/// The layout is fixed per source and declared via its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelLayout {
    pub pixel_type: PixelType,
    pub channels: u8,
}

impl PixelLayout {
    pub fn new(pixel_type: PixelType, channels: u8) -> Self {
        Self {
            pixel_type,
            channels,
        }
    }

    /// 8-bit grayscale.
    pub fn gray8() -> Self {
        Self::new(PixelType::U8, 1)
    }

    /// 8-bit RGB.
    pub fn rgb8() -> Self {
        Self::new(PixelType::U8, 3)
    }

    /// 8-bit RGBA.
    pub fn rgba8() -> Self {
        Self::new(PixelType::U8, 4)
    }

    /// 16-bit grayscale.
    pub fn gray16() -> Self {
        Self::new(PixelType::U16, 1)
    }

    /// Size of one full pixel (all channels) in bytes.
    pub fn bytes_per_pixel(&self) -> usize {
        self.pixel_type.bytes_per_sample() * self.channels as usize
    }
}

impl std::fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = self.pixel_type.bytes_per_sample() * 8;
        write!(f, "{}ch/{}bit", self.channels, bits)
    }
}

// =============================================================================
// Raster
// =============================================================================

/// A rectangle of decoded pixels.
///
/// Rows are stored top-to-bottom with no padding: the byte length is always
/// `width * height * bytes_per_pixel`. A 0x0 raster is a valid value and is
/// what a fully-clipped region read returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    layout: PixelLayout,
    width: u32,
    height: u32,
    data: Bytes,
}

impl Raster {
    /// Create a raster from an existing buffer.
    ///
    /// Fails with [`DecodeError::Corrupt`] if the buffer length does not
    /// match the declared dimensions.
    pub fn from_bytes(
        layout: PixelLayout,
        width: u32,
        height: u32,
        data: Bytes,
    ) -> Result<Self, DecodeError> {
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if data.len() != expected {
            return Err(DecodeError::Corrupt(format!(
                "raster buffer is {} bytes, expected {} for {}x{} {}",
                data.len(),
                expected,
                width,
                height,
                layout
            )));
        }
        Ok(Self {
            layout,
            width,
            height,
            data,
        })
    }

    /// Create a raster from a freshly built sample buffer.
    pub fn from_vec(
        layout: PixelLayout,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        Self::from_bytes(layout, width, height, Bytes::from(data))
    }

    /// Create a zero-filled raster.
    pub fn zeroed(layout: PixelLayout, width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * layout.bytes_per_pixel();
        Self {
            layout,
            width,
            height,
            data: Bytes::from(vec![0u8; len]),
        }
    }

    /// The 0x0 raster produced by fully-clipped reads.
    pub fn empty(layout: PixelLayout) -> Self {
        Self {
            layout,
            width: 0,
            height: 0,
            data: Bytes::new(),
        }
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True for 0x0 rasters.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Raw interleaved sample bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consume the raster, returning its buffer.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Total buffer size in bytes. Used for cache accounting.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Bytes per row.
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.layout.bytes_per_pixel()
    }

    /// One row of samples.
    pub(crate) fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Extract a sub-rectangle.
    ///
    /// Returns `None` if the rectangle does not fit inside the raster.
    /// The full rectangle and any whole-rows band are zero-copy slices of
    /// the shared buffer; other crops copy row by row.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Option<Raster> {
        if x.checked_add(width)? > self.width || y.checked_add(height)? > self.height {
            return None;
        }
        if x == 0 && width == self.width {
            // Whole rows: slice the shared buffer
            let stride = self.row_stride();
            let start = y as usize * stride;
            let end = (y + height) as usize * stride;
            return Some(Raster {
                layout: self.layout,
                width,
                height,
                data: self.data.slice(start..end),
            });
        }
        let bpp = self.layout.bytes_per_pixel();
        let out_stride = width as usize * bpp;
        let mut out = Vec::with_capacity(out_stride * height as usize);
        for row in y..y + height {
            let src = self.row(row);
            let start = x as usize * bpp;
            out.extend_from_slice(&src[start..start + out_stride]);
        }
        Some(Raster {
            layout: self.layout,
            width,
            height,
            data: Bytes::from(out),
        })
    }
}

// =============================================================================
// Sample Access
// =============================================================================

/// Raw sample decode/encode for the resampling kernels.
///
/// Arithmetic runs in f64: 16-bit samples summed over large box filters
/// exceed the f32 mantissa.
pub(crate) trait Sample: Copy + Send + Sync + 'static {
    const BYTES: usize;

    fn load(buf: &[u8]) -> Self;
    fn store(self, buf: &mut [u8]);
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Sample for u8 {
    const BYTES: usize = 1;

    fn load(buf: &[u8]) -> Self {
        buf[0]
    }

    fn store(self, buf: &mut [u8]) {
        buf[0] = self;
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, u8::MAX as f64) as u8
    }
}

impl Sample for u16 {
    const BYTES: usize = 2;

    fn load(buf: &[u8]) -> Self {
        u16::from_ne_bytes([buf[0], buf[1]])
    }

    fn store(self, buf: &mut [u8]) {
        buf[..2].copy_from_slice(&self.to_ne_bytes());
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, u16::MAX as f64) as u16
    }
}

// =============================================================================
// Tests
// =============================================================================
