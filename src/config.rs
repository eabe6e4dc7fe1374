//! Configuration and CLI argument types.
//!
//! The binary exposes two subcommands:
//! - `info <LOCATOR>` - print source metadata and the tile grid summary
//! - `read <LOCATOR>` - perform one region read and write the result as PNG
//!
//! All options can also be set via environment variables with the `WSI_`
//! prefix:
//!
//! - `WSI_CACHE_BUDGET` - tile cache byte budget, human-readable ("256MB")
//! - `WSI_RESAMPLING` - resampling policy (auto, nearest, bilinear,
//!   area-average)

use clap::{Parser, Subcommand, ValueEnum};

use crate::tile::Resampling;

/// Default tile cache budget, human readable.
pub const DEFAULT_CACHE_BUDGET: &str = "256MB";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Region-addressed reader for pyramidal images.
///
/// Translates arbitrary rectangle/downsample/plane requests into canonical
/// tile fetches, cached and deduplicated, and stitches the tiles into the
/// requested raster.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-regions")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Tile cache byte budget (e.g. "256MB", "1GB", or a raw byte count).
    #[arg(long, global = true, default_value = DEFAULT_CACHE_BUDGET, env = "WSI_CACHE_BUDGET")]
    pub cache_budget: String,

    /// Enable verbose logging (debug level; -vv for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print metadata and tile grid summary for a source.
    Info(InfoConfig),

    /// Read one region and write it as PNG.
    Read(ReadConfig),
}

/// Arguments for the `info` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InfoConfig {
    /// Path or URL of the image to inspect.
    pub locator: String,
}

/// Arguments for the `read` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ReadConfig {
    /// Path or URL of the image to read from.
    pub locator: String,

    /// Left edge of the region, full-resolution pixels.
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    pub x: i64,

    /// Top edge of the region, full-resolution pixels.
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    pub y: i64,

    /// Region width in full-resolution pixels. Defaults to the full extent.
    #[arg(short = 'W', long)]
    pub width: Option<u32>,

    /// Region height in full-resolution pixels. Defaults to the full extent.
    #[arg(short = 'H', long)]
    pub height: Option<u32>,

    /// Downsample factor (1 = native resolution).
    #[arg(short, long, default_value_t = 1.0)]
    pub downsample: f64,

    /// Focal plane index.
    #[arg(long, default_value_t = 0)]
    pub plane_z: u32,

    /// Time plane index.
    #[arg(long, default_value_t = 0)]
    pub plane_t: u32,

    /// Resampling policy for non-native downsamples.
    #[arg(long, value_enum, default_value_t = ResamplingArg::Auto, env = "WSI_RESAMPLING")]
    pub resampling: ResamplingArg,

    /// Output PNG path.
    #[arg(short, long, default_value = "region.png")]
    pub output: String,
}

/// CLI surface of [`Resampling`].
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplingArg {
    Auto,
    Nearest,
    Bilinear,
    AreaAverage,
}

impl From<ResamplingArg> for Resampling {
    fn from(arg: ResamplingArg) -> Self {
        match arg {
            ResamplingArg::Auto => Resampling::Auto,
            ResamplingArg::Nearest => Resampling::Nearest,
            ResamplingArg::Bilinear => Resampling::Bilinear,
            ResamplingArg::AreaAverage => Resampling::AreaAverage,
        }
    }
}

// =============================================================================
// Byte Sizes
// =============================================================================

/// Parse a human-readable byte size: a raw count or a number with a
/// KB/MB/GB suffix (case-insensitive, powers of 1024).
pub fn parse_byte_size(input: &str) -> Result<usize, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty byte size".to_string());
    }

    let upper = trimmed.to_ascii_uppercase();
    let (digits, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };

    let value: usize = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid byte size '{input}'"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("byte size '{input}' overflows"))
}

impl Cli {
    /// Validate cross-field constraints before running a command.
    pub fn validate(&self) -> Result<(), String> {
        let budget = parse_byte_size(&self.cache_budget)?;
        if budget == 0 {
            return Err("cache budget must be greater than 0".to_string());
        }
        if let Command::Read(read) = &self.command {
            if !(read.downsample.is_finite() && read.downsample > 0.0) {
                return Err(format!(
                    "downsample must be positive and finite, got {}",
                    read.downsample
                ));
            }
            if read.width == Some(0) || read.height == Some(0) {
                return Err("width and height must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
