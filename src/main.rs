//! wsi-regions - region-addressed reads from pyramidal images.
//!
//! This binary wires the backend registry and a tile cache to two
//! subcommands: `info` (print metadata and grid summary) and `read`
//! (perform one region read and write it as PNG).

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wsi_regions::{
    config::{parse_byte_size, Cli, Command, InfoConfig, ReadConfig},
    BackendRegistry, OpenOptions, PixelType, Raster, RegionRequest, TileCache, DEFAULT_CACHE_BYTES,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(message) = cli.validate() {
        eprintln!("Configuration error: {message}");
        return ExitCode::from(2);
    }

    init_logging(cli.verbose);

    let budget = parse_byte_size(&cli.cache_budget).unwrap_or(DEFAULT_CACHE_BYTES);
    let cache = Arc::new(TileCache::with_budget(budget));
    let registry = BackendRegistry::new();

    let result = match cli.command {
        Command::Info(config) => run_info(&registry, cache, config).await,
        Command::Read(config) => run_read(&registry, cache, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "wsi_regions=info",
        1 => "wsi_regions=debug",
        _ => "wsi_regions=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_info(
    registry: &BackendRegistry,
    cache: Arc<TileCache>,
    config: InfoConfig,
) -> Result<(), String> {
    let source = registry
        .open(&config.locator, BTreeMap::new(), OpenOptions::new(cache))
        .await
        .map_err(|e| e.to_string())?;

    let md = source.metadata();
    println!("Source:       {}", source.descriptor());
    println!("Extent:       {}x{} px", md.width, md.height);
    println!("Planes:       z={} t={}", md.size_z, md.size_t);
    println!("Pixel layout: {}", md.layout);
    match md.pixel_size_um {
        Some((px, py)) => println!("Pixel size:   {px} x {py} um"),
        None => println!("Pixel size:   unknown"),
    }

    println!("Levels:");
    for level in source.grid().levels() {
        println!(
            "  L{}: downsample {:>8.2}  {}x{} px  tiles {}x{} ({} of {}x{})",
            level.level,
            level.downsample(),
            level.info.width,
            level.info.height,
            level.tiles_x,
            level.tiles_y,
            level.tile_count(),
            level.info.tile_width,
            level.info.tile_height,
        );
    }

    source.close().await;
    Ok(())
}

async fn run_read(
    registry: &BackendRegistry,
    cache: Arc<TileCache>,
    config: ReadConfig,
) -> Result<(), String> {
    let options =
        OpenOptions::new(Arc::clone(&cache)).with_resampling(config.resampling.into());
    let source = registry
        .open(&config.locator, BTreeMap::new(), options)
        .await
        .map_err(|e| e.to_string())?;

    let md = source.metadata();
    let width = config.width.unwrap_or(md.width);
    let height = config.height.unwrap_or(md.height);

    let region = RegionRequest::new(
        source.id(),
        config.downsample,
        config.x,
        config.y,
        width,
        height,
    )
    .map_err(|e| e.to_string())?
    .with_plane(config.plane_z, config.plane_t);

    let raster = source.read(&region).await.map_err(|e| e.to_string())?;
    debug!(stats = ?cache.stats(), "tile cache after read");
    source.close().await;

    if raster.is_empty() {
        return Err("region lies entirely outside the image extent".to_string());
    }

    write_png(&raster, &config.output)?;
    info!(
        output = config.output,
        width = raster.width(),
        height = raster.height(),
        "wrote region"
    );
    Ok(())
}

fn write_png(raster: &Raster, path: &str) -> Result<(), String> {
    let (width, height) = raster.dimensions();
    let layout = raster.layout();
    let save_err = |e: image::ImageError| format!("failed to write '{path}': {e}");

    match (layout.pixel_type, layout.channels) {
        (PixelType::U8, 1) => image::GrayImage::from_raw(width, height, raster.data().to_vec())
            .ok_or_else(|| "raster buffer mismatch".to_string())?
            .save(path)
            .map_err(save_err),
        (PixelType::U8, 3) => image::RgbImage::from_raw(width, height, raster.data().to_vec())
            .ok_or_else(|| "raster buffer mismatch".to_string())?
            .save(path)
            .map_err(save_err),
        (PixelType::U8, 4) => image::RgbaImage::from_raw(width, height, raster.data().to_vec())
            .ok_or_else(|| "raster buffer mismatch".to_string())?
            .save(path)
            .map_err(save_err),
        (PixelType::U16, 1) => {
            let samples: Vec<u16> = raster
                .data()
                .chunks_exact(2)
                .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                .collect();
            image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_raw(width, height, samples)
                .ok_or_else(|| "raster buffer mismatch".to_string())?
                .save(path)
                .map_err(save_err)
        }
        (pixel_type, channels) => Err(format!(
            "cannot encode {channels}-channel {pixel_type:?} raster as PNG"
        )),
    }
}
