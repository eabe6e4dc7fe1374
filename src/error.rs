use thiserror::Error;

use crate::pyramid::TileKey;

/// Errors raised while constructing or validating a region request.
///
/// All variants are detected before any I/O and are never retried.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Width or height is zero
    #[error("Region must have positive dimensions: got {width}x{height}")]
    EmptyRegion { width: u32, height: u32 },

    /// Downsample factor is not a positive finite number
    #[error("Downsample must be positive and finite: got {downsample}")]
    InvalidDownsample { downsample: f64 },

    /// Bounding-box construction received no points
    #[error("Cannot derive a bounding box from an empty point set")]
    NoPoints,

    /// Plane index outside the source's declared plane counts
    #[error("Plane out of range: z={z} (size_z={size_z}), t={t} (size_t={size_t})")]
    PlaneOutOfRange {
        z: u32,
        t: u32,
        size_z: u32,
        size_t: u32,
    },

    /// Request addressed to a different source
    #[error("Request targets source '{requested}' but was sent to source '{actual}'")]
    SourceMismatch { requested: String, actual: String },
}

/// Errors from a reader backend while producing pixels for one tile.
///
/// Cloneable so a single failure can be delivered to every caller waiting
/// on the same in-flight fetch.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// I/O error while reading tile data
    #[error("I/O error: {0}")]
    Io(String),

    /// Tile data was read but could not be decoded
    #[error("Corrupt tile data: {0}")]
    Corrupt(String),

    /// The task running the fetch stopped before producing a result
    #[error("Tile fetch task failed: {0}")]
    TaskFailed(String),
}

/// Errors raised by a whole region read.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The request itself is invalid for this source
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// The source has been closed; no reads are possible
    #[error("Source is closed: {source_id}")]
    SourceClosed { source_id: String },

    /// A tile fetch failed; identifies the exact tile so the failure is diagnosable
    #[error("Failed to decode tile {tile}: {source}")]
    Decode {
        tile: TileKey,
        #[source]
        source: DecodeError,
    },
}

/// Errors raised while opening a source.
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// No registered backend claims the locator
    #[error("Unsupported source: no backend claims '{locator}'")]
    UnsupportedSource { locator: String },

    /// A descriptor names a backend tag that is not registered
    #[error("Unknown backend tag: '{tag}'")]
    UnknownBackend { tag: String },

    /// The backend declared an inconsistent pyramid
    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    /// Backend-specific failure while opening the source
    #[error("Backend '{backend}' failed to open '{locator}': {source}")]
    Backend {
        backend: String,
        locator: String,
        #[source]
        source: DecodeError,
    },
}
