use std::path::Path;

use thiserror::Error;

/// Errors raised when opening or reading a raster.
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// The raster file does not exist
    #[error("Raster not found: {0}")]
    NotFound(String),

    /// File format or pixel layout is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Requested region lies (partly) outside the raster, or is empty
    #[error(
        "Region out of bounds: rows {y0}..{y1}, cols {x0}..{x1} for raster of {height}x{width}"
    )]
    OutOfBounds {
        y0: u32,
        y1: u32,
        x0: u32,
        x1: u32,
        height: u32,
        width: u32,
    },

    /// Underlying file I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Pixel data could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl RasterError {
    pub(crate) fn from_io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            RasterError::NotFound(path.display().to_string())
        } else {
            RasterError::Io(format!("{}: {}", path.display(), err))
        }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        RasterError::UnsupportedFormat {
            reason: reason.into(),
        }
    }
}

/// Errors raised when an artifact or document cannot be written.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// Pixel data could not be encoded into the artifact format
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// Writing to the destination failed
    #[error("Write failed for {path}: {message}")]
    Io { path: String, message: String },
}

impl WriteError {
    pub(crate) fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        WriteError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Malformed ledger, detection, or converted document.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// XML could not be tokenized
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON could not be parsed or produced
    #[error("JSON error: {0}")]
    Json(String),

    /// A required element or attribute is absent
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A field is present but its value is unusable
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// A point carries fewer than two coordinates
    #[error("Point {point} has {found} coordinate(s), expected at least 2")]
    MissingCoordinates { point: String, found: usize },
}

impl SchemaError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors from the coverage ledger.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// No rectangle is recorded for this patch
    #[error("No ledger entry for patch {patch_id} of slide {slide_id}")]
    MissingEntry { slide_id: String, patch_id: u64 },

    /// The patch id was already recorded for this slide
    #[error("Patch {patch_id} of slide {slide_id} is already recorded")]
    DuplicatePatch { slide_id: String, patch_id: u64 },

    /// The rectangle was already recorded under another patch id
    #[error("Rectangle {rect} of slide {slide_id} is already recorded as patch {existing}")]
    DuplicateRect {
        slide_id: String,
        rect: String,
        existing: u64,
    },

    /// Annotation document is malformed
    #[error("Annotation document error: {0}")]
    Schema(#[from] SchemaError),

    /// Annotation document could not be read
    #[error("Failed to read annotation document {path}: {message}")]
    Read { path: String, message: String },

    /// Annotation document could not be written
    #[error("Failed to export annotation document: {0}")]
    Write(#[from] WriteError),
}

/// Errors for tile planning and patch extraction.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Planner or extractor parameters are unusable
    #[error("Invalid tiling configuration: {message}")]
    InvalidConfig { message: String },

    /// Reading the tile region failed
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// Writing the patch artifact failed
    #[error("Patch write failed: {0}")]
    Write(#[from] WriteError),

    /// A worker task panicked or was cancelled
    #[error("Worker failure: {0}")]
    Worker(String),
}

impl TileError {
    /// Whether this failure only affects the tile it occurred on.
    ///
    /// Out-of-bounds reads and write failures are isolated; any other failure
    /// means the image source itself is unusable.
    pub fn is_isolated(&self) -> bool {
        matches!(
            self,
            TileError::Write(_) | TileError::Raster(RasterError::OutOfBounds { .. })
        )
    }
}

/// Errors from an external detector.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    /// The detector failed to produce results for a patch
    #[error("Inference failed for {patch}: {message}")]
    Inference { patch: String, message: String },

    /// Detector output is malformed
    #[error("Detector output error: {0}")]
    Schema(#[from] SchemaError),

    /// Detector output could not be read
    #[error("Failed to read detections {path}: {message}")]
    Read { path: String, message: String },
}

/// Errors reading, converting, or writing detection documents.
#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    /// Document content is malformed
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Document could not be read
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// Document could not be written
    #[error("{0}")]
    Write(#[from] WriteError),
}

/// Fatal errors that stop a pipeline run.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// An input raster could not be opened or read
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// Tiling could not proceed
    #[error("Tiling error: {0}")]
    Tile(#[from] TileError),

    /// Ledger could not be exported or loaded
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Detections could not be loaded
    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    /// Output documents could not be produced
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// An output location could not be prepared
    #[error("{0}")]
    Write(#[from] WriteError),

    /// A blocking task panicked or was cancelled
    #[error("Task failure: {0}")]
    Task(String),
}
