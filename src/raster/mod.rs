//! Raster source layer.
//!
//! Every component reads pixels through the [`Raster`] trait, whatever the
//! backing file looks like.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Tile Planner / Patch Extractor / Reprojector │
//! └───────────────────────┬───────────────────────┘
//!                         │ read_region(y0, y1, x0, x1)
//!                         ▼
//! ┌───────────────────────────────────────────────┐
//! │                 Raster Trait                  │
//! └───────────────────────┬───────────────────────┘
//!                         │
//!           ┌─────────────┴─────────────┐
//!           ▼                           ▼
//! ┌───────────────────┐      ┌───────────────────────┐
//! │    TiffRaster     │      │     MemoryRaster      │
//! │ (chunk decoding,  │      │ (PNG/JPEG fallback,   │
//! │  LRU chunk cache) │      │  in-process buffers)  │
//! └───────────────────┘      └───────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use wsi_tiler::raster::{open, Raster};
//!
//! let mask = open(Path::new("tissue-mask.tif"))?;
//! let shape = mask.shape();
//! let corner = mask.read_region(0, 16, 0, 16)?;
//! println!("{}x{} mask, corner set: {}", shape.height, shape.width, corner.any_set());
//! # Ok::<(), wsi_tiler::RasterError>(())
//! ```

mod chunked;
mod detect;
mod memory;
mod source;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::RasterError;

pub use chunked::{TiffRaster, DEFAULT_CHUNK_CACHE_CAPACITY};
pub use detect::{detect_format, detect_path, is_tiff_header, RasterFormat};
pub use memory::MemoryRaster;
pub use source::{Raster, RasterShape, Region, SampleType, Samples};

/// Open a raster file, picking the backend from its signature.
///
/// TIFF and BigTIFF files are read lazily; PNG and JPEG are decoded in full.
///
/// # Errors
///
/// - [`RasterError::NotFound`] if the file does not exist
/// - [`RasterError::UnsupportedFormat`] for unknown signatures or pixel layouts
pub fn open(path: &Path) -> Result<Arc<dyn Raster>, RasterError> {
    let format = detect_path(path)?;
    let raster: Arc<dyn Raster> = if format.is_chunked() {
        Arc::new(TiffRaster::open(path)?)
    } else {
        Arc::new(MemoryRaster::open(path)?)
    };

    let shape = raster.shape();
    info!(
        "Opened {} ({}): {}x{}x{} {}",
        path.display(),
        format.name(),
        shape.height,
        shape.width,
        shape.channels,
        raster.sample_type().name()
    );

    Ok(raster)
}
