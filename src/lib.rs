//! # wsi-tiler
//!
//! Mask-driven tiling of gigapixel Whole Slide Images and reprojection of
//! per-patch detections back onto the slide.
//!
//! Given a slide and a binary tissue mask, the library decides which
//! grid-aligned patches cover the mask, writes each of them exactly once,
//! and records where every patch came from. Detections made on the patches by
//! an external detector are then translated back to slide coordinates,
//! filtered against a region-of-interest mask, and written as point
//! documents, optionally converted from pixels to millimetres.
//!
//! ## Features
//!
//! - **Chunked reads**: TIFF slides and masks are decoded strip by strip or
//!   tile by tile, never as a whole
//! - **Exactly-once coverage**: every grid cell touched by the mask yields one
//!   patch, with a stable id and a stable file name
//! - **Invertible tiling**: the coverage ledger is persisted as an ASAP
//!   annotation document and can be loaded back
//! - **Isolated failures**: a tile that cannot be written is reported without
//!   aborting the batch
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`raster`] - Raster sources (TIFF, image files, in-memory buffers)
//! - [`tile`] - Tile planning, patch encoding, naming and extraction
//! - [`ledger`] - Coverage ledger and its annotation document
//! - [`detect`] - Detector boundary, reprojection, documents, unit conversion
//! - [`pipeline`] - End-to-end processing of one slide
//! - [`io`] - Filesystem output
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use wsi_tiler::detect::PrecomputedDetector;
//! use wsi_tiler::io::FsPatchSink;
//! use wsi_tiler::pipeline::{self, PipelineContext, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let detector = Arc::new(PrecomputedDetector::load(Path::new("detections.json"))?);
//!     let sink = Arc::new(FsPatchSink::create("output/patches")?);
//!     let context = PipelineContext::open(
//!         Path::new("slide.tif"),
//!         Path::new("tissue_mask.tif"),
//!         Path::new("roi_mask.tif"),
//!         detector,
//!         sink,
//!     )?;
//!
//!     let options = PipelineOptions {
//!         output_dir: "output".into(),
//!         ..Default::default()
//!     };
//!     let summary = pipeline::run(&context, &options).await?;
//!     println!("{} detections retained", summary.reprojection.retained);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod io;
pub mod ledger;
pub mod pipeline;
pub mod raster;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command};
pub use detect::{
    Detection, DetectionDocument, DetectionSet, Detector, GlobalDetection, PrecomputedDetector,
    Reprojector, UnitConverter,
};
pub use error::{
    DetectorError, DocumentError, LedgerError, PipelineError, RasterError, SchemaError, TileError,
    WriteError,
};
pub use io::{FsPatchSink, PatchSink};
pub use ledger::{CoverageLedger, LedgerExport, PatchId};
pub use pipeline::{PipelineContext, PipelineOptions, RunSummary};
pub use raster::{MemoryRaster, Raster, RasterShape, Region, TiffRaster};
pub use tile::{
    EdgePolicy, PatchArtifact, PatchEncoder, PatchExtractor, PatchFormat, PlannerConfig,
    TilePlanner, TileRect,
};
