//! Tiling and patch extraction.
//!
//! This module decides which grid-aligned tiles to cut from a slide and
//! writes them as patch artifacts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Mask (dyn Raster)            │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TilePlanner                │
//! │  chunked scan → deduplicated TileRects  │
//! └────────────────────┬────────────────────┘
//!                      │  patch_id = emission index
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        extract_tiles (bounded)          │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ PatchEncoder │  │  PatchNaming    │  │
//! │  │ (PNG / TIFF) │  │ {prefix}{label} │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     PatchSink + CoverageLedger          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileRect`]: half-open pixel rectangle of one tile
//! - [`TilePlanner`]: scans a mask and emits the tiles covering it
//! - [`PatchEncoder`]: encodes a region as PNG or TIFF
//! - [`PatchNaming`]: deterministic artifact names
//! - [`PatchExtractor`] / [`extract_tiles`]: reads, encodes and stores patches
//!
//! # Example
//!
//! ```
//! use wsi_tiler::raster::MemoryRaster;
//! use wsi_tiler::tile::{PlannerConfig, TilePlanner, TileRect};
//!
//! let mut data = vec![0u8; 16 * 16];
//! data[5 * 16 + 5] = 1;
//! let mask = MemoryRaster::from_gray("mask", 16, 16, data).unwrap();
//!
//! let planner = TilePlanner::new(PlannerConfig::new(8)).unwrap();
//! assert_eq!(planner.plan(&mask).unwrap(), vec![TileRect::new(0, 0, 8, 8)]);
//! ```

mod encoder;
mod extractor;
mod naming;
mod planner;
mod rect;

pub use encoder::{PatchEncoder, PatchFormat};
pub use extractor::{
    extract_tiles, ExtractionReport, PatchArtifact, PatchExtractor, TileFailure, DEFAULT_WORKERS,
};
pub use naming::{parse_patch_name, PatchNaming, DEFAULT_PATCH_LABEL, DEFAULT_PREFIX_LEN};
pub use planner::{EdgePolicy, PlannerConfig, TilePlanner, DEFAULT_PATCH_SIZE};
pub use rect::TileRect;
