//! Command-line configuration for wsi-tiler.
//!
//! Input and output paths are given as flags. Every tuning option can also be
//! set through an environment variable with the `WSI_` prefix.
//!
//! # Example
//!
//! ```ignore
//! use wsi_tiler::config::Cli;
//!
//! let cli = Cli::parse();
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_OUTPUT_DIR` - Directory for patches, ledger and documents
//! - `WSI_PATCH_SIZE` - Patch edge length in pixels (default: 1024)
//! - `WSI_STRIDE` - Tile grid spacing (default: patch size)
//! - `WSI_CHUNK_SIZE` - Mask scan chunk size (default: stride)
//! - `WSI_EDGE_POLICY` - `drop` or `clip` tiles overflowing the bounds (default: drop)
//! - `WSI_PATCH_FORMAT` - `png` or `tiff` (default: png)
//! - `WSI_PATCH_LABEL` - Label inserted into patch names (default: inflammatory-cells)
//! - `WSI_PREFIX_LEN` - Slide id characters kept in patch names (default: 10)
//! - `WSI_WORKERS` - Concurrent extraction workers (default: 8)
//! - `WSI_CLASSES` - Comma-separated detector class names (default: lymphocytes,monocytes)
//! - `WSI_SPACING` - Third point component in documents (default: 0.25)
//! - `WSI_DETECTOR_WORKERS` - Concurrent detector calls (default: 8)
//! - `WSI_CONVERT` - Also write millimetre documents (default: false)
//! - `WSI_PIXEL_TO_MM` - Pixel to millimetre factor (default: 0.00024)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::detect::{DEFAULT_PIXEL_TO_MM, DEFAULT_SPACING};
use crate::pipeline::{DetectionOptions, TilingOptions};
use crate::tile::{
    EdgePolicy, PatchFormat, PlannerConfig, DEFAULT_PATCH_LABEL, DEFAULT_PATCH_SIZE,
    DEFAULT_PREFIX_LEN, DEFAULT_WORKERS,
};

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Default detector classes, as accepted on the command line.
pub const DEFAULT_CLASS_LIST: &str = "lymphocytes,monocytes";

// =============================================================================
// CLI Structure
// =============================================================================

/// wsi-tiler - Mask-driven tiling and detection reprojection for Whole Slide Images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Cut the patches covering a mask and write the coverage ledger.
    Patch(PatchConfig),

    /// Place per-patch detections on the slide and write detection documents.
    Reproject(ReprojectConfig),

    /// Convert detection documents from pixels to millimetres.
    Convert(ConvertConfig),

    /// Run tiling, detection and reprojection for one slide.
    Run(RunConfig),
}

// =============================================================================
// Shared Arguments
// =============================================================================

/// Patch naming.
#[derive(Args, Debug, Clone)]
pub struct NamingArgs {
    /// Label inserted into patch names after the slide prefix.
    #[arg(long, default_value = DEFAULT_PATCH_LABEL, env = "WSI_PATCH_LABEL")]
    pub label: String,

    /// Number of slide id characters kept as the patch name prefix.
    #[arg(long, default_value_t = DEFAULT_PREFIX_LEN, env = "WSI_PREFIX_LEN")]
    pub prefix_len: usize,
}

/// Tiling parameters.
#[derive(Args, Debug, Clone)]
pub struct TilingArgs {
    /// Patch edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_PATCH_SIZE, env = "WSI_PATCH_SIZE")]
    pub patch_size: u32,

    /// Grid spacing between tile origins (defaults to the patch size).
    #[arg(long, env = "WSI_STRIDE")]
    pub stride: Option<u32>,

    /// Edge length of the chunks the mask is scanned in (defaults to the stride).
    #[arg(long, env = "WSI_CHUNK_SIZE")]
    pub chunk_size: Option<u32>,

    /// What to do with tiles overflowing the image bounds.
    #[arg(long, value_enum, default_value_t = EdgePolicy::Drop, env = "WSI_EDGE_POLICY")]
    pub edge_policy: EdgePolicy,

    /// Patch file format.
    #[arg(long, value_enum, default_value_t = PatchFormat::Png, env = "WSI_PATCH_FORMAT")]
    pub format: PatchFormat,

    /// Number of concurrent extraction workers.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "WSI_WORKERS")]
    pub workers: usize,

    #[command(flatten)]
    pub naming: NamingArgs,
}

impl TilingArgs {
    pub fn planner_config(&self) -> PlannerConfig {
        let stride = self.stride.unwrap_or(self.patch_size);
        PlannerConfig::new(self.patch_size)
            .with_stride(stride)
            .with_chunk_size(self.chunk_size.unwrap_or(stride))
            .with_edge_policy(self.edge_policy)
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.planner_config().validate().map_err(|e| e.to_string())?;

        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.naming.label.contains(['/', '\\']) {
            return Err("label must not contain path separators".to_string());
        }
        Ok(())
    }

    pub fn to_options(&self) -> TilingOptions {
        TilingOptions {
            planner: self.planner_config(),
            format: self.format,
            label: self.naming.label.clone(),
            prefix_len: self.naming.prefix_len,
            workers: self.workers,
        }
    }
}

/// Detection publishing parameters.
#[derive(Args, Debug, Clone)]
pub struct DetectionArgs {
    /// Detector class names, in class index order (comma-separated).
    #[arg(
        long,
        default_value = DEFAULT_CLASS_LIST,
        value_delimiter = ',',
        env = "WSI_CLASSES"
    )]
    pub classes: Vec<String>,

    /// Third component written with every point.
    #[arg(long, default_value_t = DEFAULT_SPACING, env = "WSI_SPACING")]
    pub spacing: f64,

    /// Number of concurrent detector calls.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "WSI_DETECTOR_WORKERS")]
    pub detector_workers: usize,

    /// Also write millimetre documents into `<output>/mm`.
    #[arg(long, default_value_t = false, env = "WSI_CONVERT")]
    pub convert: bool,

    /// Pixel to millimetre factor used with `--convert`.
    #[arg(long, default_value_t = DEFAULT_PIXEL_TO_MM, env = "WSI_PIXEL_TO_MM")]
    pub factor: f64,
}

impl DetectionArgs {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() || self.classes.iter().any(|c| c.trim().is_empty()) {
            return Err("classes must be a non-empty list of names".to_string());
        }
        if !self.spacing.is_finite() {
            return Err("spacing must be a finite number".to_string());
        }
        if self.detector_workers == 0 {
            return Err("detector_workers must be greater than 0".to_string());
        }
        validate_factor(self.factor)
    }

    pub fn to_options(&self) -> DetectionOptions {
        DetectionOptions {
            classes: self.classes.iter().map(|c| c.trim().to_string()).collect(),
            spacing: self.spacing,
            concurrency: self.detector_workers,
            unit_factor: self.convert.then_some(self.factor),
        }
    }
}

fn validate_factor(factor: f64) -> Result<(), String> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err("factor must be a finite positive number".to_string());
    }
    Ok(())
}

// =============================================================================
// Subcommand Configurations
// =============================================================================

/// Configuration for the `patch` subcommand.
#[derive(Args, Debug, Clone)]
pub struct PatchConfig {
    /// Slide image to cut patches from.
    #[arg(long)]
    pub image: PathBuf,

    /// Tissue mask selecting the tiles to cut.
    #[arg(long)]
    pub mask: PathBuf,

    /// Output directory (patches go to `<output>/patches`).
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "WSI_OUTPUT_DIR")]
    pub output: PathBuf,

    #[command(flatten)]
    pub tiling: TilingArgs,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.tiling.validate()
    }
}

/// Configuration for the `reproject` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ReprojectConfig {
    /// Ledger document written by `patch` (`<slide>_patches.xml`).
    #[arg(long)]
    pub ledger: PathBuf,

    /// JSON object mapping patch names to detections.
    #[arg(long)]
    pub detections: PathBuf,

    /// Region-of-interest mask detections must fall on.
    #[arg(long)]
    pub roi_mask: PathBuf,

    /// Slide id (defaults to the ledger file name without `_patches.xml`).
    #[arg(long)]
    pub slide_id: Option<String>,

    /// Output directory for detection documents.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "WSI_OUTPUT_DIR")]
    pub output: PathBuf,

    #[command(flatten)]
    pub naming: NamingArgs,

    #[command(flatten)]
    pub detection: DetectionArgs,
}

impl ReprojectConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.detection.validate()?;
        if self.resolve_slide_id().is_empty() {
            return Err("slide id could not be derived; set --slide-id".to_string());
        }
        Ok(())
    }

    /// Explicit slide id, or the one encoded in the ledger file name.
    pub fn resolve_slide_id(&self) -> String {
        if let Some(ref id) = self.slide_id {
            return id.clone();
        }
        let name = self
            .ledger
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.strip_suffix("_patches.xml") {
            Some(id) => id.to_string(),
            None => name.strip_suffix(".xml").unwrap_or(&name).to_string(),
        }
    }
}

/// Configuration for the `convert` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConvertConfig {
    /// Detection document, or directory of `.json` documents.
    #[arg(long)]
    pub input: PathBuf,

    /// Output file or directory (defaults to converting in place).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pixel to millimetre factor.
    #[arg(long, default_value_t = DEFAULT_PIXEL_TO_MM, env = "WSI_PIXEL_TO_MM")]
    pub factor: f64,
}

impl ConvertConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_factor(self.factor)
    }
}

/// Configuration for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunConfig {
    /// Slide image to cut patches from.
    #[arg(long)]
    pub image: PathBuf,

    /// Tissue mask selecting the tiles to cut.
    #[arg(long)]
    pub mask: PathBuf,

    /// Region-of-interest mask (defaults to the tissue mask).
    #[arg(long)]
    pub roi_mask: Option<PathBuf>,

    /// Precomputed detections keyed by patch name.
    #[arg(long)]
    pub detections: PathBuf,

    /// Output directory.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "WSI_OUTPUT_DIR")]
    pub output: PathBuf,

    #[command(flatten)]
    pub tiling: TilingArgs,

    #[command(flatten)]
    pub detection: DetectionArgs,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.tiling.validate()?;
        self.detection.validate()
    }

    pub fn roi_mask(&self) -> &PathBuf {
        self.roi_mask.as_ref().unwrap_or(&self.mask)
    }
}

// =============================================================================
// Tests
// =============================================================================
