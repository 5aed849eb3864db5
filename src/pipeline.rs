//! End-to-end processing of one slide.
//!
//! ```text
//! plan tiles ──► extract patches ──► ledger export ──► detector ──► reproject ──► documents ──► mm documents
//!  (blocking)     (bounded pool)      (fatal)          (bounded)    (blocking)     (fatal)      (optional)
//! ```
//!
//! Detection starts only after every patch has been extracted and recorded,
//! so the detector never sees a patch the ledger does not know about.
//!
//! Per-tile and per-patch failures are counted in the [`RunSummary`]. Only
//! failing to open an input, a non-isolated read failure, or failing to write
//! a final document aborts the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::detect::{
    collect_detections, write_documents, Detection, Detector, ReprojectionReport, Reprojector,
    UnitConverter, COMBINED_CLASS, DEFAULT_CLASSES, DEFAULT_SPACING,
};
use crate::error::{DocumentError, PipelineError};
use crate::io::PatchSink;
use crate::ledger::{document_name, CoverageLedger, LedgerExport, PatchId};
use crate::raster::{self, Raster};
use crate::tile::{
    extract_tiles, ExtractionReport, PatchEncoder, PatchExtractor, PatchFormat, PatchNaming,
    PlannerConfig, TilePlanner, DEFAULT_PATCH_LABEL, DEFAULT_PREFIX_LEN, DEFAULT_WORKERS,
};

/// Directory, below the output directory, receiving converted documents.
pub const CONVERTED_DIR: &str = "mm";

// =============================================================================
// Options
// =============================================================================

/// How tiles are planned, named and written.
#[derive(Debug, Clone)]
pub struct TilingOptions {
    pub planner: PlannerConfig,
    pub format: PatchFormat,
    pub label: String,
    pub prefix_len: usize,
    pub workers: usize,
}

impl Default for TilingOptions {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            format: PatchFormat::default(),
            label: DEFAULT_PATCH_LABEL.to_string(),
            prefix_len: DEFAULT_PREFIX_LEN,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl TilingOptions {
    /// Naming scheme for a slide's patches.
    pub fn naming(&self, slide_id: &str) -> PatchNaming {
        PatchNaming::new(slide_id, self.prefix_len, &self.label, self.format)
    }
}

/// How detections are reprojected and published.
#[derive(Debug, Clone)]
pub struct DetectionOptions {
    /// Class names indexed by detector class index
    pub classes: Vec<String>,

    /// Third point component of output documents
    pub spacing: f64,

    /// Maximum concurrent detector calls
    pub concurrency: usize,

    /// Also write documents scaled by this factor
    pub unit_factor: Option<f64>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            classes: DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect(),
            spacing: DEFAULT_SPACING,
            concurrency: DEFAULT_WORKERS,
            unit_factor: None,
        }
    }
}

/// Everything a full run needs besides its inputs.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub tiling: TilingOptions,
    pub detection: DetectionOptions,
    /// Receives the ledger and detection documents
    pub output_dir: PathBuf,
}

// =============================================================================
// Context
// =============================================================================

/// Opened inputs of one run.
///
/// Rasters are shared with worker threads; they are dropped, and their files
/// closed, when the context goes out of scope.
pub struct PipelineContext {
    pub slide_id: String,
    pub image: Arc<dyn Raster>,
    pub tissue_mask: Arc<dyn Raster>,
    pub roi_mask: Arc<dyn Raster>,
    pub detector: Arc<dyn Detector>,
    pub sink: Arc<dyn PatchSink>,
}

impl PipelineContext {
    /// Open the three rasters of a slide.
    ///
    /// The slide id is the file stem of `image_path`. `roi_mask_path` may
    /// name the same file as `tissue_mask_path`.
    pub fn open(
        image_path: &Path,
        tissue_mask_path: &Path,
        roi_mask_path: &Path,
        detector: Arc<dyn Detector>,
        sink: Arc<dyn PatchSink>,
    ) -> Result<Self, PipelineError> {
        let image = raster::open(image_path)?;
        let tissue_mask = raster::open(tissue_mask_path)?;
        let roi_mask = if roi_mask_path == tissue_mask_path {
            Arc::clone(&tissue_mask)
        } else {
            raster::open(roi_mask_path)?
        };

        Ok(Self {
            slide_id: slide_id_from_path(image_path),
            image,
            tissue_mask,
            roi_mask,
            detector,
            sink,
        })
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("slide_id", &self.slide_id)
            .field("image", &self.image.identifier())
            .field("tissue_mask", &self.tissue_mask.identifier())
            .field("roi_mask", &self.roi_mask.identifier())
            .field("sink", &self.sink.location())
            .finish()
    }
}

/// Slide identifier derived from an image path (its file stem).
pub fn slide_id_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// =============================================================================
// Stages
// =============================================================================

/// Outcome of planning and extraction.
#[derive(Debug)]
pub struct TilingOutcome {
    pub tiles_planned: usize,
    pub report: ExtractionReport,
    pub ledger: Arc<CoverageLedger>,
    pub export: LedgerExport,
}

/// Plan, extract and ledger the patches of one slide.
///
/// The ledger document is written to `{ledger_dir}/{slide_id}_patches.xml`.
pub async fn tile_slide(
    slide_id: &str,
    image: Arc<dyn Raster>,
    mask: Arc<dyn Raster>,
    sink: Arc<dyn PatchSink>,
    options: &TilingOptions,
    ledger_dir: &Path,
) -> Result<TilingOutcome, PipelineError> {
    let planner = TilePlanner::new(options.planner)?;
    let bounds = image.shape();

    let tiles = tokio::task::spawn_blocking(move || {
        planner.plan_within(mask.as_ref(), bounds.width, bounds.height)
    })
    .await
    .map_err(|e| PipelineError::Task(e.to_string()))??;

    let extractor = Arc::new(PatchExtractor::new(
        PatchEncoder::new(options.format),
        options.naming(slide_id),
        sink,
    ));
    let report = extract_tiles(extractor, image, slide_id, &tiles, options.workers).await?;

    // A fresh ledger per run
    let ledger = Arc::new(CoverageLedger::new());
    report.record_into(&ledger)?;
    let export = ledger.export_to_path(slide_id, &ledger_dir.join(document_name(slide_id)))?;

    Ok(TilingOutcome {
        tiles_planned: tiles.len(),
        report,
        ledger,
        export,
    })
}

/// Outcome of reprojection and publication.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub reprojection: ReprojectionReport,
    pub documents: Vec<PathBuf>,
    pub converted: Vec<PathBuf>,
}

/// Reproject detections, write the per-class documents into `output_dir` and,
/// if configured, their converted copies into `output_dir/mm`.
///
/// Blocks on mask reads and file writes.
pub fn publish_detections(
    slide_id: &str,
    detections: &BTreeMap<PatchId, Vec<Detection>>,
    ledger: &CoverageLedger,
    roi_mask: &dyn Raster,
    options: &DetectionOptions,
    output_dir: &Path,
) -> Result<PublishOutcome, PipelineError> {
    let converter = options
        .unit_factor
        .map(UnitConverter::new)
        .transpose()
        .map_err(DocumentError::from)?;

    let reprojection = Reprojector::new(options.classes.clone())
        .with_combined_name(COMBINED_CLASS)
        .reproject(detections, ledger, slide_id, roi_mask)?;

    let documents = write_documents(&reprojection.set, output_dir, options.spacing)?;

    let mut converted = Vec::new();
    if let Some(converter) = converter {
        let converted_dir = output_dir.join(CONVERTED_DIR);
        for document in &documents {
            let Some(name) = document.file_name() else {
                continue;
            };
            let target = converted_dir.join(name);
            converter.convert_file(document, &target)?;
            converted.push(target);
        }
    }

    Ok(PublishOutcome {
        reprojection: reprojection.report,
        documents,
        converted,
    })
}

// =============================================================================
// Full Run
// =============================================================================

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub slide_id: String,
    pub tiles_planned: usize,
    pub patches_written: usize,

    /// Tiles that could not be written, with the reason
    pub tile_failures: Vec<(PatchId, String)>,

    pub ledger: LedgerExport,

    /// Patches the detector failed on
    pub detector_failures: usize,

    pub reprojection: ReprojectionReport,
    pub documents: Vec<PathBuf>,
    pub converted: Vec<PathBuf>,
}

/// Run every stage for one slide.
pub async fn run(ctx: &PipelineContext, options: &PipelineOptions) -> Result<RunSummary, PipelineError> {
    info!("Processing slide {}", ctx.slide_id);

    let tiling = tile_slide(
        &ctx.slide_id,
        Arc::clone(&ctx.image),
        Arc::clone(&ctx.tissue_mask),
        Arc::clone(&ctx.sink),
        &options.tiling,
        &options.output_dir,
    )
    .await?;

    let collected = collect_detections(
        Arc::clone(&ctx.detector),
        &tiling.report.written,
        options.detection.concurrency,
    )
    .await;
    for (patch_id, e) in &collected.failures {
        warn!("No detections for patch {}: {}", patch_id, e);
    }

    let published = {
        let slide_id = ctx.slide_id.clone();
        let ledger = Arc::clone(&tiling.ledger);
        let roi_mask = Arc::clone(&ctx.roi_mask);
        let detection = options.detection.clone();
        let output_dir = options.output_dir.clone();
        let by_patch = collected.by_patch;

        tokio::task::spawn_blocking(move || {
            publish_detections(
                &slide_id,
                &by_patch,
                &ledger,
                roi_mask.as_ref(),
                &detection,
                &output_dir,
            )
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??
    };

    let summary = RunSummary {
        slide_id: ctx.slide_id.clone(),
        tiles_planned: tiling.tiles_planned,
        patches_written: tiling.report.written.len(),
        tile_failures: tiling
            .report
            .failures
            .iter()
            .map(|f| (f.patch_id, f.error.to_string()))
            .collect(),
        ledger: tiling.export,
        detector_failures: collected.failures.len(),
        reprojection: published.reprojection,
        documents: published.documents,
        converted: published.converted,
    };

    info!(
        "Slide {}: {} tile(s) planned, {} written, {} failed, {} detection(s) retained",
        summary.slide_id,
        summary.tiles_planned,
        summary.patches_written,
        summary.tile_failures.len(),
        summary.reprojection.retained
    );

    Ok(summary)
}
