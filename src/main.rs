//! wsi-tiler - Mask-driven tiling and detection reprojection for Whole Slide Images.
//!
//! This binary wires the command-line configuration to the library stages.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    config::{Cli, Command, ConvertConfig, PatchConfig, ReprojectConfig, RunConfig},
    detect::{PrecomputedDetector, UnitConverter},
    io::FsPatchSink,
    ledger::CoverageLedger,
    pipeline::{self, PipelineContext, PipelineOptions},
    raster,
    tile::{PatchFormat, PatchNaming},
    PipelineError,
};

/// Directory, below the output directory, receiving patch artifacts.
const PATCH_DIR: &str = "patches";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Patch(config) => run_patch(config).await,
        Command::Reproject(config) => run_reproject(config).await,
        Command::Convert(config) => run_convert(config),
        Command::Run(config) => run_pipeline(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Log a fatal error and map it to a failing exit code.
fn fail(context: &str, e: impl std::fmt::Display) -> ExitCode {
    error!("{}: {}", context, e);
    ExitCode::FAILURE
}

// =============================================================================
// Patch Command
// =============================================================================

async fn run_patch(config: PatchConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        return fail("Configuration error", e);
    }

    match patch(&config).await {
        Ok(failures) if failures > 0 => {
            warn!("{} tile(s) could not be written", failures);
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => fail("Patch extraction failed", e),
    }
}

async fn patch(config: &PatchConfig) -> Result<usize, PipelineError> {
    let image = raster::open(&config.image)?;
    let mask = raster::open(&config.mask)?;
    let sink = Arc::new(FsPatchSink::create(config.output.join(PATCH_DIR))?);
    let slide_id = pipeline::slide_id_from_path(&config.image);

    info!("Configuration:");
    info!("  Slide: {} ({})", slide_id, config.image.display());
    info!("  Mask: {}", config.mask.display());
    info!("  Output: {}", config.output.display());

    let outcome = pipeline::tile_slide(
        &slide_id,
        image,
        mask,
        sink,
        &config.tiling.to_options(),
        &config.output,
    )
    .await?;

    info!(
        "Wrote {} of {} patch(es); ledger {} (sha256 {})",
        outcome.report.written.len(),
        outcome.tiles_planned,
        outcome.export.path.display(),
        outcome.export.sha256
    );
    Ok(outcome.report.failures.len())
}

// =============================================================================
// Reproject Command
// =============================================================================

async fn run_reproject(config: ReprojectConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        return fail("Configuration error", e);
    }

    let result = tokio::task::spawn_blocking(move || reproject(&config)).await;
    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => fail("Reprojection failed", e),
        Err(e) => fail("Reprojection task failed", e),
    }
}

fn reproject(config: &ReprojectConfig) -> Result<(), PipelineError> {
    let slide_id = config.resolve_slide_id();
    let ledger = CoverageLedger::load(&slide_id, &config.ledger)?;
    let roi_mask = raster::open(&config.roi_mask)?;

    let naming = PatchNaming::new(
        &slide_id,
        config.naming.prefix_len,
        &config.naming.label,
        PatchFormat::default(),
    );
    let (by_patch, unmatched) =
        PrecomputedDetector::load(&config.detections)?.into_patch_map(naming.stem());
    for name in &unmatched {
        warn!("Ignoring detections for unrecognised patch name '{}'", name);
    }

    let outcome = pipeline::publish_detections(
        &slide_id,
        &by_patch,
        &ledger,
        roi_mask.as_ref(),
        &config.detection.to_options(),
        &config.output,
    )?;

    info!(
        "Retained {} detection(s) in {} document(s)",
        outcome.reprojection.retained,
        outcome.documents.len()
    );
    Ok(())
}

// =============================================================================
// Convert Command
// =============================================================================

fn run_convert(config: ConvertConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        return fail("Configuration error", e);
    }

    let converter = match UnitConverter::new(config.factor) {
        Ok(c) => c,
        Err(e) => return fail("Configuration error", e),
    };
    let output = config.output.as_deref().unwrap_or(&config.input);

    let result = if config.input.is_dir() {
        converter
            .convert_dir(&config.input, output)
            .map(|written| written.len())
    } else {
        let target = match config.input.file_name() {
            Some(name) if output.is_dir() => output.join(name),
            _ => output.to_path_buf(),
        };
        converter.convert_file(&config.input, &target).map(|_| 1)
    };

    match result {
        Ok(count) => {
            info!("Converted {} document(s) into {}", count, output.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail("Conversion failed", e),
    }
}

// =============================================================================
// Run Command
// =============================================================================

async fn run_pipeline(config: RunConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        return fail("Configuration error", e);
    }

    let context = match open_context(&config) {
        Ok(context) => context,
        Err(e) => return fail("Failed to open inputs", e),
    };
    let options = PipelineOptions {
        tiling: config.tiling.to_options(),
        detection: config.detection.to_options(),
        output_dir: config.output.clone(),
    };

    match pipeline::run(&context, &options).await {
        Ok(summary) => {
            info!("Summary for {}:", summary.slide_id);
            info!(
                "  Tiles: {} planned, {} written, {} failed",
                summary.tiles_planned,
                summary.patches_written,
                summary.tile_failures.len()
            );
            info!("  Ledger: {}", summary.ledger.path.display());
            info!(
                "  Detections: {} retained, {} outside mask, {} unmatched, {} unknown class",
                summary.reprojection.retained,
                summary.reprojection.dropped_outside_mask,
                summary.reprojection.dropped_missing_entry,
                summary.reprojection.dropped_unknown_class
            );
            for path in summary.documents.iter().chain(&summary.converted) {
                info!("  Wrote {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail("Pipeline failed", e),
    }
}

fn open_context(config: &RunConfig) -> Result<PipelineContext, PipelineError> {
    let detector = Arc::new(PrecomputedDetector::load(&config.detections)?);
    let sink = Arc::new(FsPatchSink::create(config.output.join(PATCH_DIR))?);

    PipelineContext::open(
        &config.image,
        &config.mask,
        config.roi_mask(),
        detector,
        sink,
    )
}
