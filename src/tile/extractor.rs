//! Patch extraction.
//!
//! Reads each planned tile from the slide, encodes it and hands it to a
//! [`PatchSink`]. Extraction of a batch runs on tokio's blocking pool with a
//! bounded number of workers.
//!
//! # Failure Handling
//!
//! ```text
//! tile fails with OutOfBounds / WriteError  -> recorded in the report, batch continues
//! tile fails with any other error           -> no new tiles are submitted,
//!                                              in-flight tiles finish,
//!                                              the batch returns the error
//! ```
//!
//! Workers finish in any order. The report lists artifacts sorted by patch id,
//! so ledger entries recorded from it are independent of scheduling.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, TileError};
use crate::io::PatchSink;
use crate::ledger::{CoverageLedger, PatchId};
use crate::raster::Raster;

use super::encoder::PatchEncoder;
use super::naming::PatchNaming;
use super::rect::TileRect;

/// Default number of concurrent extraction workers.
pub const DEFAULT_WORKERS: usize = 8;

/// A patch that was written successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchArtifact {
    pub slide_id: String,
    pub patch_id: PatchId,
    /// File name, as produced by [`PatchNaming::name`]
    pub name: String,
    pub rect: TileRect,
    /// Where the sink stored the patch
    pub location: PathBuf,
}

/// A tile that could not be written.
#[derive(Debug, Clone)]
pub struct TileFailure {
    pub patch_id: PatchId,
    pub rect: TileRect,
    pub error: TileError,
}

/// Outcome of extracting a batch of tiles.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Written patches in ascending patch id order
    pub written: Vec<PatchArtifact>,

    /// Per-tile failures in ascending patch id order
    pub failures: Vec<TileFailure>,
}

impl ExtractionReport {
    /// Record every written patch in the ledger, in patch id order.
    pub fn record_into(&self, ledger: &CoverageLedger) -> Result<usize, LedgerError> {
        for artifact in &self.written {
            ledger.record(&artifact.slide_id, artifact.patch_id, artifact.rect)?;
        }
        Ok(self.written.len())
    }
}

// =============================================================================
// Patch Extractor
// =============================================================================

/// Reads, encodes and stores single patches.
pub struct PatchExtractor {
    encoder: PatchEncoder,
    naming: PatchNaming,
    sink: Arc<dyn PatchSink>,
}

impl PatchExtractor {
    pub fn new(encoder: PatchEncoder, naming: PatchNaming, sink: Arc<dyn PatchSink>) -> Self {
        Self {
            encoder,
            naming,
            sink,
        }
    }

    pub fn naming(&self) -> &PatchNaming {
        &self.naming
    }

    /// Read exactly `rect` from `image` and write it as patch `patch_id` of
    /// `slide_id`.
    ///
    /// The name prefix is taken from `slide_id`, so one extractor can serve
    /// several slides without name collisions. This blocks on decoding,
    /// encoding and the sink; async callers should go through
    /// [`extract_tiles`].
    pub fn extract(
        &self,
        image: &dyn Raster,
        rect: TileRect,
        slide_id: &str,
        patch_id: PatchId,
    ) -> Result<PatchArtifact, TileError> {
        let region = image.read_rect(&rect)?;
        let data = self.encoder.encode(&region)?;
        let name = self.naming.for_slide(slide_id).name(patch_id);
        let location = self.sink.write(&name, data)?;

        debug!("Wrote patch {} ({}) to {}", patch_id, rect, location.display());

        Ok(PatchArtifact {
            slide_id: slide_id.to_string(),
            patch_id,
            name,
            rect,
            location,
        })
    }
}

impl std::fmt::Debug for PatchExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchExtractor")
            .field("encoder", &self.encoder)
            .field("naming", &self.naming)
            .field("sink", &self.sink.location())
            .finish()
    }
}

// =============================================================================
// Batch Extraction
// =============================================================================

/// Extract `tiles` with at most `workers` tiles in flight.
///
/// The patch id of a tile is its index in `tiles`.
pub async fn extract_tiles(
    extractor: Arc<PatchExtractor>,
    image: Arc<dyn Raster>,
    slide_id: &str,
    tiles: &[TileRect],
    workers: usize,
) -> Result<ExtractionReport, TileError> {
    let workers = workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    let halted = Arc::new(AtomicBool::new(false));
    let mut set = JoinSet::new();

    info!(
        "Extracting {} tile(s) from {} with {} worker(s) into {}",
        tiles.len(),
        image.identifier(),
        workers,
        extractor.sink.location()
    );

    for (index, &rect) in tiles.iter().enumerate() {
        if halted.load(Ordering::Acquire) {
            break;
        }
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| TileError::Worker(e.to_string()))?;
        // The permit may have been released by a task that just failed fatally
        if halted.load(Ordering::Acquire) {
            break;
        }

        let patch_id = index as PatchId;
        let extractor = Arc::clone(&extractor);
        let image = Arc::clone(&image);
        let halted = Arc::clone(&halted);
        let slide_id = slide_id.to_string();

        set.spawn_blocking(move || {
            let _permit = permit;
            let result = extractor.extract(image.as_ref(), rect, &slide_id, patch_id);
            if let Err(e) = &result {
                if !e.is_isolated() {
                    halted.store(true, Ordering::Release);
                }
            }
            (patch_id, rect, result)
        });
    }

    let mut report = ExtractionReport::default();
    let mut fatal: Option<(PatchId, TileError)> = None;

    while let Some(joined) = set.join_next().await {
        let (patch_id, rect, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                fatal.get_or_insert((PatchId::MAX, TileError::Worker(e.to_string())));
                continue;
            }
        };

        match result {
            Ok(artifact) => report.written.push(artifact),
            Err(e) if e.is_isolated() => {
                warn!("Tile {} ({}) failed: {}", patch_id, rect, e);
                report.failures.push(TileFailure {
                    patch_id,
                    rect,
                    error: e,
                });
            }
            Err(e) => {
                // Keep the error of the earliest tile so reruns report the same cause
                if fatal.as_ref().map_or(true, |(id, _)| patch_id < *id) {
                    fatal = Some((patch_id, e));
                }
            }
        }
    }

    if let Some((patch_id, e)) = fatal {
        error!("Extraction from {} halted at tile {}: {}", image.identifier(), patch_id, e);
        return Err(e);
    }

    report.written.sort_by_key(|a| a.patch_id);
    report.failures.sort_by_key(|f| f.patch_id);

    info!(
        "Extracted {} patch(es) from {}, {} failure(s)",
        report.written.len(),
        image.identifier(),
        report.failures.len()
    );

    Ok(report)
}

// =============================================================================
// Tests
// =============================================================================
