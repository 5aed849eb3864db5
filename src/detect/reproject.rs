//! Detection reprojection.
//!
//! Places patch-local detections on the full slide and filters them against
//! a secondary region-of-interest mask.
//!
//! # Steps
//!
//! For every patch, in ascending patch id order:
//!
//! 1. Look up the patch rectangle in the ledger. A patch without an entry
//!    loses all of its detections.
//! 2. Translate each detection by the rectangle origin.
//! 3. Round the global position half-to-even and test the mask at that pixel.
//!    Positions outside the mask are rejected.
//! 4. Route retained detections into their class bucket and the combined
//!    bucket.
//!
//! Stored coordinates keep their fractional part; rounding is only used for
//! the mask test.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::RasterError;
use crate::ledger::{CoverageLedger, PatchId};
use crate::raster::Raster;

use super::types::{Detection, DetectionSet, GlobalDetection, COMBINED_CLASS, DEFAULT_CLASSES};

/// Counters describing what happened to each detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprojectionReport {
    /// Patches with detections but no ledger entry
    pub patches_missing: usize,

    /// Detections dropped because their patch has no ledger entry
    pub dropped_missing_entry: usize,

    /// Detections whose global position is outside the mask or on a zero pixel
    pub dropped_outside_mask: usize,

    /// Detections with a class index outside the class list
    pub dropped_unknown_class: usize,

    /// Detections with non-finite coordinates or a confidence outside `[0, 1]`
    pub dropped_malformed: usize,

    /// Detections kept
    pub retained: usize,
}

impl ReprojectionReport {
    /// Total number of detections looked at.
    pub fn total(&self) -> usize {
        self.dropped_missing_entry
            + self.dropped_outside_mask
            + self.dropped_unknown_class
            + self.dropped_malformed
            + self.retained
    }
}

/// Result of one reprojection.
#[derive(Debug, Clone)]
pub struct Reprojection {
    pub set: DetectionSet,
    pub report: ReprojectionReport,
}

/// Maps patch-local detections to slide coordinates.
#[derive(Debug, Clone)]
pub struct Reprojector {
    classes: Vec<String>,
    combined_name: String,
}

impl Default for Reprojector {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect())
    }
}

impl Reprojector {
    /// Reprojector with the given class list and the default combined bucket.
    pub fn new(classes: Vec<String>) -> Self {
        Self {
            classes,
            combined_name: COMBINED_CLASS.to_string(),
        }
    }

    pub fn with_combined_name(mut self, name: impl Into<String>) -> Self {
        self.combined_name = name.into();
        self
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Reproject every patch's detections.
    ///
    /// # Errors
    ///
    /// Fails only if the mask cannot be read for a reason other than the
    /// position lying outside it.
    pub fn reproject(
        &self,
        detections: &BTreeMap<PatchId, Vec<Detection>>,
        ledger: &CoverageLedger,
        slide_id: &str,
        mask: &dyn Raster,
    ) -> Result<Reprojection, RasterError> {
        let mut set = DetectionSet::new(&self.classes, &self.combined_name);
        let mut report = ReprojectionReport::default();

        for (&patch_id, patch_detections) in detections {
            let rect = match ledger.lookup_by_patch(slide_id, patch_id) {
                Ok(rect) => rect,
                Err(e) => {
                    if !patch_detections.is_empty() {
                        warn!("Dropping {} detection(s): {}", patch_detections.len(), e);
                        report.patches_missing += 1;
                        report.dropped_missing_entry += patch_detections.len();
                    }
                    continue;
                }
            };

            for detection in patch_detections {
                if !is_well_formed(detection) {
                    debug!("Patch {}: malformed detection {:?}", patch_id, detection);
                    report.dropped_malformed += 1;
                    continue;
                }
                if detection.class_index >= self.classes.len() {
                    debug!(
                        "Patch {}: unknown class index {}",
                        patch_id, detection.class_index
                    );
                    report.dropped_unknown_class += 1;
                    continue;
                }

                let global = GlobalDetection {
                    x: detection.x + f64::from(rect.x0),
                    y: detection.y + f64::from(rect.y0),
                    class_index: detection.class_index,
                    confidence: detection.confidence,
                    patch_id,
                };

                if !in_mask(mask, global.x, global.y)? {
                    report.dropped_outside_mask += 1;
                    continue;
                }

                set.push(global);
                report.retained += 1;
            }
        }

        info!(
            "Reprojected {} of {} detection(s) for {} ({} outside mask, {} without ledger entry, {} unknown class)",
            report.retained,
            report.total(),
            slide_id,
            report.dropped_outside_mask,
            report.dropped_missing_entry,
            report.dropped_unknown_class
        );

        Ok(Reprojection { set, report })
    }
}

fn is_well_formed(detection: &Detection) -> bool {
    detection.x.is_finite()
        && detection.y.is_finite()
        && (0.0..=1.0).contains(&detection.confidence)
}

/// Mask test at the pixel nearest to `(x, y)`, rounding half to even.
fn in_mask(mask: &dyn Raster, x: f64, y: f64) -> Result<bool, RasterError> {
    let shape = mask.shape();
    let row = y.round_ties_even();
    let col = x.round_ties_even();

    if row < 0.0 || col < 0.0 || row >= f64::from(shape.height) || col >= f64::from(shape.width) {
        return Ok(false);
    }
    mask.is_set(row as u32, col as u32)
}

// =============================================================================
// Tests
// =============================================================================
