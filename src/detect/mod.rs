//! Detections: from patch-local detector output to slide-level documents.
//!
//! ```text
//! PatchArtifact ──► Detector::infer ──► Detection (patch-local)
//!                                            │
//!                      CoverageLedger ──►  Reprojector  ◄── ROI mask
//!                                            │
//!                                            ▼
//!                                      DetectionSet (slide pixels)
//!                                            │
//!                          ┌─────────────────┴───────────────┐
//!                          ▼                                 ▼
//!                  write_documents                   UnitConverter
//!               detected-{class}.json             (pixels → millimetres)
//! ```

mod detector;
mod document;
mod reproject;
mod types;
mod units;

pub use detector::{collect_detections, CollectedDetections, Detector, PrecomputedDetector};
pub use document::{
    document_file_name, write_documents, DetectionDocument, PointRecord, SchemaVersion,
    DEFAULT_SPACING,
};
pub use reproject::{Reprojection, ReprojectionReport, Reprojector};
pub use types::{Detection, DetectionSet, GlobalDetection, COMBINED_CLASS, DEFAULT_CLASSES};
pub use units::{UnitConverter, DEFAULT_PIXEL_TO_MM};
