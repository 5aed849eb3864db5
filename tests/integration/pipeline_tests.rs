//! End-to-end pipeline tests.
//!
//! Run planning, extraction, ledger export, detection and publication for a
//! small slide with in-memory and on-disk collaborators.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use wsi_tiler::detect::{Detection, DetectionDocument, PrecomputedDetector};
use wsi_tiler::error::{PipelineError, RasterError};
use wsi_tiler::io::FsPatchSink;
use wsi_tiler::ledger::{document_name, CoverageLedger};
use wsi_tiler::pipeline::{self, PipelineContext, PipelineOptions, TilingOptions};
use wsi_tiler::raster::{MemoryRaster, Raster};
use wsi_tiler::tile::PlannerConfig;

use super::test_utils::{
    mask_with, mask_with_block, rgb_slide, write_gray_tiff, write_rgb_tiff, FailingSink,
    MockDetector,
};

const SLIDE: &str = "slide";

fn options(output_dir: &Path) -> PipelineOptions {
    let mut options = PipelineOptions {
        tiling: TilingOptions {
            planner: PlannerConfig::new(32),
            workers: 4,
            ..Default::default()
        },
        output_dir: output_dir.to_path_buf(),
        ..Default::default()
    };
    options.detection.unit_factor = Some(0.00024);
    options
}

fn context(sink: Arc<FailingSink>, detector: Arc<MockDetector>) -> PipelineContext {
    let roi: Arc<dyn Raster> =
        Arc::new(MemoryRaster::from_gray("roi", 64, 64, vec![255; 64 * 64]).unwrap());
    PipelineContext {
        slide_id: SLIDE.to_string(),
        image: Arc::new(rgb_slide(64, 64)),
        tissue_mask: Arc::new(mask_with(64, 64, &[(3, 3), (40, 3), (3, 40), (40, 40)])),
        roi_mask: roi,
        detector,
        sink,
    }
}

fn one_detection_per_patch() -> HashMap<u64, Vec<Detection>> {
    (0..4)
        .map(|id| (id, vec![Detection::new(1.0, 2.0, (id % 2) as usize, 0.9)]))
        .collect()
}

#[tokio::test]
async fn test_run_isolates_failed_write() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FailingSink::failing_on(&["slideinflammatory-cells_2.png"]));
    let detector = Arc::new(MockDetector::new(one_detection_per_patch()));
    let ctx = context(Arc::clone(&sink), Arc::clone(&detector));

    let summary = pipeline::run(&ctx, &options(dir.path())).await.unwrap();

    assert_eq!(summary.tiles_planned, 4);
    assert_eq!(summary.patches_written, 3);
    assert_eq!(summary.tile_failures.len(), 1);
    assert_eq!(summary.tile_failures[0].0, 2);
    assert_eq!(sink.written_names().len(), 3);

    // The detector only sees written patches
    assert_eq!(detector.calls(), 3);
    assert_eq!(summary.detector_failures, 0);

    // The failed tile is absent from the ledger
    let ledger = CoverageLedger::load(SLIDE, &summary.ledger.path).unwrap();
    assert_eq!(ledger.len(SLIDE), 3);
    assert!(ledger.lookup_by_patch(SLIDE, 2).is_err());
    assert_eq!(summary.ledger.patches, 3);
    assert!(summary.ledger.path.ends_with(document_name(SLIDE)));

    assert_eq!(summary.reprojection.retained, 3);
    assert_eq!(summary.documents.len(), 3);
    assert_eq!(summary.converted.len(), 3);
}

#[tokio::test]
async fn test_run_writes_global_positions() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FailingSink::new());
    let detector = Arc::new(MockDetector::new(one_detection_per_patch()));
    let ctx = context(sink, detector);

    let summary = pipeline::run(&ctx, &options(dir.path())).await.unwrap();
    let ledger = CoverageLedger::load(SLIDE, &summary.ledger.path).unwrap();

    let combined =
        DetectionDocument::read(&dir.path().join("detected-inflammatory-cells.json")).unwrap();
    assert_eq!(combined.points.len(), 4);

    let mut expected: Vec<(f64, f64)> = ledger
        .entries(SLIDE)
        .iter()
        .map(|(_, rect)| (f64::from(rect.x0) + 1.0, f64::from(rect.y0) + 2.0))
        .collect();
    let mut actual: Vec<(f64, f64)> = combined
        .points
        .iter()
        .map(|p| (p.point[0], p.point[1]))
        .collect();
    let by_position = |a: &(f64, f64), b: &(f64, f64)| a.partial_cmp(b).unwrap();
    expected.sort_by(by_position);
    actual.sort_by(by_position);
    assert_eq!(actual, expected);

    let lymphocytes =
        DetectionDocument::read(&dir.path().join("detected-lymphocytes.json")).unwrap();
    let monocytes = DetectionDocument::read(&dir.path().join("detected-monocytes.json")).unwrap();
    assert_eq!(lymphocytes.points.len(), 2);
    assert_eq!(monocytes.points.len(), 2);

    let converted = DetectionDocument::read(
        &dir.path().join("mm").join("detected-inflammatory-cells.json"),
    )
    .unwrap();
    for (px, mm) in combined.points.iter().zip(&converted.points) {
        assert!((px.point[0] * 0.00024 - mm.point[0]).abs() < 1e-12);
        assert!((px.point[1] * 0.00024 - mm.point[1]).abs() < 1e-12);
    }
}

#[tokio::test]
async fn test_run_from_tiff_files() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("A_P000002_PAS_CPG.tif");
    let mask = dir.path().join("A_P000002_PAS_CPG_mask.tif");
    write_rgb_tiff(&image, 64, 64);
    write_gray_tiff(&mask, 64, 64, &mask_with_block(64, 64, 0, 0, 32, 32));

    let detector = PrecomputedDetector::from_json(
        r#"{"A_P000002_inflammatory-cells_0.png": [
                {"x": 5.0, "y": 6.0, "class": 0, "confidence": 0.5},
                {"x": 7.0, "y": 8.0, "class": 3, "confidence": 0.5}
            ]}"#,
    )
    .unwrap();
    let output = dir.path().join("out");
    let sink = Arc::new(FsPatchSink::create(output.join("patches")).unwrap());

    let ctx = PipelineContext::open(&image, &mask, &mask, Arc::new(detector), sink).unwrap();
    assert_eq!(ctx.slide_id, "A_P000002_PAS_CPG");

    let mut opts = options(&output);
    opts.detection.unit_factor = None;
    let summary = pipeline::run(&ctx, &opts).await.unwrap();

    assert_eq!(summary.patches_written, 1);
    assert!(output
        .join("patches")
        .join("A_P000002_inflammatory-cells_0.png")
        .exists());
    assert!(output.join("A_P000002_PAS_CPG_patches.xml").exists());
    assert_eq!(summary.reprojection.retained, 1);
    assert_eq!(summary.reprojection.dropped_unknown_class, 1);
    assert!(summary.converted.is_empty());
    assert!(!output.join("mm").exists());

    let lymphocytes = fs::read_to_string(output.join("detected-lymphocytes.json")).unwrap();
    assert!(lymphocytes.contains("\"Point 1\""));
}

#[tokio::test]
async fn test_open_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.tif");
    let detector = Arc::new(MockDetector::default());
    let sink = Arc::new(FailingSink::new());

    let result = PipelineContext::open(&missing, &missing, &missing, detector, sink);
    assert!(matches!(
        result,
        Err(PipelineError::Raster(RasterError::NotFound(_)))
    ));
}
