//! Reprojection and unit conversion tests.

use std::collections::BTreeMap;
use std::fs;

use wsi_tiler::detect::{
    write_documents, Detection, DetectionDocument, Reprojector, UnitConverter, DEFAULT_SPACING,
};
use wsi_tiler::ledger::{document_name, CoverageLedger};
use wsi_tiler::raster::MemoryRaster;
use wsi_tiler::tile::TileRect;

use super::test_utils::{mask_data, mask_with};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn single_patch_ledger(slide_id: &str) -> CoverageLedger {
    let ledger = CoverageLedger::new();
    ledger
        .record(slide_id, 0, TileRect::new(100, 200, 1124, 1224))
        .unwrap();
    ledger
}

#[test]
fn test_detection_is_translated_by_patch_origin() {
    let ledger = single_patch_ledger("slide");
    let roi = mask_with(256, 256, &[(110, 220)]);

    let mut detections = BTreeMap::new();
    detections.insert(0, vec![Detection::new(10.0, 20.0, 0, 0.9)]);

    let result = Reprojector::default()
        .reproject(&detections, &ledger, "slide", &roi)
        .unwrap();

    let lymphocytes = result.set.get("lymphocytes").unwrap();
    assert_eq!(lymphocytes.len(), 1);
    assert_eq!((lymphocytes[0].x, lymphocytes[0].y), (110.0, 220.0));
    assert_eq!(result.set.combined().len(), 1);
    assert_eq!(result.report.retained, 1);
}

#[test]
fn test_detection_on_zero_mask_pixel_is_dropped() {
    let ledger = single_patch_ledger("slide");
    // Neighbour of the target pixel is set, the target itself is not
    let roi = mask_with(256, 256, &[(111, 220)]);

    let mut detections = BTreeMap::new();
    detections.insert(0, vec![Detection::new(10.0, 20.0, 1, 0.9)]);

    let result = Reprojector::default()
        .reproject(&detections, &ledger, "slide", &roi)
        .unwrap();
    assert!(result.set.is_empty());
    assert_eq!(result.report.dropped_outside_mask, 1);
}

#[test]
fn test_detections_of_unledgered_patch_are_dropped() {
    let ledger = single_patch_ledger("slide");
    let roi = MemoryRaster::from_gray("roi", 64, 64, vec![255; 64 * 64]).unwrap();

    let mut detections = BTreeMap::new();
    detections.insert(5, vec![Detection::new(1.0, 1.0, 0, 0.5); 3]);

    let result = Reprojector::default()
        .reproject(&detections, &ledger, "slide", &roi)
        .unwrap();
    assert!(result.set.is_empty());
    assert_eq!(result.report.patches_missing, 1);
    assert_eq!(result.report.dropped_missing_entry, 3);
}

#[test]
fn test_reprojection_from_loaded_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(document_name("slide"));
    let ledger = CoverageLedger::new();
    ledger.record("slide", 0, TileRect::new(0, 0, 32, 32)).unwrap();
    ledger.record("slide", 1, TileRect::new(32, 0, 64, 32)).unwrap();
    ledger.export_to_path("slide", &path).unwrap();

    let loaded = CoverageLedger::load("slide", &path).unwrap();
    let roi = mask_with(64, 32, &[(36, 4), (5, 6)]);

    let mut detections = BTreeMap::new();
    detections.insert(0, vec![Detection::new(5.0, 6.0, 1, 0.7)]);
    detections.insert(1, vec![Detection::new(4.0, 4.0, 0, 0.8)]);

    let result = Reprojector::default()
        .reproject(&detections, &loaded, "slide", &roi)
        .unwrap();

    assert_eq!(result.report.retained, 2);
    let monocytes = result.set.get("monocytes").unwrap();
    assert_eq!((monocytes[0].x, monocytes[0].y), (5.0, 6.0));
    let lymphocytes = result.set.get("lymphocytes").unwrap();
    assert_eq!((lymphocytes[0].x, lymphocytes[0].y), (36.0, 4.0));
    assert_eq!(lymphocytes[0].patch_id, 1);
}

#[test]
fn test_documents_then_conversion_recover_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CoverageLedger::new();
    ledger.record("slide", 0, TileRect::new(0, 0, 4096, 4096)).unwrap();

    let roi = MemoryRaster::from_gray("roi", 4096, 4096, vec![1; 4096 * 4096]).unwrap();
    let mut detections = BTreeMap::new();
    detections.insert(0, vec![Detection::new(1000.0, 2000.0, 0, 0.876)]);

    let result = Reprojector::default()
        .reproject(&detections, &ledger, "slide", &roi)
        .unwrap();
    let written = write_documents(&result.set, dir.path(), DEFAULT_SPACING).unwrap();
    assert_eq!(written.len(), 3);

    let mm_dir = dir.path().join("mm");
    let converter = UnitConverter::default();
    let converted = converter.convert_dir(dir.path(), &mm_dir).unwrap();
    assert_eq!(converted.len(), 3);

    let doc = DetectionDocument::read(&mm_dir.join("detected-lymphocytes.json")).unwrap();
    let point = &doc.points[0].point;
    assert!(close(point[0], 0.24));
    assert!(close(point[1], 0.48));
    assert_eq!(point[2], DEFAULT_SPACING);
    assert_eq!(doc.points[0].probability, Some(0.88));

    // Converting back recovers the pixel positions
    let back_dir = dir.path().join("px");
    converter
        .inverse()
        .convert_dir(&mm_dir, &back_dir)
        .unwrap();
    let back = DetectionDocument::read(&back_dir.join("detected-lymphocytes.json")).unwrap();
    assert!(close(back.points[0].point[0], 1000.0));
    assert!(close(back.points[0].point[1], 2000.0));
}

#[test]
fn test_conversion_rejects_short_points_without_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("detected-monocytes.json");
    fs::write(
        &input,
        r#"{"name": "monocytes", "type": "Multiple points",
            "points": [{"name": "Point 1", "point": [10.0, 20.0, 0.25]},
                       {"name": "Point 2", "point": [10.0]}],
            "version": {"major": 1, "minor": 0}}"#,
    )
    .unwrap();

    let output = dir.path().join("out.json");
    assert!(UnitConverter::default().convert_file(&input, &output).is_err());
    assert!(!output.exists());
}

#[test]
fn test_rounding_ties_to_even_for_mask_test() {
    let ledger = CoverageLedger::new();
    ledger.record("slide", 0, TileRect::new(0, 0, 8, 8)).unwrap();
    // Only pixel (2, 2) is set; 2.5 rounds to 2, 3.5 rounds to 4
    let roi = MemoryRaster::from_gray("roi", 8, 8, mask_data(8, 8, &[(2, 2)])).unwrap();

    let mut detections = BTreeMap::new();
    detections.insert(
        0,
        vec![
            Detection::new(2.5, 2.5, 0, 0.5),
            Detection::new(3.5, 2.0, 0, 0.5),
        ],
    );

    let result = Reprojector::default()
        .reproject(&detections, &ledger, "slide", &roi)
        .unwrap();
    assert_eq!(result.report.retained, 1);
    assert_eq!(result.report.dropped_outside_mask, 1);
    assert_eq!(result.set.get("lymphocytes").unwrap()[0].x, 2.5);
}
