//! Patch extraction tests.
//!
//! Verifies that extracted patches hold exactly the slide pixels of their
//! tile, that a failing write is isolated to its tile, and that concurrent
//! extraction records the ledger in patch id order.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, ImageReader};

use wsi_tiler::io::{FsPatchSink, PatchSink};
use wsi_tiler::ledger::CoverageLedger;
use wsi_tiler::raster::{Raster, TiffRaster};
use wsi_tiler::tile::{
    extract_tiles, PatchEncoder, PatchExtractor, PatchFormat, PatchNaming, PlannerConfig,
    TilePlanner, TileRect,
};

use super::test_utils::{mask_with, rgb_data, rgb_slide, write_rgb_tiff, FailingSink};

fn extractor(slide_id: &str, sink: Arc<dyn PatchSink>) -> Arc<PatchExtractor> {
    Arc::new(PatchExtractor::new(
        PatchEncoder::new(PatchFormat::Png),
        PatchNaming::new(slide_id, 10, "inflammatory-cells", PatchFormat::Png),
        sink,
    ))
}

fn row_of_tiles(count: u32, size: u32) -> Vec<TileRect> {
    (0..count)
        .map(|i| TileRect::from_origin(i * size, 0, size, size))
        .collect()
}

// =============================================================================
// Pixel Fidelity
// =============================================================================

#[tokio::test]
async fn test_patch_pixels_match_slide() {
    let dir = tempfile::tempdir().unwrap();
    let slide_path = dir.path().join("slide.tif");
    write_rgb_tiff(&slide_path, 96, 64);
    let slide: Arc<dyn Raster> = Arc::new(TiffRaster::open(&slide_path).unwrap());

    let sink = Arc::new(FsPatchSink::create(dir.path().join("patches")).unwrap());
    let tiles = vec![TileRect::new(32, 32, 64, 64)];

    let report = extract_tiles(extractor("slide", sink), slide, "slide", &tiles, 2)
        .await
        .unwrap();
    let artifact = &report.written[0];
    assert_eq!(artifact.name, "slideinflammatory-cells_0.png");

    let decoded = ImageReader::open(&artifact.location)
        .unwrap()
        .decode()
        .unwrap()
        .into_rgb8();
    assert_eq!((decoded.width(), decoded.height()), (32, 32));

    let full = rgb_data(96, 64);
    for y in 0..32u32 {
        for x in 0..32u32 {
            let src = (((y + 32) * 96 + (x + 32)) * 3) as usize;
            assert_eq!(decoded.get_pixel(x, y).0, [full[src], full[src + 1], full[src + 2]]);
        }
    }
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test]
async fn test_one_failed_write_of_n() {
    let sink = Arc::new(FailingSink::failing_on(&["slideinflammatory-cells_3.png"]));
    let slide: Arc<dyn Raster> = Arc::new(rgb_slide(8 * 16, 16));
    let tiles = row_of_tiles(8, 16);

    let report = extract_tiles(extractor("slide", sink.clone()), slide, "slide", &tiles, 3)
        .await
        .unwrap();

    assert_eq!(report.written.len(), 7);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].patch_id, 3);
    assert_eq!(sink.written_names().len(), 7);

    let ledger = CoverageLedger::new();
    report.record_into(&ledger).unwrap();
    assert_eq!(ledger.len("slide"), 7);
    assert!(ledger.lookup_by_patch("slide", 3).is_err());
    assert_eq!(ledger.lookup_by_rect("slide", &tiles[7]), Some(7));
}

#[tokio::test]
async fn test_concurrency_keeps_ledger_order() {
    let slide: Arc<dyn Raster> = Arc::new(rgb_slide(64, 64));
    let mask = mask_with(64, 64, &[(1, 1), (20, 3), (40, 40), (63, 63), (9, 50)]);
    let tiles = TilePlanner::new(PlannerConfig::new(8))
        .unwrap()
        .plan(&mask)
        .unwrap();

    let mut ledgers = Vec::new();
    for workers in [1, 4, 16] {
        let sink = Arc::new(FailingSink::new());
        let report = extract_tiles(
            extractor("slide", sink),
            Arc::clone(&slide),
            "slide",
            &tiles,
            workers,
        )
        .await
        .unwrap();
        let ledger = CoverageLedger::new();
        report.record_into(&ledger).unwrap();
        ledgers.push(ledger.export("slide"));
    }

    assert_eq!(ledgers[0], ledgers[1]);
    assert_eq!(ledgers[1], ledgers[2]);
}

#[tokio::test]
async fn test_tiff_patch_format() {
    let sink = Arc::new(FailingSink::new());
    let slide: Arc<dyn Raster> = Arc::new(rgb_slide(16, 16));
    let extractor = Arc::new(PatchExtractor::new(
        PatchEncoder::new(PatchFormat::Tiff),
        PatchNaming::new("slide", 10, "cells", PatchFormat::Tiff),
        sink.clone(),
    ));

    let report = extract_tiles(extractor, slide, "slide", &row_of_tiles(1, 16), 1)
        .await
        .unwrap();
    assert_eq!(report.written[0].name, "slidecells_0.tif");

    let data = sink.get("slidecells_0.tif").unwrap();
    let decoded = ImageReader::with_format(Cursor::new(data.as_ref()), ImageFormat::Tiff)
        .decode()
        .unwrap();
    assert_eq!(decoded.into_rgb8().into_raw(), rgb_data(16, 16));
}
