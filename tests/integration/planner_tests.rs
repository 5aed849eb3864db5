//! Tile planning tests.
//!
//! Covers the coverage guarantees of the planner:
//! - every mask pixel inside the usable area lies in exactly one emitted tile
//! - emission order and patch ids are reproducible
//! - only chunk-sized regions are read from the mask
//! - TIFF masks plan the same tiles as in-memory masks

use std::collections::HashSet;

use wsi_tiler::raster::{MemoryRaster, Raster, TiffRaster};
use wsi_tiler::tile::{EdgePolicy, PlannerConfig, TilePlanner, TileRect};

use super::test_utils::{mask_data, mask_with, mask_with_block, write_gray_tiff, CountingRaster};

/// Pseudo-random but fixed set of mask pixels.
fn scattered_points(width: u32, height: u32, count: usize) -> Vec<(u32, u32)> {
    let mut state = 0x2545_f491u64;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ((state % width as u64) as u32, ((state >> 32) % height as u64) as u32)
        })
        .collect()
}

// =============================================================================
// Coverage
// =============================================================================

#[test]
fn test_every_mask_pixel_covered_exactly_once() {
    let (width, height) = (256, 192);
    let points = scattered_points(width, height, 300);
    let mask = mask_with(width, height, &points);

    let planner = TilePlanner::new(PlannerConfig::new(32)).unwrap();
    let tiles = planner.plan(&mask).unwrap();

    let unique: HashSet<TileRect> = tiles.iter().copied().collect();
    assert_eq!(unique.len(), tiles.len(), "no tile is emitted twice");

    for &(x, y) in &points {
        let covering = tiles.iter().filter(|t| t.contains(x, y)).count();
        assert_eq!(covering, 1, "pixel ({}, {}) covered {} times", x, y, covering);
    }
    for tile in &tiles {
        assert_eq!(tile.width(), 32);
        assert_eq!(tile.height(), 32);
        assert_eq!(tile.x0 % 32, 0);
        assert_eq!(tile.y0 % 32, 0);
    }
}

#[test]
fn test_planning_is_deterministic() {
    let points = scattered_points(200, 200, 150);
    let mask = mask_with(200, 200, &points);
    let planner = TilePlanner::new(PlannerConfig::new(16).with_chunk_size(48)).unwrap();

    let first = planner.plan(&mask).unwrap();
    let second = planner.plan(&mask).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_chunk_size_does_not_change_tile_set() {
    let points = scattered_points(128, 128, 80);
    let mask = mask_with(128, 128, &points);

    let small = TilePlanner::new(PlannerConfig::new(16)).unwrap();
    let large = TilePlanner::new(PlannerConfig::new(16).with_chunk_size(40)).unwrap();

    let a: HashSet<TileRect> = small.plan(&mask).unwrap().into_iter().collect();
    let b: HashSet<TileRect> = large.plan(&mask).unwrap().into_iter().collect();
    assert_eq!(a, b);
}

#[test]
fn test_overflowing_tiles_dropped_by_default() {
    // 100x100 with 32-pixel tiles: origins at 96 would overflow
    let mask = MemoryRaster::from_gray("mask", 100, 100, vec![1u8; 100 * 100]).unwrap();

    let tiles = TilePlanner::new(PlannerConfig::new(32)).unwrap().plan(&mask).unwrap();
    assert_eq!(tiles.len(), 9);
    assert!(tiles.iter().all(|t| t.x1 <= 96 && t.y1 <= 96));

    let clipped = TilePlanner::new(PlannerConfig::new(32).with_edge_policy(EdgePolicy::Clip))
        .unwrap()
        .plan(&mask)
        .unwrap();
    assert_eq!(clipped.len(), 16);
    assert!(clipped.contains(&TileRect::new(96, 96, 100, 100)));
}

// =============================================================================
// Memory Bounds
// =============================================================================

#[test]
fn test_reads_are_chunk_sized() {
    let data = mask_with_block(512, 512, 100, 100, 300, 140);
    let mask = CountingRaster::new(MemoryRaster::from_gray("mask", 512, 512, data).unwrap());

    let planner = TilePlanner::new(PlannerConfig::new(64)).unwrap();
    let tiles = planner.plan(&mask).unwrap();

    assert_eq!(mask.reads(), 64, "one read per 64x64 chunk");
    assert_eq!(mask.largest_read(), 64 * 64);
    // Columns 64..320 and rows 64..192 hold the block
    assert_eq!(tiles.len(), 4 * 2);
}

// =============================================================================
// TIFF Masks
// =============================================================================

#[test]
fn test_tiff_mask_matches_memory_mask() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mask.tif");
    let points = scattered_points(300, 220, 120);
    let data = mask_data(300, 220, &points);
    write_gray_tiff(&path, 300, 220, &data);

    let tiff = TiffRaster::open(&path).unwrap();
    let memory = MemoryRaster::from_gray("mask", 300, 220, data).unwrap();
    assert_eq!(tiff.shape(), memory.shape());

    let planner = TilePlanner::new(PlannerConfig::new(50).with_stride(25).with_chunk_size(60)).unwrap();
    assert_eq!(planner.plan(&tiff).unwrap(), planner.plan(&memory).unwrap());
}

#[test]
fn test_plan_within_smaller_image() {
    let mask = mask_with(64, 64, &[(5, 5), (40, 40), (60, 10)]);
    let planner = TilePlanner::new(PlannerConfig::new(16)).unwrap();

    let tiles = planner.plan_within(&mask, 48, 48).unwrap();
    assert_eq!(
        tiles,
        vec![TileRect::new(0, 0, 16, 16), TileRect::new(32, 32, 48, 48)]
    );
}
