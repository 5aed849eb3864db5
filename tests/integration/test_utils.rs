//! Test utilities for integration tests.
//!
//! This module provides mock implementations and helper functions for building
//! masks, slides and TIFF files.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tiff::encoder::{colortype, TiffEncoder};

use wsi_tiler::detect::{Detection, Detector};
use wsi_tiler::error::{DetectorError, RasterError, WriteError};
use wsi_tiler::io::PatchSink;
use wsi_tiler::raster::{MemoryRaster, Raster, RasterShape, Region, SampleType, Samples};
use wsi_tiler::tile::PatchArtifact;

// =============================================================================
// Raster Builders
// =============================================================================

/// Gray mask with the given pixels set.
pub fn mask_with(width: u32, height: u32, points: &[(u32, u32)]) -> MemoryRaster {
    MemoryRaster::from_gray("mask", width, height, mask_data(width, height, points)).unwrap()
}

/// Row-major gray samples with the given pixels set to 255.
pub fn mask_data(width: u32, height: u32, points: &[(u32, u32)]) -> Vec<u8> {
    let mut data = vec![0u8; (width * height) as usize];
    for &(x, y) in points {
        data[(y * width + x) as usize] = 255;
    }
    data
}

/// Gray mask with a filled rectangle `x0..x1`, `y0..y1`.
pub fn mask_with_block(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Vec<u8> {
    let mut data = vec![0u8; (width * height) as usize];
    for y in y0..y1 {
        for x in x0..x1 {
            data[(y * width + x) as usize] = 1;
        }
    }
    data
}

/// Row-major RGB samples whose values encode the pixel position.
pub fn rgb_data(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x % 256) as u8);
            data.push((y % 256) as u8);
            data.push(((x + y) % 256) as u8);
        }
    }
    data
}

/// RGB slide built from [`rgb_data`].
pub fn rgb_slide(width: u32, height: u32) -> MemoryRaster {
    MemoryRaster::new("slide", width, height, 3, Samples::U8(rgb_data(width, height))).unwrap()
}

/// Write a single-strip 8-bit gray TIFF.
pub fn write_gray_tiff(path: &Path, width: u32, height: u32, data: &[u8]) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    encoder
        .write_image::<colortype::Gray8>(width, height, data)
        .unwrap();
}

/// Write an 8-bit RGB TIFF built from [`rgb_data`].
pub fn write_rgb_tiff(path: &Path, width: u32, height: u32) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    encoder
        .write_image::<colortype::RGB8>(width, height, &rgb_data(width, height))
        .unwrap();
}

// =============================================================================
// Counting Raster
// =============================================================================

/// Wraps a raster and records the regions read from it.
pub struct CountingRaster<R> {
    inner: R,
    reads: AtomicUsize,
    largest: AtomicUsize,
}

impl<R: Raster> CountingRaster<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            largest: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Pixel count of the largest region read.
    pub fn largest_read(&self) -> usize {
        self.largest.load(Ordering::SeqCst)
    }
}

impl<R: Raster> Raster for CountingRaster<R> {
    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    fn shape(&self) -> RasterShape {
        self.inner.shape()
    }

    fn sample_type(&self) -> SampleType {
        self.inner.sample_type()
    }

    fn read_region(&self, y0: u32, y1: u32, x0: u32, x1: u32) -> Result<Region, RasterError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let area = (y1.saturating_sub(y0) as usize) * (x1.saturating_sub(x0) as usize);
        self.largest.fetch_max(area, Ordering::SeqCst);
        self.inner.read_region(y0, y1, x0, x1)
    }
}

// =============================================================================
// Patch Sinks
// =============================================================================

/// Keeps patches in memory and fails on chosen names.
#[derive(Default)]
pub struct FailingSink {
    fail_on: Vec<String>,
    written: Mutex<HashMap<String, Bytes>>,
}

impl FailingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            fail_on: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn written_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.written.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.written.lock().unwrap().get(name).cloned()
    }
}

impl PatchSink for FailingSink {
    fn write(&self, name: &str, data: Bytes) -> Result<PathBuf, WriteError> {
        if self.fail_on.iter().any(|n| n == name) {
            return Err(WriteError::Io {
                path: name.to_string(),
                message: "No space left on device".to_string(),
            });
        }
        self.written.lock().unwrap().insert(name.to_string(), data);
        Ok(PathBuf::from(name))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

// =============================================================================
// Mock Detector
// =============================================================================

/// Returns fixed detections per patch id and counts calls.
#[derive(Default)]
pub struct MockDetector {
    by_patch: HashMap<u64, Vec<Detection>>,
    calls: AtomicUsize,
}

impl MockDetector {
    pub fn new(by_patch: HashMap<u64, Vec<Detection>>) -> Self {
        Self {
            by_patch,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for MockDetector {
    async fn infer(&self, patch: &PatchArtifact) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.by_patch.get(&patch.patch_id).cloned().unwrap_or_default())
    }
}
