//! Raster trait for format-agnostic region access.
//!
//! This module defines the [`Raster`] trait, which lets the planner, the
//! extractor and the reprojector read rectangular regions of a large 2-D array
//! without caring how it is stored.
//!
//! Implementations:
//! - [`crate::raster::TiffRaster`] decodes only the strips/tiles a region touches
//! - [`crate::raster::MemoryRaster`] holds the whole array (decoded PNG/JPEG,
//!   programmatic masks)

use crate::error::RasterError;
use crate::tile::TileRect;

// =============================================================================
// Sample Types
// =============================================================================

/// Element type of a raster sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    F32,
}

impl SampleType {
    /// Get a human-readable name for the sample type.
    pub const fn name(&self) -> &'static str {
        match self {
            SampleType::U8 => "u8",
            SampleType::U16 => "u16",
            SampleType::F32 => "f32",
        }
    }
}

/// Interleaved sample buffer, row-major, `channels` samples per pixel.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl Samples {
    /// Create a zero-filled buffer of `len` samples.
    pub fn zeros(sample_type: SampleType, len: usize) -> Self {
        match sample_type {
            SampleType::U8 => Samples::U8(vec![0; len]),
            SampleType::U16 => Samples::U16(vec![0; len]),
            SampleType::F32 => Samples::F32(vec![0.0; len]),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::U8(_) => SampleType::U8,
            Samples::U16(_) => SampleType::U16,
            Samples::F32(_) => SampleType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether sample `index` is strictly positive.
    #[inline]
    pub fn is_positive(&self, index: usize) -> bool {
        match self {
            Samples::U8(v) => v[index] > 0,
            Samples::U16(v) => v[index] > 0,
            Samples::F32(v) => v[index] > 0.0,
        }
    }

    /// Whether any sample in `range` is strictly positive.
    pub fn any_positive_in(&self, range: std::ops::Range<usize>) -> bool {
        match self {
            Samples::U8(v) => v[range].iter().any(|&s| s > 0),
            Samples::U16(v) => v[range].iter().any(|&s| s > 0),
            Samples::F32(v) => v[range].iter().any(|&s| s > 0.0),
        }
    }
}

/// Copy a `rows` x `cols` block of samples between two row-major buffers.
///
/// Offsets and row lengths are expressed in samples, `cols` too.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_block(
    src: &Samples,
    src_row_len: usize,
    src_offset: usize,
    dst: &mut Samples,
    dst_row_len: usize,
    dst_offset: usize,
    rows: usize,
    cols: usize,
) -> Result<(), RasterError> {
    fn copy<T: Copy>(
        src: &[T],
        src_row_len: usize,
        src_offset: usize,
        dst: &mut [T],
        dst_row_len: usize,
        dst_offset: usize,
        rows: usize,
        cols: usize,
    ) {
        for row in 0..rows {
            let s = src_offset + row * src_row_len;
            let d = dst_offset + row * dst_row_len;
            dst[d..d + cols].copy_from_slice(&src[s..s + cols]);
        }
    }

    match (src, dst) {
        (Samples::U8(s), Samples::U8(d)) => {
            copy(s, src_row_len, src_offset, d, dst_row_len, dst_offset, rows, cols)
        }
        (Samples::U16(s), Samples::U16(d)) => {
            copy(s, src_row_len, src_offset, d, dst_row_len, dst_offset, rows, cols)
        }
        (Samples::F32(s), Samples::F32(d)) => {
            copy(s, src_row_len, src_offset, d, dst_row_len, dst_offset, rows, cols)
        }
        (s, d) => {
            return Err(RasterError::Decode {
                message: format!(
                    "sample type mismatch: chunk is {}, region is {}",
                    s.sample_type().name(),
                    d.sample_type().name()
                ),
            })
        }
    }
    Ok(())
}

// =============================================================================
// Shape and Region
// =============================================================================

/// Dimensions of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterShape {
    /// Height in pixels (rows)
    pub height: u32,

    /// Width in pixels (columns)
    pub width: u32,

    /// Samples per pixel
    pub channels: u16,
}

impl RasterShape {
    pub fn new(height: u32, width: u32, channels: u16) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of samples in a full buffer of this shape.
    pub fn sample_count(&self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize
    }

    /// Validate a region request against this shape.
    ///
    /// The region must be non-empty and lie entirely inside the raster.
    pub fn check_region(&self, y0: u32, y1: u32, x0: u32, x1: u32) -> Result<(), RasterError> {
        if y0 < y1 && x0 < x1 && y1 <= self.height && x1 <= self.width {
            Ok(())
        } else {
            Err(RasterError::OutOfBounds {
                y0,
                y1,
                x0,
                x1,
                height: self.height,
                width: self.width,
            })
        }
    }
}

/// A rectangular block of pixels read from a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    width: u32,
    height: u32,
    channels: u16,
    samples: Samples,
}

impl Region {
    /// Wrap a sample buffer, checking that its length matches the dimensions.
    pub fn new(width: u32, height: u32, channels: u16, samples: Samples) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize * channels as usize;
        if samples.len() != expected {
            return Err(RasterError::Decode {
                message: format!(
                    "region buffer holds {} samples, expected {} for {}x{}x{}",
                    samples.len(),
                    expected,
                    height,
                    width,
                    channels
                ),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            samples,
        })
    }

    pub(crate) fn zeros(width: u32, height: u32, channels: u16, sample_type: SampleType) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            samples: Samples::zeros(sample_type, len),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut Samples {
        &mut self.samples
    }

    pub fn into_samples(self) -> Samples {
        self.samples
    }

    /// Whether the pixel at column `x`, row `y` has any positive channel.
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        let channels = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * channels;
        self.samples.any_positive_in(start..start + channels)
    }

    /// Whether any pixel of the region is set.
    pub fn any_set(&self) -> bool {
        self.samples.any_positive_in(0..self.samples.len())
    }
}

// =============================================================================
// Raster Trait
// =============================================================================

/// Format-agnostic read access to a large 2-D raster.
///
/// Implementations must be thread-safe: the extractor reads tiles from
/// several blocking workers at once.
pub trait Raster: Send + Sync {
    /// Identifier for logging (usually the file path).
    fn identifier(&self) -> &str;

    /// Dimensions of the raster.
    fn shape(&self) -> RasterShape;

    /// Element type of the samples.
    fn sample_type(&self) -> SampleType;

    /// Read rows `y0..y1` and columns `x0..x1`.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::OutOfBounds`] if the region is empty or extends
    /// past [`Raster::shape`]; regions are never clamped.
    fn read_region(&self, y0: u32, y1: u32, x0: u32, x1: u32) -> Result<Region, RasterError>;

    /// Read the pixels covered by a tile rectangle.
    fn read_rect(&self, rect: &TileRect) -> Result<Region, RasterError> {
        self.read_region(rect.y0, rect.y1, rect.x0, rect.x1)
    }

    /// Whether the pixel at `row`, `col` has any positive channel.
    fn is_set(&self, row: u32, col: u32) -> Result<bool, RasterError> {
        let region = self.read_region(row, row.saturating_add(1), col, col.saturating_add(1))?;
        Ok(region.is_set(0, 0))
    }
}

// =============================================================================
// Tests
// =============================================================================
