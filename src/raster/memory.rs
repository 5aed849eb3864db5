//! Fully materialized rasters.
//!
//! Formats without native chunking (PNG, JPEG) are decoded once into a
//! [`MemoryRaster`]. Callers still go through [`Raster::read_region`], so
//! swapping in a chunked backend later needs no change on their side.

use std::path::Path;

use image::{DynamicImage, ImageReader};
use tracing::debug;

use crate::error::RasterError;

use super::source::{copy_block, Raster, RasterShape, Region, SampleType, Samples};

/// A raster whose samples live entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    identifier: String,
    shape: RasterShape,
    samples: Samples,
}

impl MemoryRaster {
    /// Wrap an interleaved, row-major sample buffer.
    pub fn new(
        identifier: impl Into<String>,
        width: u32,
        height: u32,
        channels: u16,
        samples: Samples,
    ) -> Result<Self, RasterError> {
        if channels == 0 {
            return Err(RasterError::unsupported("raster has zero channels"));
        }
        let shape = RasterShape::new(height, width, channels);
        if samples.len() != shape.sample_count() {
            return Err(RasterError::Decode {
                message: format!(
                    "buffer holds {} samples, expected {} for {}x{}x{}",
                    samples.len(),
                    shape.sample_count(),
                    height,
                    width,
                    channels
                ),
            });
        }
        Ok(Self {
            identifier: identifier.into(),
            shape,
            samples,
        })
    }

    /// Single-channel 8-bit raster, the common mask layout.
    pub fn from_gray(
        identifier: impl Into<String>,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<Self, RasterError> {
        Self::new(identifier, width, height, 1, Samples::U8(data))
    }

    /// Convert a decoded image, keeping its channel count and bit depth.
    pub fn from_image(identifier: impl Into<String>, img: DynamicImage) -> Result<Self, RasterError> {
        let (width, height) = (img.width(), img.height());
        let (channels, samples) = match img {
            DynamicImage::ImageLuma8(buf) => (1, Samples::U8(buf.into_raw())),
            DynamicImage::ImageLumaA8(buf) => (2, Samples::U8(buf.into_raw())),
            DynamicImage::ImageRgb8(buf) => (3, Samples::U8(buf.into_raw())),
            DynamicImage::ImageRgba8(buf) => (4, Samples::U8(buf.into_raw())),
            DynamicImage::ImageLuma16(buf) => (1, Samples::U16(buf.into_raw())),
            DynamicImage::ImageLumaA16(buf) => (2, Samples::U16(buf.into_raw())),
            DynamicImage::ImageRgb16(buf) => (3, Samples::U16(buf.into_raw())),
            DynamicImage::ImageRgba16(buf) => (4, Samples::U16(buf.into_raw())),
            DynamicImage::ImageRgb32F(buf) => (3, Samples::F32(buf.into_raw())),
            DynamicImage::ImageRgba32F(buf) => (4, Samples::F32(buf.into_raw())),
            other => (3, Samples::U8(other.into_rgb8().into_raw())),
        };
        Self::new(identifier, width, height, channels, samples)
    }

    /// Decode an image file completely.
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let reader = ImageReader::open(path)
            .map_err(|e| RasterError::from_io(path, e))?
            .with_guessed_format()
            .map_err(|e| RasterError::from_io(path, e))?;

        if reader.format().is_none() {
            return Err(RasterError::unsupported(format!(
                "cannot determine image format of {}",
                path.display()
            )));
        }

        let img = reader.decode().map_err(|e| match e {
            image::ImageError::Unsupported(u) => RasterError::unsupported(u.to_string()),
            other => RasterError::Decode {
                message: other.to_string(),
            },
        })?;

        debug!(
            "Decoded {} fully: {}x{}",
            path.display(),
            img.width(),
            img.height()
        );

        Self::from_image(path.display().to_string(), img)
    }
}

impl Raster for MemoryRaster {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn shape(&self) -> RasterShape {
        self.shape
    }

    fn sample_type(&self) -> SampleType {
        self.samples.sample_type()
    }

    fn read_region(&self, y0: u32, y1: u32, x0: u32, x1: u32) -> Result<Region, RasterError> {
        self.shape.check_region(y0, y1, x0, x1)?;

        let channels = self.shape.channels as usize;
        let (width, height) = (x1 - x0, y1 - y0);
        let mut region = Region::zeros(width, height, self.shape.channels, self.sample_type());

        let src_row_len = self.shape.width as usize * channels;
        let src_offset = (y0 as usize * self.shape.width as usize + x0 as usize) * channels;
        let dst_row_len = width as usize * channels;

        copy_block(
            &self.samples,
            src_row_len,
            src_offset,
            region.samples_mut(),
            dst_row_len,
            0,
            height as usize,
            dst_row_len,
        )?;

        Ok(region)
    }
}
