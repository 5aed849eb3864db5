//! Patch encoder.
//!
//! Converts a region read from the slide into an encoded image file.
//!
//! # Design Decisions
//!
//! - **Lossless output**: patches are written as PNG (default) or TIFF so the
//!   detector sees exactly the slide pixels.
//!
//! - **Native depth**: 8-bit and 16-bit samples are kept as they are; PNG
//!   cannot hold float samples, so float regions must be written as TIFF.

use std::io::Cursor;

use bytes::Bytes;
use clap::ValueEnum;
use image::{DynamicImage, ImageBuffer, ImageFormat};

use crate::error::WriteError;
use crate::raster::{Region, Samples};

/// Container format of patch artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PatchFormat {
    #[default]
    Png,
    Tiff,
}

impl PatchFormat {
    /// File extension, without the dot.
    pub const fn extension(&self) -> &'static str {
        match self {
            PatchFormat::Png => "png",
            PatchFormat::Tiff => "tif",
        }
    }

    const fn image_format(&self) -> ImageFormat {
        match self {
            PatchFormat::Png => ImageFormat::Png,
            PatchFormat::Tiff => ImageFormat::Tiff,
        }
    }
}

// =============================================================================
// Patch Encoder
// =============================================================================

/// Encodes patch regions into image files.
///
/// # Example
///
/// ```
/// use wsi_tiler::raster::{MemoryRaster, Raster};
/// use wsi_tiler::tile::{PatchEncoder, PatchFormat};
///
/// let raster = MemoryRaster::from_gray("mask", 4, 4, vec![255; 16]).unwrap();
/// let region = raster.read_region(0, 2, 0, 2).unwrap();
///
/// let encoder = PatchEncoder::new(PatchFormat::Png);
/// let png = encoder.encode(&region).unwrap();
/// assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchEncoder {
    format: PatchFormat,
}

impl PatchEncoder {
    pub fn new(format: PatchFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> PatchFormat {
        self.format
    }

    /// Encode a region.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Encode`] if the channel layout has no image
    /// equivalent or the encoder rejects the pixels.
    pub fn encode(&self, region: &Region) -> Result<Bytes, WriteError> {
        let img = to_dynamic_image(region)?;

        let mut output = Cursor::new(Vec::new());
        img.write_to(&mut output, self.format.image_format())
            .map_err(|e| WriteError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output.into_inner()))
    }
}

/// Wrap region samples in the matching `DynamicImage` variant.
fn to_dynamic_image(region: &Region) -> Result<DynamicImage, WriteError> {
    let (w, h) = (region.width(), region.height());
    let layout_error = || WriteError::Encode {
        message: format!(
            "cannot encode {}-channel {} region",
            region.channels(),
            region.samples().sample_type().name()
        ),
    };
    let size_error = || WriteError::Encode {
        message: "region buffer does not match its dimensions".to_string(),
    };

    macro_rules! buffer {
        ($v:expr) => {
            ImageBuffer::from_raw(w, h, $v).ok_or_else(size_error)?
        };
    }

    let img = match (region.samples().clone(), region.channels()) {
        (Samples::U8(v), 1) => DynamicImage::ImageLuma8(buffer!(v)),
        (Samples::U8(v), 2) => DynamicImage::ImageLumaA8(buffer!(v)),
        (Samples::U8(v), 3) => DynamicImage::ImageRgb8(buffer!(v)),
        (Samples::U8(v), 4) => DynamicImage::ImageRgba8(buffer!(v)),
        (Samples::U16(v), 1) => DynamicImage::ImageLuma16(buffer!(v)),
        (Samples::U16(v), 2) => DynamicImage::ImageLumaA16(buffer!(v)),
        (Samples::U16(v), 3) => DynamicImage::ImageRgb16(buffer!(v)),
        (Samples::U16(v), 4) => DynamicImage::ImageRgba16(buffer!(v)),
        (Samples::F32(v), 3) => DynamicImage::ImageRgb32F(buffer!(v)),
        (Samples::F32(v), 4) => DynamicImage::ImageRgba32F(buffer!(v)),
        _ => return Err(layout_error()),
    };
    Ok(img)
}
