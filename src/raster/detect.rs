//! Format detection for raster files.
//!
//! Formats are recognized from their magic bytes, never from the file
//! extension:
//!
//! - **TIFF / BigTIFF**: decoded chunk by chunk
//! - **PNG / JPEG**: decoded fully into memory
//!
//! Anything else is rejected with [`RasterError::UnsupportedFormat`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::RasterError;

/// Number of header bytes examined during detection.
const SNIFF_BYTES: usize = 8;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

// =============================================================================
// RasterFormat
// =============================================================================

/// Detected raster container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// Classic TIFF (version 42)
    Tiff,

    /// BigTIFF (version 43)
    BigTiff,

    /// Portable Network Graphics
    Png,

    /// JPEG / JFIF
    Jpeg,
}

impl RasterFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            RasterFormat::Tiff => "TIFF",
            RasterFormat::BigTiff => "BigTIFF",
            RasterFormat::Png => "PNG",
            RasterFormat::Jpeg => "JPEG",
        }
    }

    /// Whether the format is read chunk by chunk rather than fully decoded.
    pub const fn is_chunked(&self) -> bool {
        matches!(self, RasterFormat::Tiff | RasterFormat::BigTiff)
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Check whether bytes start with a TIFF or BigTIFF header.
///
/// Accepts both byte orders (`II` and `MM`).
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    tiff_version(bytes).is_some()
}

fn tiff_version(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < 4 {
        return None;
    }
    let version = match &bytes[0..2] {
        b"II" => u16::from_le_bytes([bytes[2], bytes[3]]),
        b"MM" => u16::from_be_bytes([bytes[2], bytes[3]]),
        _ => return None,
    };
    matches!(version, 42 | 43).then_some(version)
}

/// Detect the format from the first bytes of a file.
pub fn detect_format(header: &[u8]) -> Result<RasterFormat, RasterError> {
    if let Some(version) = tiff_version(header) {
        return Ok(if version == 43 {
            RasterFormat::BigTiff
        } else {
            RasterFormat::Tiff
        });
    }
    if header.starts_with(PNG_MAGIC) {
        return Ok(RasterFormat::Png);
    }
    if header.starts_with(JPEG_MAGIC) {
        return Ok(RasterFormat::Jpeg);
    }
    Err(RasterError::unsupported(
        "unrecognized file signature (expected TIFF, BigTIFF, PNG or JPEG)",
    ))
}

/// Detect the format of a file on disk.
pub fn detect_path(path: &Path) -> Result<RasterFormat, RasterError> {
    let file = File::open(path).map_err(|e| RasterError::from_io(path, e))?;
    let mut header = Vec::with_capacity(SNIFF_BYTES);
    file.take(SNIFF_BYTES as u64)
        .read_to_end(&mut header)
        .map_err(|e| RasterError::from_io(path, e))?;

    detect_format(&header).map_err(|_| {
        RasterError::unsupported(format!("{} is not a TIFF, PNG or JPEG file", path.display()))
    })
}
