//! Chunk-wise TIFF raster.
//!
//! TIFF stores pixels in strips or tiles ("chunks"). A region read decodes
//! only the chunks it overlaps, so a gigapixel mask or slide never has to be
//! materialized. Decoded chunks are kept in a small LRU cache: the planner
//! walks the mask in row-major order and the reprojector probes single pixels,
//! both of which revisit the same chunks many times.
//!
//! Only the first image directory (full resolution) is read. Files must use
//! chunky (interleaved) planar configuration and unsigned 8/16-bit or 32-bit
//! float samples; anything else is rejected when the file is opened.

use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ::tiff::decoder::{Decoder, DecodingResult, Limits};
use ::tiff::tags::Tag;
use ::tiff::ColorType;
use lru::LruCache;
use tracing::debug;

use crate::error::RasterError;

use super::source::{copy_block, Raster, RasterShape, Region, SampleType, Samples};

/// Default number of decoded chunks kept per raster.
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 64;

// TIFF tag values
const PLANAR_CHUNKY: u16 = 1;
const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_IEEEFP: u16 = 3;

/// A decoded strip or tile.
struct DecodedChunk {
    /// Row length of the decoded buffer in pixels (may include padding)
    stride: u32,

    /// Width of valid pixel data
    width: u32,

    /// Height of valid pixel data
    height: u32,

    samples: Samples,
}

struct DecoderState {
    decoder: Decoder<BufReader<File>>,
    cache: LruCache<u32, Arc<DecodedChunk>>,
}

/// TIFF-backed raster with lazy, chunk-granular decoding.
pub struct TiffRaster {
    identifier: String,
    shape: RasterShape,
    sample_type: SampleType,

    /// Nominal chunk size (tile size, or full width x rows-per-strip)
    chunk_width: u32,
    chunk_height: u32,

    /// Number of chunks per chunk row
    chunks_across: u32,

    state: Mutex<DecoderState>,
}

impl TiffRaster {
    /// Open a TIFF file with the default chunk cache.
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        Self::open_with_cache(path, DEFAULT_CHUNK_CACHE_CAPACITY)
    }

    /// Open a TIFF file keeping up to `cache_capacity` decoded chunks.
    pub fn open_with_cache(path: &Path, cache_capacity: usize) -> Result<Self, RasterError> {
        let file = File::open(path).map_err(|e| RasterError::from_io(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| RasterError::unsupported(format!("{}: {}", path.display(), e)))?
            .with_limits(Limits::unlimited());

        let planar = find_u16(&mut decoder, Tag::PlanarConfiguration)?.unwrap_or(PLANAR_CHUNKY);
        let samples_per_pixel = find_u16(&mut decoder, Tag::SamplesPerPixel)?.unwrap_or(1);
        if planar != PLANAR_CHUNKY && samples_per_pixel > 1 {
            return Err(RasterError::unsupported(format!(
                "{}: planar configuration {} is not supported",
                path.display(),
                planar
            )));
        }
        let sample_format = read_sample_format(&mut decoder)?;

        let (width, height) = decoder.dimensions().map_err(decode_error)?;
        let color = decoder.colortype().map_err(decode_error)?;
        let (sample_type, channels) = sample_layout(color, sample_format)?;
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();

        if chunk_width == 0 || chunk_height == 0 {
            return Err(RasterError::unsupported(format!(
                "{} declares an empty chunk size",
                path.display()
            )));
        }

        debug!(
            "Opened TIFF {}: {}x{}x{} {}, chunks {}x{}",
            path.display(),
            height,
            width,
            channels,
            sample_type.name(),
            chunk_width,
            chunk_height
        );

        let capacity = NonZeroUsize::new(cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            identifier: path.display().to_string(),
            shape: RasterShape::new(height, width, channels),
            sample_type,
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            state: Mutex::new(DecoderState {
                decoder,
                cache: LruCache::new(capacity),
            }),
        })
    }

    /// Nominal chunk size as `(width, height)`.
    pub fn chunk_size(&self) -> (u32, u32) {
        (self.chunk_width, self.chunk_height)
    }

    /// Fetch a decoded chunk, decoding it on a cache miss.
    fn chunk(&self, state: &mut DecoderState, index: u32) -> Result<Arc<DecodedChunk>, RasterError> {
        if let Some(chunk) = state.cache.get(&index) {
            return Ok(Arc::clone(chunk));
        }

        let (width, height) = state.decoder.chunk_data_dimensions(index);
        let samples = match state.decoder.read_chunk(index).map_err(decode_error)? {
            DecodingResult::U8(v) => Samples::U8(v),
            DecodingResult::U16(v) => Samples::U16(v),
            DecodingResult::F32(v) => Samples::F32(v),
            _ => return Err(RasterError::unsupported("unsupported TIFF sample format")),
        };

        let channels = self.shape.channels as usize;
        let padded = self.chunk_width as usize * self.chunk_height as usize * channels;
        // Tiles may come back padded to the nominal tile size
        let stride = if samples.len() >= padded {
            self.chunk_width
        } else {
            width
        };

        if samples.len() < stride as usize * height as usize * channels {
            return Err(RasterError::Decode {
                message: format!(
                    "chunk {} of {} decoded to {} samples, expected {}",
                    index,
                    self.identifier,
                    samples.len(),
                    stride as usize * height as usize * channels
                ),
            });
        }

        let chunk = Arc::new(DecodedChunk {
            stride,
            width,
            height,
            samples,
        });
        state.cache.put(index, Arc::clone(&chunk));
        Ok(chunk)
    }
}

impl Raster for TiffRaster {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn shape(&self) -> RasterShape {
        self.shape
    }

    fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    fn read_region(&self, y0: u32, y1: u32, x0: u32, x1: u32) -> Result<Region, RasterError> {
        self.shape.check_region(y0, y1, x0, x1)?;

        let channels = self.shape.channels as usize;
        let (width, height) = (x1 - x0, y1 - y0);
        let mut region = Region::zeros(width, height, self.shape.channels, self.sample_type);
        let dst_row_len = width as usize * channels;

        let mut state = self
            .state
            .lock()
            .map_err(|_| RasterError::Io(format!("{}: decoder lock poisoned", self.identifier)))?;

        for cy in (y0 / self.chunk_height)..=((y1 - 1) / self.chunk_height) {
            for cx in (x0 / self.chunk_width)..=((x1 - 1) / self.chunk_width) {
                let index = cy * self.chunks_across + cx;
                let chunk = self.chunk(&mut state, index)?;

                let origin_y = cy * self.chunk_height;
                let origin_x = cx * self.chunk_width;

                let top = y0.max(origin_y);
                let bottom = y1.min(origin_y + chunk.height);
                let left = x0.max(origin_x);
                let right = x1.min(origin_x + chunk.width);
                if top >= bottom || left >= right {
                    continue;
                }

                let src_offset = ((top - origin_y) as usize * chunk.stride as usize
                    + (left - origin_x) as usize)
                    * channels;
                let dst_offset =
                    ((top - y0) as usize * width as usize + (left - x0) as usize) * channels;

                copy_block(
                    &chunk.samples,
                    chunk.stride as usize * channels,
                    src_offset,
                    region.samples_mut(),
                    dst_row_len,
                    dst_offset,
                    (bottom - top) as usize,
                    (right - left) as usize * channels,
                )?;
            }
        }

        Ok(region)
    }
}

fn decode_error(err: ::tiff::TiffError) -> RasterError {
    RasterError::Decode {
        message: err.to_string(),
    }
}

fn find_u16(decoder: &mut Decoder<BufReader<File>>, tag: Tag) -> Result<Option<u16>, RasterError> {
    decoder.find_tag_unsigned::<u16>(tag).map_err(decode_error)
}

/// The SampleFormat shared by every channel, unsigned if absent.
fn read_sample_format(decoder: &mut Decoder<BufReader<File>>) -> Result<u16, RasterError> {
    let formats = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)
        .map_err(decode_error)?
        .unwrap_or_default();
    match formats.split_first() {
        None => Ok(SAMPLE_FORMAT_UINT),
        Some((&first, rest)) if rest.iter().all(|&f| f == first) => Ok(first),
        Some(_) => Err(RasterError::unsupported(format!(
            "mixed TIFF sample formats {:?}",
            formats
        ))),
    }
}

/// Map a TIFF color type and sample format onto a sample type and channel
/// count.
fn sample_layout(color: ColorType, sample_format: u16) -> Result<(SampleType, u16), RasterError> {
    let (bits, channels) = match color {
        ColorType::Gray(bits) => (bits, 1),
        ColorType::GrayA(bits) => (bits, 2),
        ColorType::RGB(bits) => (bits, 3),
        ColorType::RGBA(bits) => (bits, 4),
        other => {
            return Err(RasterError::unsupported(format!(
                "unsupported TIFF color type {:?}",
                other
            )))
        }
    };
    let sample_type = match (bits, sample_format) {
        (8, SAMPLE_FORMAT_UINT) => SampleType::U8,
        (16, SAMPLE_FORMAT_UINT) => SampleType::U16,
        (32, SAMPLE_FORMAT_IEEEFP) => SampleType::F32,
        _ => {
            return Err(RasterError::unsupported(format!(
                "unsupported TIFF samples: {} bit, sample format {}",
                bits, sample_format
            )))
        }
    };
    Ok((sample_type, channels))
}
