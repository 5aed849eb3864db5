//! Mask-driven tile planning.
//!
//! The planner walks a mask raster in row-major chunks and emits every
//! stride-aligned tile that covers at least one positive mask pixel.
//!
//! # Algorithm
//!
//! ```text
//! for each chunk (row-major, chunk_size x chunk_size):
//!     read chunk; skip if no pixel is set
//!     for each set pixel (y, x), row-major:
//!         origin = (floor(y / stride) * stride, floor(x / stride) * stride)
//!         skip if origin already seen
//!         emit tile at origin unless the edge policy rejects it
//! ```
//!
//! Peak memory is one chunk region plus the set of seen origins, no matter how
//! large the slide is. Emission order is fully determined by the mask and the
//! chunk size, which makes patch ids reproducible.
//!
//! # Edge Policy
//!
//! A tile whose bottom-right corner exceeds the bounds is dropped by default,
//! because downstream reprojection assumes full-size tiles. [`EdgePolicy::Clip`]
//! keeps such tiles, clipped to the bounds.

use std::collections::HashSet;

use clap::ValueEnum;
use tracing::{debug, info};

use crate::error::{RasterError, TileError};
use crate::raster::Raster;

use super::rect::TileRect;

/// Default patch edge length in pixels.
pub const DEFAULT_PATCH_SIZE: u32 = 1024;

// =============================================================================
// Configuration
// =============================================================================

/// What to do with tiles that would extend past the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EdgePolicy {
    /// Discard the tile entirely
    #[default]
    Drop,

    /// Emit the tile clipped to the bounds
    Clip,
}

/// Tiling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Edge length of a square patch in pixels
    pub patch_size: u32,

    /// Grid spacing between tile origins (equal to `patch_size` for no overlap)
    pub stride: u32,

    /// Edge length of the square chunks the mask is scanned in
    pub chunk_size: u32,

    /// Handling of tiles overflowing the bounds
    pub edge_policy: EdgePolicy,
}

impl PlannerConfig {
    /// Non-overlapping tiles of `patch_size`, scanned one grid cell at a time.
    pub fn new(patch_size: u32) -> Self {
        Self {
            patch_size,
            stride: patch_size,
            chunk_size: patch_size,
            edge_policy: EdgePolicy::Drop,
        }
    }

    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_edge_policy(mut self, edge_policy: EdgePolicy) -> Self {
        self.edge_policy = edge_policy;
        self
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<(), TileError> {
        let invalid = |message: &str| {
            Err(TileError::InvalidConfig {
                message: message.to_string(),
            })
        };

        if self.patch_size == 0 {
            return invalid("patch_size must be greater than 0");
        }
        if self.stride == 0 {
            return invalid("stride must be greater than 0");
        }
        if self.stride > self.patch_size {
            return invalid("stride must not exceed patch_size");
        }
        if self.chunk_size < self.stride {
            return invalid("chunk_size must be at least stride");
        }
        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PATCH_SIZE)
    }
}

// =============================================================================
// Tile Planner
// =============================================================================

/// Plans the deduplicated set of tiles covering a mask.
#[derive(Debug, Clone)]
pub struct TilePlanner {
    config: PlannerConfig,
}

impl TilePlanner {
    /// Create a planner, validating the configuration.
    pub fn new(config: PlannerConfig) -> Result<Self, TileError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan tiles bounded by the mask's own extent.
    pub fn plan(&self, mask: &dyn Raster) -> Result<Vec<TileRect>, RasterError> {
        let shape = mask.shape();
        self.plan_within(mask, shape.width, shape.height)
    }

    /// Plan tiles bounded by the intersection of the mask extent and
    /// `width` x `height` (normally the image extent).
    pub fn plan_within(
        &self,
        mask: &dyn Raster,
        width: u32,
        height: u32,
    ) -> Result<Vec<TileRect>, RasterError> {
        let shape = mask.shape();
        let bound_w = shape.width.min(width);
        let bound_h = shape.height.min(height);
        let stride = self.config.stride;
        let chunk = self.config.chunk_size;

        let mut seen: HashSet<(u32, u32)> = HashSet::new();
        let mut tiles = Vec::new();
        let mut chunks_scanned = 0usize;
        let mut chunks_set = 0usize;

        for cy in (0..shape.height).step_by(chunk as usize) {
            let cy1 = cy.saturating_add(chunk).min(shape.height);
            for cx in (0..shape.width).step_by(chunk as usize) {
                let cx1 = cx.saturating_add(chunk).min(shape.width);
                chunks_scanned += 1;

                let region = mask.read_region(cy, cy1, cx, cx1)?;
                if !region.any_set() {
                    continue;
                }
                chunks_set += 1;

                for ly in 0..region.height() {
                    let y = cy + ly;
                    let origin_y = y / stride * stride;
                    let mut last_origin_x = None;

                    for lx in 0..region.width() {
                        if !region.is_set(lx, ly) {
                            continue;
                        }
                        let origin_x = (cx + lx) / stride * stride;
                        if last_origin_x == Some(origin_x) {
                            continue;
                        }
                        last_origin_x = Some(origin_x);

                        if !seen.insert((origin_y, origin_x)) {
                            continue;
                        }
                        if let Some(rect) = self.fit(origin_x, origin_y, bound_w, bound_h) {
                            tiles.push(rect);
                        } else {
                            debug!(
                                "Discarding edge tile at ({}, {}) for {}",
                                origin_x,
                                origin_y,
                                mask.identifier()
                            );
                        }
                    }
                }
            }
        }

        info!(
            "Planned {} tile(s) from {} ({} of {} chunk(s) contained mask pixels)",
            tiles.len(),
            mask.identifier(),
            chunks_set,
            chunks_scanned
        );

        Ok(tiles)
    }

    /// Build the tile at an origin, applying the edge policy.
    fn fit(&self, x: u32, y: u32, bound_w: u32, bound_h: u32) -> Option<TileRect> {
        let size = self.config.patch_size;
        let x1 = x.checked_add(size);
        let y1 = y.checked_add(size);

        match (x1, y1) {
            (Some(x1), Some(y1)) if x1 <= bound_w && y1 <= bound_h => {
                Some(TileRect::new(x, y, x1, y1))
            }
            _ => match self.config.edge_policy {
                EdgePolicy::Drop => None,
                EdgePolicy::Clip if x < bound_w && y < bound_h => Some(TileRect::new(
                    x,
                    y,
                    x1.map_or(bound_w, |v| v.min(bound_w)),
                    y1.map_or(bound_h, |v| v.min(bound_h)),
                )),
                EdgePolicy::Clip => None,
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
