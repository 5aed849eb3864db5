//! In-process coverage ledger.
//!
//! The ledger maps `(slide_id, patch_id)` to the tile rectangle the patch was
//! cut from, and keeps the reverse index from rectangle to patch id so a
//! rectangle can never be recorded twice for the same slide.
//!
//! # Thread Safety
//!
//! All state sits behind one `RwLock`. `record` takes the write lock for the
//! whole insertion, so readers never observe an entry in only one of the two
//! indexes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::io::write_atomic;
use crate::tile::TileRect;

use super::annotation::{parse_document, render_document};
use super::PatchId;

/// Entries for one slide.
#[derive(Debug, Default, Clone)]
struct SlideEntries {
    by_patch: BTreeMap<PatchId, TileRect>,
    by_rect: HashMap<TileRect, PatchId>,
}

/// Result of writing an annotation document to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerExport {
    /// Where the document was written
    pub path: PathBuf,

    /// Number of patches in the document
    pub patches: usize,

    /// Hex-encoded SHA-256 of the document bytes
    pub sha256: String,
}

/// Bidirectional index of patch ids and tile rectangles, per slide.
///
/// # Example
///
/// ```
/// use wsi_tiler::ledger::CoverageLedger;
/// use wsi_tiler::tile::TileRect;
///
/// let ledger = CoverageLedger::new();
/// ledger.record("slide", 0, TileRect::new(0, 0, 1024, 1024)).unwrap();
///
/// assert_eq!(
///     ledger.lookup_by_patch("slide", 0).unwrap(),
///     TileRect::new(0, 0, 1024, 1024)
/// );
/// let doc = ledger.export("slide");
/// assert!(doc.contains("Patch_0"));
/// ```
#[derive(Debug, Default)]
pub struct CoverageLedger {
    slides: RwLock<HashMap<String, SlideEntries>>,
}

impl CoverageLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `patch_id` of `slide_id` covers `rect`.
    ///
    /// # Errors
    ///
    /// Fails if the patch id or the rectangle is already recorded for the
    /// slide; the ledger is left unchanged.
    pub fn record(&self, slide_id: &str, patch_id: PatchId, rect: TileRect) -> Result<(), LedgerError> {
        let mut slides = self.slides.write().unwrap_or_else(PoisonError::into_inner);
        let entries = slides.entry(slide_id.to_string()).or_default();

        if entries.by_patch.contains_key(&patch_id) {
            return Err(LedgerError::DuplicatePatch {
                slide_id: slide_id.to_string(),
                patch_id,
            });
        }
        if let Some(&existing) = entries.by_rect.get(&rect) {
            return Err(LedgerError::DuplicateRect {
                slide_id: slide_id.to_string(),
                rect: rect.to_string(),
                existing,
            });
        }

        entries.by_patch.insert(patch_id, rect);
        entries.by_rect.insert(rect, patch_id);
        debug!("Recorded patch {} of {} at {}", patch_id, slide_id, rect);
        Ok(())
    }

    /// Rectangle recorded for a patch.
    pub fn lookup_by_patch(&self, slide_id: &str, patch_id: PatchId) -> Result<TileRect, LedgerError> {
        let slides = self.slides.read().unwrap_or_else(PoisonError::into_inner);
        slides
            .get(slide_id)
            .and_then(|entries| entries.by_patch.get(&patch_id).copied())
            .ok_or_else(|| LedgerError::MissingEntry {
                slide_id: slide_id.to_string(),
                patch_id,
            })
    }

    /// Patch id recorded for a rectangle.
    pub fn lookup_by_rect(&self, slide_id: &str, rect: &TileRect) -> Option<PatchId> {
        let slides = self.slides.read().unwrap_or_else(PoisonError::into_inner);
        slides
            .get(slide_id)
            .and_then(|entries| entries.by_rect.get(rect).copied())
    }

    /// Snapshot of a slide's entries in ascending patch id order.
    pub fn entries(&self, slide_id: &str) -> Vec<(PatchId, TileRect)> {
        let slides = self.slides.read().unwrap_or_else(PoisonError::into_inner);
        slides
            .get(slide_id)
            .map(|entries| entries.by_patch.iter().map(|(&id, &rect)| (id, rect)).collect())
            .unwrap_or_default()
    }

    /// Number of entries recorded for a slide.
    pub fn len(&self, slide_id: &str) -> usize {
        let slides = self.slides.read().unwrap_or_else(PoisonError::into_inner);
        slides.get(slide_id).map_or(0, |entries| entries.by_patch.len())
    }

    /// Whether no entries are recorded for any slide.
    pub fn is_empty(&self) -> bool {
        let slides = self.slides.read().unwrap_or_else(PoisonError::into_inner);
        slides.values().all(|entries| entries.by_patch.is_empty())
    }

    /// Slide identifiers with at least one entry, sorted.
    pub fn slides(&self) -> Vec<String> {
        let slides = self.slides.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = slides
            .iter()
            .filter(|(_, entries)| !entries.by_patch.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Render a slide's annotation document.
    ///
    /// Works on a snapshot taken under the read lock, so the document is
    /// consistent even while other threads record entries.
    pub fn export(&self, slide_id: &str) -> String {
        render_document(&self.entries(slide_id))
    }

    /// Write a slide's annotation document to `path`.
    ///
    /// The document is rendered completely before anything touches the disk
    /// and is moved into place with a rename, so `path` either holds the
    /// previous content or the full new document.
    pub fn export_to_path(&self, slide_id: &str, path: &Path) -> Result<LedgerExport, LedgerError> {
        let entries = self.entries(slide_id);
        let doc = render_document(&entries);
        write_atomic(path, doc.as_bytes())?;

        let sha256 = hex::encode(Sha256::digest(doc.as_bytes()));
        info!(
            "Exported {} ledger entr{} for {} to {} (sha256 {})",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            slide_id,
            path.display(),
            sha256
        );

        Ok(LedgerExport {
            path: path.to_path_buf(),
            patches: entries.len(),
            sha256,
        })
    }

    /// Rebuild a ledger for `slide_id` from an annotation document.
    pub fn from_document(slide_id: &str, doc: &str) -> Result<Self, LedgerError> {
        let ledger = Self::new();
        for (patch_id, rect) in parse_document(doc)? {
            ledger.record(slide_id, patch_id, rect)?;
        }
        Ok(ledger)
    }

    /// Load an annotation document from disk.
    pub fn load(slide_id: &str, path: &Path) -> Result<Self, LedgerError> {
        let doc = std::fs::read_to_string(path).map_err(|e| LedgerError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let ledger = Self::from_document(slide_id, &doc)?;
        info!(
            "Loaded {} ledger entries for {} from {}",
            ledger.len(slide_id),
            slide_id,
            path.display()
        );
        Ok(ledger)
    }
}

// =============================================================================
// Tests
// =============================================================================
