//! Detector boundary.
//!
//! The object detector is an external collaborator: the pipeline only needs
//! `infer(patch) -> detections`. [`PrecomputedDetector`] serves detections
//! produced offline, keyed by patch artifact name.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{DetectorError, SchemaError};
use crate::ledger::PatchId;
use crate::tile::{parse_patch_name, PatchArtifact};

use super::types::Detection;

/// Object detector run on one patch at a time.
///
/// Implementations must be thread-safe; several patches are inferred
/// concurrently.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detections in patch-local pixel coordinates, in emission order.
    async fn infer(&self, patch: &PatchArtifact) -> Result<Vec<Detection>, DetectorError>;
}

// =============================================================================
// Precomputed Detections
// =============================================================================

/// Detections loaded from a JSON object mapping patch name to detections.
///
/// ```json
/// {
///     "A_P000002_inflammatory-cells_0.png": [
///         {"x": 10.0, "y": 20.0, "class": 0, "confidence": 0.91}
///     ]
/// }
/// ```
///
/// Keys may omit the file extension. A patch without an entry has no
/// detections.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedDetector {
    by_name: HashMap<String, Vec<Detection>>,
}

impl PrecomputedDetector {
    pub fn new(by_name: HashMap<String, Vec<Detection>>) -> Self {
        Self { by_name }
    }

    /// Parse the JSON document.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let by_name: HashMap<String, Vec<Detection>> =
            serde_json::from_str(json).map_err(|e| SchemaError::Json(e.to_string()))?;
        Ok(Self { by_name })
    }

    /// Load the JSON document from disk.
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        let json = std::fs::read_to_string(path).map_err(|e| DetectorError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let detector = Self::from_json(&json)?;
        info!(
            "Loaded detections for {} patch(es) from {}",
            detector.by_name.len(),
            path.display()
        );
        Ok(detector)
    }

    /// Number of patches with an entry.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&Vec<Detection>> {
        self.by_name.get(name).or_else(|| {
            let (stem, _) = name.rsplit_once('.')?;
            self.by_name.get(stem)
        })
    }

    /// Regroup the detections by patch id, keeping only names with the given
    /// stem (`{prefix}{label}`).
    ///
    /// Names that do not carry a patch id or belong to another stem are
    /// returned separately so callers can report them.
    pub fn into_patch_map(self, stem: &str) -> (BTreeMap<PatchId, Vec<Detection>>, Vec<String>) {
        let mut by_patch = BTreeMap::new();
        let mut unmatched = Vec::new();

        for (name, detections) in self.by_name {
            match parse_patch_name(&name) {
                Some((s, patch_id)) if s == stem => {
                    by_patch.insert(patch_id, detections);
                }
                _ => unmatched.push(name),
            }
        }
        unmatched.sort();
        (by_patch, unmatched)
    }
}

#[async_trait]
impl Detector for PrecomputedDetector {
    async fn infer(&self, patch: &PatchArtifact) -> Result<Vec<Detection>, DetectorError> {
        Ok(self.lookup(&patch.name).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Detector output for a batch of patches.
#[derive(Debug, Clone, Default)]
pub struct CollectedDetections {
    /// Detections keyed by patch id
    pub by_patch: BTreeMap<PatchId, Vec<Detection>>,

    /// Patches the detector failed on
    pub failures: Vec<(PatchId, DetectorError)>,
}

/// Run `detector` over `patches` with at most `concurrency` calls in flight.
///
/// A detector failure only loses the detections of that patch.
pub async fn collect_detections(
    detector: Arc<dyn Detector>,
    patches: &[PatchArtifact],
    concurrency: usize,
) -> CollectedDetections {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for patch in patches {
        let detector = Arc::clone(&detector);
        let semaphore = Arc::clone(&semaphore);
        let patch = patch.clone();

        set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => detector.infer(&patch).await,
                Err(e) => Err(DetectorError::Inference {
                    patch: patch.name.clone(),
                    message: e.to_string(),
                }),
            };
            (patch.patch_id, result)
        });
    }

    let mut collected = CollectedDetections::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((patch_id, Ok(detections))) => {
                debug!("Patch {}: {} detection(s)", patch_id, detections.len());
                collected.by_patch.insert(patch_id, detections);
            }
            Ok((patch_id, Err(e))) => {
                warn!("Detector failed on patch {}: {}", patch_id, e);
                collected.failures.push((patch_id, e));
            }
            Err(e) => warn!("Detector task failed: {}", e),
        }
    }
    collected.failures.sort_by_key(|(id, _)| *id);

    info!(
        "Collected detections for {} patch(es), {} failure(s)",
        collected.by_patch.len(),
        collected.failures.len()
    );
    collected
}
