//! Detection output documents.
//!
//! One JSON document is written per class plus one for the combined bucket:
//!
//! ```json
//! {
//!     "name": "lymphocytes",
//!     "type": "Multiple points",
//!     "points": [
//!         {
//!             "name": "Point 1",
//!             "point": [110.0, 220.0, 0.25],
//!             "probability": 0.91
//!         }
//!     ],
//!     "version": {
//!         "major": 1,
//!         "minor": 0
//!     }
//! }
//! ```
//!
//! Fields not listed here are kept when a document is read and written back,
//! so unit conversion does not lose information.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{DocumentError, SchemaError};
use crate::io::write_atomic;

use super::types::{DetectionSet, GlobalDetection};

/// Third point component written by default.
pub const DEFAULT_SPACING: f64 = 0.25;

const DOCUMENT_TYPE: &str = "Multiple points";

/// Schema version block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}

/// One point of a detection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub name: String,

    /// `[x, y, spacing]`
    pub point: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A point-set document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionDocument {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub points: Vec<PointRecord>,

    #[serde(default)]
    pub version: SchemaVersion,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DetectionDocument {
    /// Build the document for one bucket of detections.
    ///
    /// Points are numbered from 1 and probabilities rounded to 2 decimals.
    pub fn from_detections(name: &str, detections: &[GlobalDetection], spacing: f64) -> Self {
        let points = detections
            .iter()
            .enumerate()
            .map(|(i, d)| PointRecord {
                name: format!("Point {}", i + 1),
                point: vec![d.x, d.y, spacing],
                probability: Some(round2(d.confidence)),
                extra: Map::new(),
            })
            .collect();

        Self {
            name: name.to_string(),
            kind: DOCUMENT_TYPE.to_string(),
            points,
            version: SchemaVersion::default(),
            extra: Map::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Json(e.to_string()))
    }

    /// Serialize with a 4-space indent.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)
            .map_err(|e| SchemaError::Json(e.to_string()))?;
        String::from_utf8(out).map_err(|e| SchemaError::Json(e.to_string()))
    }

    pub fn read(path: &Path) -> Result<Self, DocumentError> {
        let json = std::fs::read_to_string(path).map_err(|e| DocumentError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_json(&json)?)
    }

    /// Write the document, replacing `path` atomically.
    pub fn write(&self, path: &Path) -> Result<(), DocumentError> {
        let json = self.to_json()?;
        write_atomic(path, json.as_bytes())?;
        Ok(())
    }
}

/// File name of the document for a class: `detected-{class}.json` with
/// underscores replaced by dashes.
pub fn document_file_name(class: &str) -> String {
    format!("detected-{}.json", class.replace('_', "-"))
}

/// Write one document per class and one for the combined bucket into `dir`.
///
/// Returns the written paths, class documents first.
pub fn write_documents(
    set: &DetectionSet,
    dir: &Path,
    spacing: f64,
) -> Result<Vec<PathBuf>, DocumentError> {
    let buckets = set
        .iter()
        .chain(std::iter::once((set.combined_name(), set.combined())));

    let mut written = Vec::new();
    for (class, detections) in buckets {
        let path = dir.join(document_file_name(class));
        DetectionDocument::from_detections(class, detections, spacing).write(&path)?;
        info!("Wrote {} {} point(s) to {}", detections.len(), class, path.display());
        written.push(path);
    }
    Ok(written)
}

/// Two-decimal rounding, ties to even.
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
