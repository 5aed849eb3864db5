use serde::{Deserialize, Serialize};

use crate::ledger::PatchId;

/// Default detection classes, indexed by the detector's class index.
pub const DEFAULT_CLASSES: [&str; 2] = ["lymphocytes", "monocytes"];

/// Name of the bucket that receives every retained detection.
pub const COMBINED_CLASS: &str = "inflammatory-cells";

/// A detection in patch-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f64,
    pub y: f64,

    /// Index into the configured class list
    #[serde(rename = "class")]
    pub class_index: usize,

    /// Detector confidence in `[0, 1]`
    pub confidence: f64,
}

impl Detection {
    pub fn new(x: f64, y: f64, class_index: usize, confidence: f64) -> Self {
        Self {
            x,
            y,
            class_index,
            confidence,
        }
    }
}

/// A detection placed on the full slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalDetection {
    pub x: f64,
    pub y: f64,
    pub class_index: usize,
    pub confidence: f64,

    /// Patch the detection came from
    pub patch_id: PatchId,
}

/// Retained detections partitioned by class.
///
/// Within a bucket, detections are ordered by ascending patch id and then by
/// detector emission order. The combined bucket holds every detection of
/// every class in the same order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionSet {
    buckets: Vec<(String, Vec<GlobalDetection>)>,
    combined_name: String,
    combined: Vec<GlobalDetection>,
}

impl DetectionSet {
    /// Empty set with one bucket per class.
    pub fn new<S: AsRef<str>>(classes: &[S], combined_name: &str) -> Self {
        Self {
            buckets: classes
                .iter()
                .map(|c| (c.as_ref().to_string(), Vec::new()))
                .collect(),
            combined_name: combined_name.to_string(),
            combined: Vec::new(),
        }
    }

    /// Append a detection to its class bucket and the combined bucket.
    ///
    /// Returns `false` (and stores nothing) if the class index is unknown.
    pub fn push(&mut self, detection: GlobalDetection) -> bool {
        match self.buckets.get_mut(detection.class_index) {
            Some((_, bucket)) => {
                bucket.push(detection);
                self.combined.push(detection);
                true
            }
            None => false,
        }
    }

    /// Detections of one class, by name.
    pub fn get(&self, class: &str) -> Option<&[GlobalDetection]> {
        if class == self.combined_name {
            return Some(&self.combined);
        }
        self.buckets
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, bucket)| bucket.as_slice())
    }

    /// Class buckets in class index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[GlobalDetection])> {
        self.buckets
            .iter()
            .map(|(name, bucket)| (name.as_str(), bucket.as_slice()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|(name, _)| name.as_str())
    }

    pub fn combined(&self) -> &[GlobalDetection] {
        &self.combined
    }

    pub fn combined_name(&self) -> &str {
        &self.combined_name
    }

    /// Number of retained detections.
    pub fn len(&self) -> usize {
        self.combined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }

    /// Apply `f` to every detection in every bucket.
    pub(crate) fn map_points(&self, f: impl Fn(GlobalDetection) -> GlobalDetection) -> Self {
        Self {
            buckets: self
                .buckets
                .iter()
                .map(|(name, bucket)| (name.clone(), bucket.iter().copied().map(&f).collect()))
                .collect(),
            combined_name: self.combined_name.clone(),
            combined: self.combined.iter().copied().map(&f).collect(),
        }
    }
}
