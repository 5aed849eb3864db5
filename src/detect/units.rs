//! Pixel to physical unit conversion.
//!
//! Coordinates are multiplied by a fixed factor. The default converts pixels
//! at 0.24 µm per pixel to millimetres. Only `x` and `y` are scaled; any
//! further point component (such as the spacing) passes through unchanged.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{DocumentError, SchemaError};
use crate::io::list_files;

use super::document::DetectionDocument;
use super::types::{DetectionSet, GlobalDetection};

/// Millimetres per pixel at 0.24 µm per pixel.
pub const DEFAULT_PIXEL_TO_MM: f64 = 0.00024;

/// Linear coordinate rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    factor: f64,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self {
            factor: DEFAULT_PIXEL_TO_MM,
        }
    }
}

impl UnitConverter {
    /// Converter multiplying by `factor`, which must be finite and positive.
    pub fn new(factor: f64) -> Result<Self, SchemaError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SchemaError::invalid(
                "factor",
                format!("must be finite and positive, got {}", factor),
            ));
        }
        Ok(Self { factor })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Converter undoing this one.
    pub fn inverse(&self) -> Self {
        Self {
            factor: 1.0 / self.factor,
        }
    }

    /// Scale the first two components of a point.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingCoordinates`] if the point has fewer than
    /// two components.
    pub fn convert_point(&self, name: &str, point: &[f64]) -> Result<Vec<f64>, SchemaError> {
        if point.len() < 2 {
            return Err(SchemaError::MissingCoordinates {
                point: name.to_string(),
                found: point.len(),
            });
        }
        let mut converted = point.to_vec();
        converted[0] *= self.factor;
        converted[1] *= self.factor;
        Ok(converted)
    }

    /// Scale every detection of an in-memory set.
    pub fn convert_set(&self, set: &DetectionSet) -> DetectionSet {
        set.map_points(|d| GlobalDetection {
            x: d.x * self.factor,
            y: d.y * self.factor,
            ..d
        })
    }

    /// Scale every point of a document in place.
    ///
    /// The document is left unchanged if any point is malformed.
    pub fn convert_document(&self, doc: &mut DetectionDocument) -> Result<(), SchemaError> {
        let converted = doc
            .points
            .iter()
            .map(|p| self.convert_point(&p.name, &p.point))
            .collect::<Result<Vec<_>, _>>()?;

        for (record, point) in doc.points.iter_mut().zip(converted) {
            record.point = point;
        }
        Ok(())
    }

    /// Convert the document at `input` and write it to `output`.
    ///
    /// `input` and `output` may be the same path.
    pub fn convert_file(&self, input: &Path, output: &Path) -> Result<(), DocumentError> {
        let mut doc = DetectionDocument::read(input)?;
        self.convert_document(&mut doc)?;
        doc.write(output)?;
        info!(
            "Converted {} point(s) from {} to {}",
            doc.points.len(),
            input.display(),
            output.display()
        );
        Ok(())
    }

    /// Convert every `.json` document directly inside `input_dir` into
    /// `output_dir`, keeping file names.
    ///
    /// Stops at the first document that fails; documents already converted
    /// stay written.
    pub fn convert_dir(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, DocumentError> {
        let inputs = list_files(input_dir, "json").map_err(|e| DocumentError::Read {
            path: input_dir.display().to_string(),
            message: e.to_string(),
        })?;

        let mut written = Vec::with_capacity(inputs.len());
        for input in inputs {
            let Some(name) = input.file_name() else {
                continue;
            };
            let output = output_dir.join(name);
            self.convert_file(&input, &output)?;
            written.push(output);
        }
        Ok(written)
    }
}
