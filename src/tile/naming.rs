//! Deterministic patch artifact names.
//!
//! A patch is named `{prefix}{label}_{patch_id}.{ext}`, where `prefix` is the
//! first few characters of the slide identifier. Names parse back into the
//! stem and the patch id, so detector output keyed by file name can be matched
//! to ledger entries.

use crate::ledger::PatchId;

use super::encoder::PatchFormat;

/// Default label inserted into patch names.
pub const DEFAULT_PATCH_LABEL: &str = "inflammatory-cells";

/// Default number of slide identifier characters kept as the name prefix.
pub const DEFAULT_PREFIX_LEN: usize = 10;

/// Naming scheme for the patches of one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchNaming {
    stem: String,
    prefix_len: usize,
    label: String,
    format: PatchFormat,
}

impl PatchNaming {
    /// Build the scheme from a slide identifier.
    pub fn new(slide_id: &str, prefix_len: usize, label: &str, format: PatchFormat) -> Self {
        let prefix: String = slide_id.chars().take(prefix_len).collect();
        Self {
            stem: format!("{}{}", prefix, label),
            prefix_len,
            label: label.to_string(),
            format,
        }
    }

    /// The same scheme applied to another slide.
    pub fn for_slide(&self, slide_id: &str) -> Self {
        Self::new(slide_id, self.prefix_len, &self.label, self.format)
    }

    /// Shared part of every name, before the `_{patch_id}` suffix.
    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn format(&self) -> PatchFormat {
        self.format
    }

    /// File name of a patch.
    pub fn name(&self, patch_id: PatchId) -> String {
        format!("{}_{}.{}", self.stem, patch_id, self.format.extension())
    }
}

/// Split a patch file name into its stem and patch id.
///
/// Accepts names with or without an extension. Returns `None` if the name has
/// no numeric `_{patch_id}` suffix.
pub fn parse_patch_name(name: &str) -> Option<(&str, PatchId)> {
    let base = match name.rsplit_once('.') {
        Some((base, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            base
        }
        _ => name,
    };
    let (stem, id) = base.rsplit_once('_')?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((stem, id.parse().ok()?))
}
