//! Coverage ledger.
//!
//! Records which tile rectangle each patch was cut from, so detections made
//! in patch coordinates can be placed back on the slide.
//!
//! # Document Format
//!
//! The ledger is persisted per slide as an ASAP-style XML annotation document
//! named `{slide_id}_patches.xml`. Each patch contributes a point annotation
//! at its center (`Center_{id}`) and a four-corner rectangle (`Patch_{id}`).
//!
//! ```text
//! <ASAP_Annotations>
//!   <Annotations>
//!     <Annotation Name="Center_0" Type="Dot" ...>
//!     <Annotation Name="Patch_0" Type="Rectangle" ...>
//!       <Coordinates>
//!         <Coordinate Order="0" X="0" Y="0"/>  (top-left, then clockwise)
//!   ...
//! ```

mod annotation;
mod store;

pub use annotation::{parse_document, render_document};
pub use store::{CoverageLedger, LedgerExport};

/// Identifier of a patch within one slide, assigned in emission order.
pub type PatchId = u64;

/// File name of a slide's ledger document.
pub fn document_name(slide_id: &str) -> String {
    format!("{}_patches.xml", slide_id)
}
