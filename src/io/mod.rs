//! Filesystem output.
//!
//! Everything the tiler writes goes through this module:
//!
//! - [`PatchSink`]: destination for encoded patch artifacts
//! - [`write_atomic`]: whole-file replacement through a temporary sibling
//! - [`list_files`]: sorted directory listing filtered by extension

mod fs;
mod sink;

pub use fs::{list_files, write_atomic};
pub use sink::{FsPatchSink, PatchSink};
