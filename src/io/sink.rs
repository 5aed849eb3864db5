use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::WriteError;

use super::fs::write_atomic;

/// Destination for encoded patch artifacts.
///
/// Extraction workers call `write` from blocking threads, so implementations
/// must be thread-safe. A failed write only affects the patch being written.
pub trait PatchSink: Send + Sync {
    /// Store `data` under `name` and return where it ended up.
    fn write(&self, name: &str, data: Bytes) -> Result<PathBuf, WriteError>;

    /// Human-readable location for logging.
    fn location(&self) -> String;
}

/// Writes patches as files into one directory.
#[derive(Debug, Clone)]
pub struct FsPatchSink {
    dir: PathBuf,
}

impl FsPatchSink {
    /// Use `dir` as the patch directory, creating it if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, WriteError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| WriteError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PatchSink for FsPatchSink {
    fn write(&self, name: &str, data: Bytes) -> Result<PathBuf, WriteError> {
        let path = self.dir.join(name);
        write_atomic(&path, &data)?;
        Ok(path)
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}
