use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::WriteError;

/// Replace `path` with `data`.
///
/// The bytes are written and synced to `{path}.tmp` first, then renamed over
/// the destination, so readers see either the old file or the complete new
/// one. Parent directories are created as needed.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), WriteError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| WriteError::io(parent, e))?;
    }

    let tmp = tmp_path(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(WriteError::io(path, e));
    }
    Ok(())
}

/// Files directly inside `dir` whose extension matches `extension`
/// (case-insensitive), sorted by path.
pub fn list_files(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
