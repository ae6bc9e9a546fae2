use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Result, SyncError};

/// Format size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_idx])
    }
}

/// Total size of the regular files under `path` (or of `path` itself)
pub(crate) fn calculate_size(path: &Path) -> Result<u64> {
    let mut total = 0;

    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| SyncError::walk(path, e))?;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|e| SyncError::walk(path, e))?;
            total += metadata.len();
        }
    }

    Ok(total)
}
