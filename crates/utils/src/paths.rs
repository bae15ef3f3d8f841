//! Path resolution and file metadata helpers

use bcache_core::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Resolve a path to an absolute, canonical form. Falls back to joining
/// with the current working directory when the path does not exist yet.
pub fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Resolve the executable named by the first argv token. Tokens without a
/// path separator are searched for in PATH; the token itself is returned
/// when no match is found.
pub fn resolve_exe(arg0: &str) -> PathBuf {
    let candidate = Path::new(arg0);
    if arg0.contains(std::path::MAIN_SEPARATOR) {
        return resolve_path(candidate);
    }

    if let Ok(path_var) = env::var("PATH") {
        for dir in env::split_paths(&path_var) {
            let full = dir.join(arg0);
            if full.is_file() {
                return resolve_path(&full);
            }
        }
    }

    PathBuf::from(arg0)
}

/// Size and modification time of a file, used to key the program-ID cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub mtime_ms: u128,
}

/// Read the stamp of a file
pub fn file_stamp(path: &Path) -> Result<FileStamp> {
    let metadata = fs::metadata(path)
        .map_err(|e| Error::file_system(path.to_path_buf(), "read metadata", e))?;
    let mtime_ms = metadata
        .modified()
        .map_err(|e| Error::file_system(path.to_path_buf(), "read modification time", e))?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    Ok(FileStamp {
        size: metadata.len(),
        mtime_ms,
    })
}
