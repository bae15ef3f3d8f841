//! Crash-safe record commits
//!
//! Cache entries, direct-mode bindings and store items all become
//! visible through a single rename: a reader either sees the complete
//! record under its final name or none at all. The bytes are staged in a
//! uniquely named sibling file first, so concurrent writers of the same
//! key never observe each other's partial output; the last rename wins,
//! which is safe because record contents are derived from the key.

use bcache_core::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Publish a serialized record at `path`, creating parent directories
pub(crate) fn commit_record(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        Error::storage(format!(
            "record path '{}' has no parent directory",
            path.display()
        ))
    })?;
    fs::create_dir_all(dir)
        .map_err(|e| Error::file_system(dir.to_path_buf(), "create record directory", e))?;

    StagedRecord::stage(dir, content)?.publish(path)
}

/// A record staged on disk but not yet visible under its final name.
/// Dropping it unpublished removes the staging file.
struct StagedRecord {
    staging_path: PathBuf,
    published: bool,
}

impl StagedRecord {
    fn stage(dir: &Path, content: &str) -> Result<Self> {
        let staged = Self {
            staging_path: dir.join(format!(".stage-{}", Uuid::new_v4())),
            published: false,
        };

        let mut file = File::create(&staged.staging_path)
            .map_err(|e| Error::file_system(&staged.staging_path, "create staging file", e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| Error::file_system(&staged.staging_path, "write staging file", e))?;
        file.sync_all()
            .map_err(|e| Error::file_system(&staged.staging_path, "sync staging file", e))?;

        Ok(staged)
    }

    fn publish(mut self, path: &Path) -> Result<()> {
        fs::rename(&self.staging_path, path)
            .map_err(|e| Error::file_system(path.to_path_buf(), "publish record", e))?;
        self.published = true;
        Ok(())
    }
}

impl Drop for StagedRecord {
    fn drop(&mut self) {
        if !self.published {
            let _ = fs::remove_file(&self.staging_path);
        }
    }
}
