//! Two-level content-addressed cache store
//!
//! Entries live under `c/<digest[..2]>/<digest[2..]>/` with the payload
//! files beside a serialized `entry.json`; direct-mode bindings live
//! under `d/…/direct.json`. The entry file is always written last via an
//! atomic rename, so a concurrent reader either sees a complete entry or
//! none at all. Repeated insertion of the same key is last-writer-wins,
//! which is safe because values are content-addressed.

use crate::commit::commit_record;
use crate::entry::{compress, decompress, CacheEntry, CompressionMode};
use crate::expected::ExpectedFiles;
use crate::hashing::{digest_file, Digest};
use bcache_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The restored streams and exit status of a cached invocation
#[derive(Debug, Clone)]
pub struct CachedRun {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

/// An input discovered at preprocessing time, stamped with its content
/// digest so a later direct-mode lookup can validate freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplicitInput {
    pub path: PathBuf,
    pub digest: String,
}

/// A direct-mode cache entry binding a direct digest to the preprocessor
/// digest it was observed to resolve to.
#[derive(Debug, Serialize, Deserialize)]
struct DirectEntry {
    preprocessor_digest: String,
    implicit_inputs: Vec<ImplicitInput>,
}

/// Local content-addressed store for cache entries
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, digest: &Digest) -> PathBuf {
        let hash = digest.as_str();
        self.root.join("c").join(&hash[..2]).join(&hash[2..])
    }

    fn direct_entry_path(&self, digest: &Digest) -> PathBuf {
        let hash = digest.as_str();
        self.root
            .join("d")
            .join(&hash[..2])
            .join(&hash[2..])
            .join("direct.json")
    }

    /// Look up an entry and materialize its files at their target paths.
    /// Storage faults degrade to a miss.
    pub fn lookup(
        &self,
        digest: &Digest,
        expected_files: &ExpectedFiles,
        hard_links: bool,
        create_dirs: bool,
    ) -> Option<CachedRun> {
        match self.try_lookup(digest, expected_files, hard_links, create_dirs) {
            Ok(result) => result,
            Err(e) => {
                warn!("cache lookup failed for {digest}: {e}");
                None
            }
        }
    }

    fn try_lookup(
        &self,
        digest: &Digest,
        expected_files: &ExpectedFiles,
        hard_links: bool,
        create_dirs: bool,
    ) -> Result<Option<CachedRun>> {
        let dir = self.entry_dir(digest);
        let entry_path = dir.join("entry.json");

        let content = match fs::read_to_string(&entry_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::file_system(entry_path, "read cache entry", e)),
        };
        let entry = CacheEntry::deserialize(&content)?;

        for file_id in &entry.file_ids {
            let expected = expected_files.get(file_id).ok_or_else(|| {
                Error::storage(format!("no target path for cached file id '{file_id}'"))
            })?;
            self.materialize(
                &dir,
                file_id,
                &expected.path,
                entry.compression,
                hard_links,
                create_dirs,
            )?;
        }

        Ok(Some(CachedRun {
            stdout: entry.stdout,
            stderr: entry.stderr,
            exit_code: entry.exit_code,
        }))
    }

    fn materialize(
        &self,
        entry_dir: &Path,
        file_id: &str,
        target: &Path,
        compression: CompressionMode,
        hard_links: bool,
        create_dirs: bool,
    ) -> Result<()> {
        if create_dirs {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::file_system(parent.to_path_buf(), "create target directory", e)
                })?;
            }
        }

        // Compilers overwrite their outputs; so do we.
        if target.exists() {
            fs::remove_file(target)
                .map_err(|e| Error::file_system(target.to_path_buf(), "remove stale target", e))?;
        }

        match compression {
            CompressionMode::All => {
                let source = entry_dir.join(format!("{file_id}.gz"));
                let packed = fs::read(&source)
                    .map_err(|e| Error::file_system(source, "read cached file", e))?;
                let data = decompress(&packed)?;
                fs::write(target, data)
                    .map_err(|e| Error::file_system(target.to_path_buf(), "write target", e))?;
            }
            CompressionMode::None => {
                let source = entry_dir.join(file_id);
                if hard_links && fs::hard_link(&source, target).is_ok() {
                    debug!("hard linked {} -> {}", source.display(), target.display());
                } else {
                    fs::copy(&source, target).map_err(|e| {
                        Error::file_system(target.to_path_buf(), "copy cached file", e)
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Resolve a direct-mode digest and delegate to [`lookup`](Self::lookup).
    /// Stale entries (an implicit input changed) are invalidated and miss.
    pub fn lookup_direct(
        &self,
        direct_digest: &Digest,
        expected_files: &ExpectedFiles,
        hard_links: bool,
        create_dirs: bool,
    ) -> Option<CachedRun> {
        let path = self.direct_entry_path(direct_digest);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("direct entry unreadable at {}: {e}", path.display());
                return None;
            }
        };

        let direct: DirectEntry = match serde_json::from_str(&content) {
            Ok(direct) => direct,
            Err(e) => {
                warn!("corrupt direct entry at {}: {e}", path.display());
                self.invalidate_direct(&path);
                return None;
            }
        };

        for input in &direct.implicit_inputs {
            let fresh = digest_file(&input.path)
                .map(|d| d.as_str() == input.digest)
                .unwrap_or(false);
            if !fresh {
                debug!(
                    "direct entry stale, implicit input changed: {}",
                    input.path.display()
                );
                self.invalidate_direct(&path);
                return None;
            }
        }

        let preprocessor_digest = Digest::from_hex(&direct.preprocessor_digest)?;
        self.lookup(&preprocessor_digest, expected_files, hard_links, create_dirs)
    }

    fn invalidate_direct(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!("failed to invalidate direct entry {}: {e}", path.display());
        }
    }

    /// Insert an entry, ingesting each file listed in its `file_ids`.
    /// The serialized entry is written last and atomically.
    pub fn add(
        &self,
        digest: &Digest,
        entry: &CacheEntry,
        expected_files: &ExpectedFiles,
        hard_links: bool,
    ) -> Result<()> {
        let dir = self.entry_dir(digest);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::file_system(dir.clone(), "create entry directory", e))?;

        for file_id in &entry.file_ids {
            let expected = expected_files.get(file_id).ok_or_else(|| {
                Error::storage(format!("no source path for file id '{file_id}'"))
            })?;
            self.ingest(&dir, file_id, &expected.path, entry.compression, hard_links)?;
        }

        commit_record(&dir.join("entry.json"), &entry.serialize()?)?;
        debug!("added cache entry {digest}");
        Ok(())
    }

    fn ingest(
        &self,
        entry_dir: &Path,
        file_id: &str,
        source: &Path,
        compression: CompressionMode,
        hard_links: bool,
    ) -> Result<()> {
        match compression {
            CompressionMode::All => {
                let data = fs::read(source)
                    .map_err(|e| Error::file_system(source.to_path_buf(), "read build file", e))?;
                let packed = compress(&data)?;
                let dest = entry_dir.join(format!("{file_id}.gz"));
                fs::write(&dest, packed)
                    .map_err(|e| Error::file_system(dest, "write cached file", e))?;
            }
            CompressionMode::None => {
                let dest = entry_dir.join(file_id);
                if dest.exists() {
                    fs::remove_file(&dest)
                        .map_err(|e| Error::file_system(dest.clone(), "remove old cached file", e))?;
                }
                if hard_links && fs::hard_link(source, &dest).is_ok() {
                    return Ok(());
                }
                fs::copy(source, &dest)
                    .map_err(|e| Error::file_system(source.to_path_buf(), "ingest build file", e))?;
            }
        }
        Ok(())
    }

    /// Bind a direct-mode digest to a preprocessor digest, stamping the
    /// implicit inputs with their current content digests.
    pub fn add_direct(
        &self,
        direct_digest: &Digest,
        preprocessor_digest: &Digest,
        implicit_inputs: &[PathBuf],
    ) -> Result<()> {
        let mut stamped = Vec::with_capacity(implicit_inputs.len());
        for path in implicit_inputs {
            let digest = digest_file(path)?;
            stamped.push(ImplicitInput {
                path: path.clone(),
                digest: digest.as_str().to_string(),
            });
        }

        let direct = DirectEntry {
            preprocessor_digest: preprocessor_digest.as_str().to_string(),
            implicit_inputs: stamped,
        };
        let content = serde_json::to_string_pretty(&direct)?;
        commit_record(&self.direct_entry_path(direct_digest), &content)?;
        debug!("added direct entry {direct_digest} -> {preprocessor_digest}");
        Ok(())
    }

    /// Remove all cached entries, direct bindings and named data stores
    pub fn clear(&self) -> Result<()> {
        for subdir in ["c", "d", "prgid"] {
            let path = self.root.join(subdir);
            match fs::remove_dir_all(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::file_system(path, "clear cache", e)),
            }
        }
        Ok(())
    }
}
